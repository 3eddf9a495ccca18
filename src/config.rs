// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup configuration.
//!
//! The topology is read from a JSON document once, before serving.
//! Keys are accepted in camelCase as well as in PascalCase.

use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroUsize,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    frame::{Address, UnitId},
    register::{RegisterBlock, RegisterKind, RegisterMap},
    registry::SlaveRegistry,
    slave::ModbusSlave,
    time_sync::TIME_SYNC_WORDS,
};

const DEFAULT_IP: &str = "0.0.0.0";
const DEFAULT_MODBUS_PORT: u16 = 502;
const DEFAULT_HTTP_PORT: u16 = 5000;

/// Number of addresses of the 16 bit address space.
const ADDRESS_SPACE: u32 = 1 << 16;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default, alias = "Server")]
    pub server: ServerConfig,

    #[serde(default, alias = "Http")]
    pub http: HttpConfig,

    #[serde(default, alias = "Slaves")]
    pub slaves: Vec<SlaveConfig>,
}

/// The Modbus TCP listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_ip", alias = "Ip")]
    pub ip: String,

    #[serde(default = "default_modbus_port", alias = "Port")]
    pub port: u16,

    /// Upper bound of concurrently served connections, unlimited if unset.
    #[serde(default, alias = "MaxConnections")]
    pub max_connections: Option<NonZeroUsize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: DEFAULT_MODBUS_PORT,
            max_connections: None,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.ip, self.port)
    }
}

/// The REST inspection listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default = "default_ip", alias = "Ip")]
    pub ip: String,

    #[serde(default = "default_http_port", alias = "Port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

impl HttpConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.ip, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaveConfig {
    #[serde(alias = "SlaveId")]
    pub slave_id: UnitId,

    #[serde(default, alias = "SupportsTimeSync")]
    pub supports_time_sync: bool,

    #[serde(default, alias = "Maps")]
    pub maps: Vec<MapConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    /// `HoldingRegisters`, `Coils` or `InputRegisters`, in any case.
    #[serde(rename = "type", alias = "Type")]
    pub kind: String,

    #[serde(default, alias = "Ranges")]
    pub ranges: Vec<RangeConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeConfig {
    #[serde(alias = "StartAddress")]
    pub start_address: Address,

    #[serde(alias = "Size")]
    pub size: u32,

    #[serde(default, alias = "Name")]
    pub name: String,

    #[serde(default, alias = "IsTimeSync")]
    pub is_time_sync: bool,
}

fn default_ip() -> String {
    DEFAULT_IP.to_owned()
}

const fn default_modbus_port() -> u16 {
    DEFAULT_MODBUS_PORT
}

const fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn socket_addr(ip: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let ip = ip.parse::<IpAddr>().map_err(|source| ConfigError::InvalidIp {
        value: ip.to_owned(),
        source,
    })?;
    Ok(SocketAddr::new(ip, port))
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate the topology and allocate zeroed register storage.
    ///
    /// Only the first map of each kind is used, later maps of the same
    /// kind are ignored.
    pub fn build_registry(&self) -> Result<SlaveRegistry, ConfigError> {
        let slaves = self
            .slaves
            .iter()
            .map(SlaveConfig::build_slave)
            .collect::<Result<Vec<_>, _>>()?;
        SlaveRegistry::new(slaves)
    }
}

impl SlaveConfig {
    fn build_slave(&self) -> Result<ModbusSlave, ConfigError> {
        let unit_id = self.slave_id;
        let mut slave = ModbusSlave::new(unit_id).with_time_sync_support(self.supports_time_sync);
        let mut time_sync_blocks = 0;
        for map in &self.maps {
            let kind = map
                .kind
                .parse::<RegisterKind>()
                .map_err(|_| ConfigError::UnknownRegisterKind {
                    slave: unit_id,
                    kind: map.kind.clone(),
                })?;
            let already_defined = match kind {
                RegisterKind::Coils => slave.coils().is_some(),
                RegisterKind::HoldingRegisters => slave.holding_registers().is_some(),
                RegisterKind::InputRegisters => slave.input_registers().is_some(),
            };
            if already_defined {
                log::warn!("Slave {unit_id}: ignoring additional {kind} map");
                continue;
            }
            for range in &map.ranges {
                range.validate(unit_id, kind)?;
            }
            time_sync_blocks += map.ranges.iter().filter(|r| r.is_time_sync).count();
            slave = match kind {
                RegisterKind::Coils => slave.with_coils(map.build_map(kind)),
                RegisterKind::HoldingRegisters => slave.with_holding_registers(map.build_map(kind)),
                RegisterKind::InputRegisters => slave.with_input_registers(map.build_map(kind)),
            };
        }
        if time_sync_blocks > 1 {
            return Err(ConfigError::MultipleTimeSyncBlocks(unit_id));
        }
        log::info!(
            "Slave {unit_id}: {} map(s), time sync {}",
            self.maps.len(),
            if self.supports_time_sync {
                "supported"
            } else {
                "not supported"
            }
        );
        Ok(slave)
    }
}

impl MapConfig {
    fn build_map<T>(&self, kind: RegisterKind) -> RegisterMap<T>
    where
        T: Copy + Default,
    {
        let blocks = self
            .ranges
            .iter()
            .map(|range| {
                RegisterBlock::new(range.name.clone(), range.start_address, range.size as usize)
                    .with_time_sync(range.is_time_sync)
            })
            .collect();
        RegisterMap::new(kind, blocks)
    }
}

impl RangeConfig {
    fn validate(&self, slave: UnitId, kind: RegisterKind) -> Result<(), ConfigError> {
        let end = u32::from(self.start_address).checked_add(self.size);
        if !end.is_some_and(|end| end <= ADDRESS_SPACE) {
            return Err(ConfigError::BlockOutOfRange {
                slave,
                name: self.name.clone(),
                start: self.start_address,
                size: self.size,
            });
        }
        if self.is_time_sync
            && (kind != RegisterKind::HoldingRegisters || (self.size as usize) < TIME_SYNC_WORDS)
        {
            return Err(ConfigError::InvalidTimeSyncBlock {
                slave,
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}
