// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Direct access to the register space of the simulated slaves.
//!
//! The [`Inspector`] shares the [`SlaveRegistry`] with the Modbus server and
//! goes through the same block locks, so both entry points may be used
//! concurrently.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::{
    error::InspectError,
    frame::{Address, Coil, UnitId, Word},
    register::{RegisterBlock, RegisterKind, RegisterMap},
    registry::SlaveRegistry,
    slave::ModbusSlave,
    time_sync::{self, TimeSync, TIME_SYNC_WORDS},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_slaves: usize,
    pub slave_ids: Vec<UnitId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaveInfo {
    pub slave_id: UnitId,
    pub supports_time_sync: bool,
    pub last_time_sync: Option<DateTime<Utc>>,
    pub maps: Vec<MapInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapInfo {
    #[serde(rename = "type")]
    pub kind: RegisterKind,
    pub ranges: Vec<RangeInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeInfo {
    pub name: String,
    pub start_address: Address,
    pub size: usize,
    pub is_time_sync: bool,
}

/// The current content of a time sync block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSyncReading {
    pub raw: [Word; TIME_SYNC_WORDS],
    pub valid: bool,
    /// The decoded timestamp, `None` if the words are out of range.
    pub value: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl TimeSyncReading {
    fn new(raw: [Word; TIME_SYNC_WORDS], last_sync: Option<DateTime<Utc>>) -> Self {
        let decoded = TimeSync::decode(raw);
        Self {
            raw,
            valid: decoded.is_valid(),
            value: decoded.is_valid().then(|| decoded.to_string()),
            last_sync,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inspector {
    registry: Arc<SlaveRegistry>,
}

impl Inspector {
    #[must_use]
    pub fn new(registry: Arc<SlaveRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        let slave_ids: Vec<_> = self.registry.unit_ids().collect();
        Summary {
            total_slaves: slave_ids.len(),
            slave_ids,
        }
    }

    pub fn slave_info(&self, unit_id: UnitId) -> Result<SlaveInfo, InspectError> {
        let slave = self.slave(unit_id)?;
        let mut maps = Vec::new();
        if let Some(map) = slave.coils() {
            maps.push(map_info(map));
        }
        if let Some(map) = slave.holding_registers() {
            maps.push(map_info(map));
        }
        if let Some(map) = slave.input_registers() {
            maps.push(map_info(map));
        }
        Ok(SlaveInfo {
            slave_id: slave.unit_id(),
            supports_time_sync: slave.supports_time_sync(),
            last_time_sync: slave.last_time_sync(),
            maps,
        })
    }

    /// Read `quantity` holding or input registers from the block that
    /// contains `address`.
    pub fn read_registers(
        &self,
        unit_id: UnitId,
        kind: RegisterKind,
        address: Address,
        quantity: usize,
    ) -> Result<Vec<Word>, InspectError> {
        let slave = self.slave(unit_id)?;
        let block = find_block(slave, slave.word_map(kind), kind, address)?;
        block
            .read(address, quantity)
            .ok_or_else(|| range_exceeds_block(slave, kind, address, quantity, block))
    }

    pub fn write_registers(
        &self,
        unit_id: UnitId,
        kind: RegisterKind,
        address: Address,
        values: &[Word],
    ) -> Result<(), InspectError> {
        let slave = self.slave(unit_id)?;
        let block = find_block(slave, slave.word_map(kind), kind, address)?;
        if !block.write(address, values) {
            return Err(range_exceeds_block(slave, kind, address, values.len(), block));
        }
        log::debug!("Slave {slave}: wrote {} {kind} at {address}", values.len());
        Ok(())
    }

    pub fn read_coils(
        &self,
        unit_id: UnitId,
        address: Address,
        quantity: usize,
    ) -> Result<Vec<Coil>, InspectError> {
        let slave = self.slave(unit_id)?;
        let block = find_block(slave, slave.coils(), RegisterKind::Coils, address)?;
        block
            .read(address, quantity)
            .ok_or_else(|| {
                range_exceeds_block(slave, RegisterKind::Coils, address, quantity, block)
            })
    }

    pub fn write_coils(
        &self,
        unit_id: UnitId,
        address: Address,
        values: &[Coil],
    ) -> Result<(), InspectError> {
        let slave = self.slave(unit_id)?;
        let kind = RegisterKind::Coils;
        let block = find_block(slave, slave.coils(), kind, address)?;
        if !block.write(address, values) {
            return Err(range_exceeds_block(slave, kind, address, values.len(), block));
        }
        log::debug!("Slave {slave}: wrote {} {kind} at {address}", values.len());
        Ok(())
    }

    pub fn read_time_sync(&self, unit_id: UnitId) -> Result<TimeSyncReading, InspectError> {
        let slave = self.slave(unit_id)?;
        let block = slave
            .time_sync_block()
            .ok_or(InspectError::NoTimeSyncBlock(unit_id))?;
        let raw = block
            .read(block.start(), TIME_SYNC_WORDS)
            .and_then(|words| <[Word; TIME_SYNC_WORDS]>::try_from(words).ok())
            .ok_or(InspectError::NoTimeSyncBlock(unit_id))?;
        Ok(TimeSyncReading::new(raw, slave.last_time_sync()))
    }

    /// Store `value` in the time sync block and record the synchronization.
    pub fn write_time_sync(
        &self,
        unit_id: UnitId,
        value: &NaiveDateTime,
    ) -> Result<TimeSyncReading, InspectError> {
        let slave = self.slave(unit_id)?;
        let block = slave
            .time_sync_block()
            .ok_or(InspectError::NoTimeSyncBlock(unit_id))?;
        if !slave.supports_time_sync() {
            return Err(InspectError::TimeSyncUnsupported(unit_id));
        }
        let raw = time_sync::encode(value)
            .ok_or_else(|| InspectError::TimestampNotEncodable(value.to_string()))?;
        if !block.write(block.start(), &raw) {
            return Err(InspectError::NoTimeSyncBlock(unit_id));
        }
        slave.record_time_sync(Utc::now());
        log::info!("Slave {slave}: time set to {value}");
        Ok(TimeSyncReading::new(raw, slave.last_time_sync()))
    }

    fn slave(&self, unit_id: UnitId) -> Result<&ModbusSlave, InspectError> {
        self.registry
            .get(unit_id)
            .ok_or(InspectError::SlaveNotFound(unit_id))
    }
}

fn map_info<T>(map: &RegisterMap<T>) -> MapInfo
where
    T: Copy + Default,
{
    MapInfo {
        kind: map.kind(),
        ranges: map
            .blocks()
            .iter()
            .map(|block| RangeInfo {
                name: block.name().to_owned(),
                start_address: block.start(),
                size: block.size(),
                is_time_sync: block.is_time_sync(),
            })
            .collect(),
    }
}

fn find_block<'a, T>(
    slave: &ModbusSlave,
    map: Option<&'a RegisterMap<T>>,
    kind: RegisterKind,
    address: Address,
) -> Result<&'a RegisterBlock<T>, InspectError>
where
    T: Copy + Default,
{
    map.and_then(|map| map.find_block(address))
        .ok_or(InspectError::BlockNotFound {
            slave: slave.unit_id(),
            kind,
            address,
        })
}

fn range_exceeds_block<T>(
    slave: &ModbusSlave,
    kind: RegisterKind,
    address: Address,
    quantity: usize,
    block: &RegisterBlock<T>,
) -> InspectError
where
    T: Copy + Default,
{
    InspectError::RangeExceedsBlock {
        slave: slave.unit_id(),
        kind,
        address,
        quantity,
        block: block.name().to_owned(),
    }
}
