// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{error::ConfigError, frame::UnitId, slave::ModbusSlave};

/// All simulated slaves of a process.
///
/// Constructed once before serving and shared by reference counting
/// between the Modbus server and the inspection facade.
#[derive(Debug)]
pub struct SlaveRegistry {
    slaves: Vec<ModbusSlave>,
}

impl SlaveRegistry {
    /// Fails if `slaves` is empty or contains a unit id twice.
    pub fn new(slaves: Vec<ModbusSlave>) -> Result<Self, ConfigError> {
        if slaves.is_empty() {
            return Err(ConfigError::NoSlaves);
        }
        for (i, slave) in slaves.iter().enumerate() {
            if slaves[..i].iter().any(|s| s.unit_id() == slave.unit_id()) {
                return Err(ConfigError::DuplicateSlave(slave.unit_id()));
            }
        }
        Ok(Self { slaves })
    }

    #[must_use]
    pub fn get(&self, unit_id: UnitId) -> Option<&ModbusSlave> {
        self.slaves.iter().find(|slave| slave.unit_id() == unit_id)
    }

    /// All slaves in declaration order.
    #[must_use]
    pub fn slaves(&self) -> &[ModbusSlave] {
        &self.slaves
    }

    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.slaves.iter().map(ModbusSlave::unit_id)
    }
}
