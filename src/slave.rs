// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    frame::{Coil, UnitId, Word},
    register::{RegisterKind, RegisterMap, WordBlock},
};

/// A simulated Modbus slave device.
///
/// The register maps are fixed at construction, only register contents and
/// the last time sync timestamp change afterwards.
#[derive(Debug)]
pub struct ModbusSlave {
    unit_id: UnitId,
    supports_time_sync: bool,
    coils: Option<RegisterMap<Coil>>,
    holding_registers: Option<RegisterMap<Word>>,
    input_registers: Option<RegisterMap<Word>>,
    last_time_sync: RwLock<Option<DateTime<Utc>>>,
}

impl ModbusSlave {
    #[must_use]
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            supports_time_sync: false,
            coils: None,
            holding_registers: None,
            input_registers: None,
            last_time_sync: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn with_time_sync_support(mut self, supports_time_sync: bool) -> Self {
        self.supports_time_sync = supports_time_sync;
        self
    }

    #[must_use]
    pub fn with_coils(mut self, map: RegisterMap<Coil>) -> Self {
        self.coils = Some(map);
        self
    }

    #[must_use]
    pub fn with_holding_registers(mut self, map: RegisterMap<Word>) -> Self {
        self.holding_registers = Some(map);
        self
    }

    #[must_use]
    pub fn with_input_registers(mut self, map: RegisterMap<Word>) -> Self {
        self.input_registers = Some(map);
        self
    }

    #[must_use]
    pub const fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    #[must_use]
    pub const fn supports_time_sync(&self) -> bool {
        self.supports_time_sync
    }

    #[must_use]
    pub const fn coils(&self) -> Option<&RegisterMap<Coil>> {
        self.coils.as_ref()
    }

    #[must_use]
    pub const fn holding_registers(&self) -> Option<&RegisterMap<Word>> {
        self.holding_registers.as_ref()
    }

    #[must_use]
    pub const fn input_registers(&self) -> Option<&RegisterMap<Word>> {
        self.input_registers.as_ref()
    }

    /// The word map of `kind`, `None` for coils.
    #[must_use]
    pub const fn word_map(&self, kind: RegisterKind) -> Option<&RegisterMap<Word>> {
        match kind {
            RegisterKind::HoldingRegisters => self.holding_registers(),
            RegisterKind::InputRegisters => self.input_registers(),
            RegisterKind::Coils => None,
        }
    }

    /// The holding register block designated for time synchronization.
    #[must_use]
    pub fn time_sync_block(&self) -> Option<&WordBlock> {
        self.holding_registers()?
            .blocks()
            .iter()
            .find(|block| block.is_time_sync())
    }

    #[must_use]
    pub fn last_time_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_time_sync.read()
    }

    pub fn record_time_sync(&self, at: DateTime<Utc>) {
        *self.last_time_sync.write() = Some(at);
    }
}

impl fmt::Display for ModbusSlave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:0>2X}", self.unit_id)
    }
}
