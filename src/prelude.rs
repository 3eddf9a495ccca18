// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types and traits

///////////////////////////////////////////////////////////////////
/// Types
///////////////////////////////////////////////////////////////////
pub use crate::{
    config::AppConfig,
    inspect::Inspector,
    register::{RegisterBlock, RegisterKind, RegisterMap},
    registry::SlaveRegistry,
    server::{tcp::Server, SimulatorService, Terminated},
    slave::ModbusSlave,
    time_sync::TimeSync,
};
pub use crate::{ExceptionCode, Request, Response, SlaveRequest, UnitId};

///////////////////////////////////////////////////////////////////
/// Traits
///////////////////////////////////////////////////////////////////
pub use crate::server::Service;
