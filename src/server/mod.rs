// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP server side

mod service;
pub mod simulator;
pub mod tcp;

pub use self::{service::Service, simulator::SimulatorService};

/// Cause for termination of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminated {
    /// The server finished serving.
    Finished,
    /// The server has been aborted.
    Aborted,
}
