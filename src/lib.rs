// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg_attr(docsrs, feature(doc_cfg))]

//! A [Modbus TCP](https://en.wikipedia.org/wiki/Modbus) slave simulator
//! based on [tokio](https://tokio.rs).
//!
//! One process simulates any number of slave devices, each selected by the
//! unit id of the MBAP header and owning named blocks of coils, holding
//! registers and input registers. The same register space can be inspected
//! and modified through the [`inspect::Inspector`], optionally exposed as a
//! REST API (feature `http`).
//!
//! Supported function codes:
//!
//! - `0x01` Read Coils
//! - `0x03` Read Holding Registers
//! - `0x04` Read Input Registers
//! - `0x05` Write Single Coil
//! - `0x06` Write Single Register
//! - `0x10` Write Multiple Registers
//!
//! All other function codes are answered with an illegal function
//! exception.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use modbus_sim::{config::AppConfig, server::{tcp::Server, SimulatorService}};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_file("slaves.json")?;
//!     let registry = Arc::new(config.build_registry()?);
//!     let server = Server::bind(config.server.socket_addr()?)?;
//!     let on_process_error = |err| {
//!         eprintln!("{err}");
//!     };
//!     server
//!         .serve(SimulatorService::new(registry), on_process_error)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod prelude;

mod codec;

pub mod config;

pub mod error;
pub use self::error::{ConfigError, InspectError};

mod frame;
pub use self::frame::{
    tcp::TransactionId, Address, Coil, ExceptionCode, ExceptionResponse, FunctionCode, Quantity,
    Request, Response, SlaveRequest, UnitId, Word,
};

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub mod http;

pub mod inspect;
pub mod register;
pub mod registry;
pub mod server;
pub mod slave;
pub mod time_sync;
