// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::{io, net::AddrParseError, path::PathBuf};

use thiserror::Error;

use crate::{register::RegisterKind, Address, UnitId};

/// Error type for loading the simulator topology.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration is not valid JSON or has an unexpected shape.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid IP address {value:?}: {source}")]
    InvalidIp {
        value: String,
        #[source]
        source: AddrParseError,
    },

    /// At least one slave must be configured.
    #[error("no slaves defined")]
    NoSlaves,

    #[error("slave {0} is defined more than once")]
    DuplicateSlave(UnitId),

    #[error("slave {slave}: unknown register map type {kind:?}")]
    UnknownRegisterKind { slave: UnitId, kind: String },

    /// A block reaches beyond the 16 bit address space.
    #[error("slave {slave}: block {name:?} at {start} with size {size} exceeds the address space")]
    BlockOutOfRange {
        slave: UnitId,
        name: String,
        start: Address,
        size: u32,
    },

    #[error("slave {0}: more than one time sync block")]
    MultipleTimeSyncBlocks(UnitId),

    /// The time sync block must be a holding register block with room for
    /// the packed date and time.
    #[error("slave {slave}: time sync block {name:?} must be a holding register block of at least 4 words")]
    InvalidTimeSyncBlock { slave: UnitId, name: String },
}

/// Error type of the inspection facade.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("slave {0} not found")]
    SlaveNotFound(UnitId),

    /// No block of the requested kind contains the start address.
    #[error("slave {slave}: no {kind} block contains address {address}")]
    BlockNotFound {
        slave: UnitId,
        kind: RegisterKind,
        address: Address,
    },

    /// The requested range runs past the end of the containing block.
    #[error("slave {slave}: range of {quantity} {kind} at {address} exceeds block {block:?}")]
    RangeExceedsBlock {
        slave: UnitId,
        kind: RegisterKind,
        address: Address,
        quantity: usize,
        block: String,
    },

    #[error("slave {0} has no time sync block")]
    NoTimeSyncBlock(UnitId),

    #[error("slave {0} does not support time sync")]
    TimeSyncUnsupported(UnitId),

    /// The timestamp cannot be represented by the packed time sync format.
    #[error("timestamp {0} cannot be encoded for time sync")]
    TimestampNotEncodable(String),
}

impl InspectError {
    /// Whether the error denotes a missing slave or block.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SlaveNotFound(_) | Self::BlockNotFound { .. } | Self::NoTimeSyncBlock(_)
        )
    }
}
