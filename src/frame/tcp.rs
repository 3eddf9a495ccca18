// SPDX-FileCopyrightText: Copyright (c) 2017-2023 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::*;

pub type TransactionId = u16;

/// The fields of an MBAP header that survive into the response.
///
/// The protocol id is always `0` on output and the length field is
/// derived from the encoded PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub unit_id: UnitId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAdu {
    pub hdr: Header,
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseAdu {
    pub hdr: Header,
    pub pdu: ResponsePdu,
}

/// The outcome of decoding one inbound frame.
#[derive(Debug)]
pub enum RequestFrame {
    /// Fewer bytes than an MBAP header plus function code.
    ///
    /// Such frames are dropped without a response.
    Truncated(usize),

    /// A well-formed request.
    Request(RequestAdu),

    /// The header is complete but the PDU of a supported function code
    /// could not be decoded.
    Malformed {
        hdr: Header,
        function: FunctionCode,
        error: std::io::Error,
    },
}

impl From<RequestAdu> for SlaveRequest {
    fn from(from: RequestAdu) -> Self {
        Self {
            slave: from.hdr.unit_id,
            request: from.request,
        }
    }
}
