// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    convert::TryFrom,
    io::{self, Cursor, Error, ErrorKind},
};

use byteorder::{BigEndian, ReadBytesExt as _};
use bytes::{BufMut as _, Bytes, BytesMut};

use crate::frame::{Coil, ExceptionResponse, FunctionCode, Request, Response, ResponsePdu};

pub(crate) mod tcp;

/// Maximum request/response PDU size of a Modbus TCP frame.
pub(crate) const MAX_PDU_SIZE: usize = 253;

/// Upper bound of the quantity field of a write multiple registers request.
pub(crate) const MAX_WRITE_REGISTERS: u16 = 123;

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn u16_len(len: usize) -> u16 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u16::MAX.into());
    len as u16
}

#[allow(clippy::cast_possible_truncation)]
fn u8_len(len: usize) -> u8 {
    debug_assert!(len <= u8::MAX.into());
    len as u8
}

pub(crate) fn encode_response_pdu(buf: &mut BytesMut, rsp: &Response) {
    use crate::frame::Response::*;
    buf.put_u8(rsp.function_code().value());
    match rsp {
        ReadCoils(coils) => {
            buf.put_u8(u8_len(packed_coils_size(coils)));
            encode_packed_coils(buf, coils);
        }
        ReadHoldingRegisters(registers) | ReadInputRegisters(registers) => {
            buf.put_u8(u8_len(registers.len() * 2));
            for r in registers {
                buf.put_u16(*r);
            }
        }
        WriteSingleCoil(address, word) | WriteSingleRegister(address, word) => {
            buf.put_u16(*address);
            buf.put_u16(*word);
        }
        WriteMultipleRegisters(address, quantity) => {
            buf.put_u16(*address);
            buf.put_u16(*quantity);
        }
    }
}

pub(crate) fn encode_exception_response_pdu(buf: &mut BytesMut, rsp: ExceptionResponse) {
    buf.put_u8(rsp.function.value() | 0x80);
    buf.put_u8(rsp.exception.into());
}

pub(crate) fn encode_response_result_pdu(buf: &mut BytesMut, res: &ResponsePdu) {
    match &res.0 {
        Ok(rsp) => encode_response_pdu(buf, rsp),
        Err(rsp) => encode_exception_response_pdu(buf, *rsp),
    }
}

fn read_u16_be(reader: &mut impl io::Read) -> io::Result<u16> {
    reader.read_u16::<BigEndian>()
}

impl TryFrom<Bytes> for Request {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        use crate::frame::Request::*;
        let rdr = &mut Cursor::new(&bytes);
        let fn_code = rdr.read_u8()?;
        if let FunctionCode::Custom(fn_code) = FunctionCode::new(fn_code) {
            return Ok(Custom(fn_code, bytes[1..].to_vec()));
        }
        if bytes.len() > MAX_PDU_SIZE {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "request PDU size exceeded",
            ));
        }
        let req = match fn_code {
            0x01 => ReadCoils(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x03 => ReadHoldingRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x04 => ReadInputRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x05 => WriteSingleCoil(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x06 => WriteSingleRegister(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x10 => {
                let address = read_u16_be(rdr)?;
                let quantity = read_u16_be(rdr)?;
                let byte_count = rdr.read_u8()?;
                if quantity == 0
                    || quantity > MAX_WRITE_REGISTERS
                    || u16::from(byte_count) != quantity * 2
                {
                    // Leave the payload undecoded, an empty write is
                    // rejected as an illegal data value.
                    return Ok(WriteMultipleRegisters(address, Vec::new()));
                }
                let mut data = Vec::with_capacity(quantity.into());
                for _ in 0..quantity {
                    data.push(read_u16_be(rdr)?);
                }
                WriteMultipleRegisters(address, data)
            }
            // Consume all remaining bytes as custom data.
            fn_code => Custom(fn_code, bytes[1..].to_vec()),
        };
        Ok(req)
    }
}

/// Coil state of the raw value of a write single coil request.
pub(crate) fn coil_state(value: u16) -> Coil {
    value == 0xFF00
}

fn packed_coils_size(coils: &[Coil]) -> usize {
    (coils.len() + 7) / 8
}

fn encode_packed_coils(buf: &mut BytesMut, coils: &[Coil]) -> usize {
    let packed_coils_size = packed_coils_size(coils);
    let offset = buf.len();
    buf.resize(offset + packed_coils_size, 0);
    let buf = &mut buf[offset..];
    for (i, b) in coils.iter().enumerate() {
        let v = u8::from(*b); // 0 or 1
        buf[i / 8] |= v << (i % 8);
    }
    packed_coils_size
}

pub(crate) fn response_pdu_size(rsp: &ResponsePdu) -> usize {
    use crate::frame::Response::*;
    match &rsp.0 {
        Ok(ReadCoils(coils)) => 2 + packed_coils_size(coils),
        Ok(ReadHoldingRegisters(data) | ReadInputRegisters(data)) => 2 + data.len() * 2,
        Ok(WriteSingleCoil(_, _) | WriteSingleRegister(_, _) | WriteMultipleRegisters(_, _)) => 5,
        Err(_) => 2,
    }
}
