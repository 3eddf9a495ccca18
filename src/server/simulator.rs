// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch of Modbus requests against the simulated slaves.

use std::{future, sync::Arc};

use bytes::{Bytes, BytesMut};
use chrono::Utc;

use crate::{
    codec::{
        coil_state,
        tcp::{decode_frame, encode_response_adu},
    },
    frame::{tcp::*, *},
    registry::SlaveRegistry,
    slave::ModbusSlave,
};

use super::Service;

const MAX_READ_COILS: Quantity = 2000;
const MAX_READ_REGISTERS: Quantity = 125;
const MAX_WRITE_REGISTERS: usize = crate::codec::MAX_WRITE_REGISTERS as usize;

/// Serves the slaves of a [`SlaveRegistry`].
///
/// Requests for unit ids without a slave are answered with
/// [`ExceptionCode::GatewayTargetDevice`].
#[derive(Debug, Clone)]
pub struct SimulatorService {
    registry: Arc<SlaveRegistry>,
}

impl SimulatorService {
    #[must_use]
    pub fn new(registry: Arc<SlaveRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SlaveRegistry> {
        &self.registry
    }

    /// Answer a single request synchronously.
    pub fn dispatch(&self, req: SlaveRequest) -> Result<Response, ExceptionCode> {
        let SlaveRequest { slave, request } = req;
        let Some(slave) = self.registry.get(slave) else {
            log::warn!("Request {request:?} for unknown slave {slave}");
            return Err(ExceptionCode::GatewayTargetDevice);
        };
        log::debug!("Slave {slave}: {request:?}");
        let res = dispatch_request(slave, request);
        if let Err(exception) = res {
            log::debug!("Slave {slave}: {exception}");
        }
        res
    }

    /// Answer the raw bytes of one MBAP frame.
    ///
    /// Returns `None` for frames too short to carry a function code. A PDU
    /// that cannot be decoded is answered with
    /// [`ExceptionCode::ServerDeviceFailure`].
    #[must_use]
    pub fn process_frame(&self, frame: &[u8]) -> Option<Bytes> {
        let (hdr, pdu) = match decode_frame(Bytes::copy_from_slice(frame)) {
            RequestFrame::Truncated(len) => {
                log::trace!("Dropping truncated frame of {len} byte(s)");
                return None;
            }
            RequestFrame::Malformed {
                hdr,
                function,
                error,
            } => {
                log::warn!("Malformed request for function {function}: {error}");
                (hdr, failure_response(function))
            }
            RequestFrame::Request(adu) => {
                let RequestAdu { hdr, request } = adu;
                let function = request.function_code();
                let pdu = self
                    .dispatch(SlaveRequest {
                        slave: hdr.unit_id,
                        request,
                    })
                    .map_err(|exception| ExceptionResponse {
                        function,
                        exception,
                    });
                (hdr, ResponsePdu(pdu))
            }
        };
        let mut buf = BytesMut::new();
        encode_response_adu(&mut buf, &ResponseAdu { hdr, pdu });
        Some(buf.freeze())
    }
}

impl Service for SimulatorService {
    type Request = SlaveRequest;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.dispatch(req))
    }
}

pub(crate) fn failure_response(function: FunctionCode) -> ResponsePdu {
    ExceptionResponse {
        function,
        exception: ExceptionCode::ServerDeviceFailure,
    }
    .into()
}

fn dispatch_request(slave: &ModbusSlave, request: Request) -> Result<Response, ExceptionCode> {
    use Request::*;

    match request {
        ReadCoils(addr, cnt) => {
            check_quantity(cnt, MAX_READ_COILS)?;
            let coils = slave
                .coils()
                .and_then(|map| map.read(addr, cnt.into()))
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            Ok(Response::ReadCoils(coils))
        }
        ReadHoldingRegisters(addr, cnt) => {
            check_quantity(cnt, MAX_READ_REGISTERS)?;
            let words = slave
                .holding_registers()
                .and_then(|map| map.read(addr, cnt.into()))
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            Ok(Response::ReadHoldingRegisters(words))
        }
        ReadInputRegisters(addr, cnt) => {
            check_quantity(cnt, MAX_READ_REGISTERS)?;
            let words = slave
                .input_registers()
                .and_then(|map| map.read(addr, cnt.into()))
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            Ok(Response::ReadInputRegisters(words))
        }
        WriteSingleCoil(addr, value) => {
            let block = slave
                .coils()
                .and_then(|map| map.find_block(addr))
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            if !block.write_single(addr, coil_state(value)) {
                return Err(ExceptionCode::IllegalDataAddress);
            }
            Ok(Response::WriteSingleCoil(addr, value))
        }
        WriteSingleRegister(addr, value) => {
            let block = slave
                .holding_registers()
                .and_then(|map| map.find_block(addr))
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            if !block.write_single(addr, value) {
                return Err(ExceptionCode::IllegalDataAddress);
            }
            Ok(Response::WriteSingleRegister(addr, value))
        }
        WriteMultipleRegisters(addr, words) => {
            if words.is_empty() || words.len() > MAX_WRITE_REGISTERS {
                return Err(ExceptionCode::IllegalDataValue);
            }
            let block = slave
                .holding_registers()
                .and_then(|map| map.find_block_for_range(addr, words.len()))
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            if block.is_time_sync() && !slave.supports_time_sync() {
                return Err(ExceptionCode::IllegalFunction);
            }
            if !block.write(addr, &words) {
                return Err(ExceptionCode::IllegalDataAddress);
            }
            if block.is_time_sync() {
                let now = Utc::now();
                log::info!("Slave {slave}: time synchronized at {now}");
                slave.record_time_sync(now);
            }
            #[allow(clippy::cast_possible_truncation)]
            let quantity = words.len() as Quantity;
            Ok(Response::WriteMultipleRegisters(addr, quantity))
        }
        Custom(..) => Err(ExceptionCode::IllegalFunction),
    }
}

fn check_quantity(quantity: Quantity, max: Quantity) -> Result<(), ExceptionCode> {
    if (1..=max).contains(&quantity) {
        Ok(())
    } else {
        Err(ExceptionCode::IllegalDataValue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{RegisterBlock, RegisterKind, RegisterMap};

    fn slave(unit_id: UnitId, supports_time_sync: bool) -> ModbusSlave {
        ModbusSlave::new(unit_id)
            .with_time_sync_support(supports_time_sync)
            .with_holding_registers(RegisterMap::new(
                RegisterKind::HoldingRegisters,
                vec![
                    RegisterBlock::new("main", 0, 10),
                    RegisterBlock::new("clock", 100, 4).with_time_sync(true),
                ],
            ))
            .with_input_registers(RegisterMap::new(
                RegisterKind::InputRegisters,
                vec![RegisterBlock::new("inputs", 0, 4)],
            ))
            .with_coils(RegisterMap::new(
                RegisterKind::Coils,
                vec![RegisterBlock::new("coils", 0, 8)],
            ))
    }

    fn service() -> SimulatorService {
        let slaves = vec![slave(1, false), slave(2, true), ModbusSlave::new(3)];
        let registry = SlaveRegistry::new(slaves).unwrap();
        SimulatorService::new(Arc::new(registry))
    }

    fn call(
        service: &SimulatorService,
        slave: UnitId,
        request: Request,
    ) -> Result<Response, ExceptionCode> {
        service.dispatch(SlaveRequest { slave, request })
    }

    #[test]
    fn write_then_read_holding_registers() {
        let service = service();
        assert_eq!(
            call(&service, 1, Request::WriteMultipleRegisters(2, vec![10, 20, 30])),
            Ok(Response::WriteMultipleRegisters(2, 3))
        );
        assert_eq!(
            call(&service, 1, Request::ReadHoldingRegisters(2, 3)),
            Ok(Response::ReadHoldingRegisters(vec![10, 20, 30]))
        );
        assert_eq!(
            call(&service, 1, Request::ReadHoldingRegisters(15, 1)),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn write_then_read_coils() {
        let service = service();
        assert_eq!(
            call(&service, 1, Request::WriteSingleCoil(3, 0xFF00)),
            Ok(Response::WriteSingleCoil(3, 0xFF00))
        );
        let mut expected = vec![false; 8];
        expected[3] = true;
        assert_eq!(
            call(&service, 1, Request::ReadCoils(0, 8)),
            Ok(Response::ReadCoils(expected))
        );
        assert_eq!(
            call(&service, 1, Request::WriteSingleCoil(3, 0x1234)),
            Ok(Response::WriteSingleCoil(3, 0x1234))
        );
        assert_eq!(
            call(&service, 1, Request::ReadCoils(3, 1)),
            Ok(Response::ReadCoils(vec![false]))
        );
    }

    #[test]
    fn write_single_register() {
        let service = service();
        assert_eq!(
            call(&service, 1, Request::WriteSingleRegister(9, 0xABCD)),
            Ok(Response::WriteSingleRegister(9, 0xABCD))
        );
        assert_eq!(
            call(&service, 1, Request::ReadHoldingRegisters(9, 1)),
            Ok(Response::ReadHoldingRegisters(vec![0xABCD]))
        );
        assert_eq!(
            call(&service, 1, Request::WriteSingleRegister(10, 1)),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn read_input_registers() {
        let service = service();
        assert_eq!(
            call(&service, 1, Request::ReadInputRegisters(0, 4)),
            Ok(Response::ReadInputRegisters(vec![0; 4]))
        );
        assert_eq!(
            call(&service, 1, Request::ReadInputRegisters(2, 3)),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn missing_maps() {
        let service = service();
        for request in [
            Request::ReadCoils(0, 1),
            Request::ReadHoldingRegisters(0, 1),
            Request::ReadInputRegisters(0, 1),
            Request::WriteSingleCoil(0, 0xFF00),
            Request::WriteSingleRegister(0, 1),
            Request::WriteMultipleRegisters(0, vec![1]),
        ] {
            assert_eq!(
                call(&service, 3, request),
                Err(ExceptionCode::IllegalDataAddress)
            );
        }
    }

    #[test]
    fn write_multiple_registers_across_blocks_is_rejected() {
        let service = service();
        assert_eq!(
            call(&service, 1, Request::WriteMultipleRegisters(8, vec![1, 2, 3])),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            call(&service, 1, Request::ReadHoldingRegisters(8, 2)),
            Ok(Response::ReadHoldingRegisters(vec![0, 0]))
        );
    }

    #[test]
    fn quantity_limits() {
        let service = service();
        for request in [
            Request::ReadCoils(0, 0),
            Request::ReadCoils(0, 2001),
            Request::ReadHoldingRegisters(0, 0),
            Request::ReadHoldingRegisters(0, 126),
            Request::ReadInputRegisters(0, 126),
            Request::WriteMultipleRegisters(0, vec![]),
            Request::WriteMultipleRegisters(0, vec![0; 124]),
        ] {
            assert_eq!(
                call(&service, 1, request),
                Err(ExceptionCode::IllegalDataValue)
            );
        }
    }

    #[test]
    fn unsupported_function() {
        let service = service();
        assert_eq!(
            call(&service, 1, Request::Custom(0x2B, vec![0x0E])),
            Err(ExceptionCode::IllegalFunction)
        );
    }

    #[test]
    fn unknown_slave() {
        let service = service();
        assert_eq!(
            call(&service, 9, Request::ReadHoldingRegisters(0, 1)),
            Err(ExceptionCode::GatewayTargetDevice)
        );
        assert_eq!(
            call(&service, 9, Request::Custom(0x2B, vec![])),
            Err(ExceptionCode::GatewayTargetDevice)
        );
    }

    #[test]
    fn time_sync_write_requires_support() {
        let service = service();
        assert_eq!(
            call(&service, 1, Request::WriteMultipleRegisters(100, vec![24, 0x0310, 0x0E1E, 0])),
            Err(ExceptionCode::IllegalFunction)
        );
        let slave = service.registry().get(1).unwrap();
        assert_eq!(slave.time_sync_block().unwrap().read(100, 4), Some(vec![0; 4]));
        assert!(slave.last_time_sync().is_none());

        let before = Utc::now();
        assert_eq!(
            call(&service, 2, Request::WriteMultipleRegisters(100, vec![24, 0x0310, 0x0E1E, 0])),
            Ok(Response::WriteMultipleRegisters(100, 4))
        );
        let slave = service.registry().get(2).unwrap();
        assert!(slave.last_time_sync().unwrap() >= before);
    }

    #[test]
    fn process_raw_frames() {
        let service = service();
        let rsp = service
            .process_frame(&[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x0D, 0x01, 0x10, 0x00, 0x02, 0x00, 0x03, 0x06,
                0x00, 0x0A, 0x00, 0x14, 0x00, 0x1E,
            ])
            .unwrap();
        assert_eq!(
            &rsp[..],
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x10, 0x00, 0x02, 0x00, 0x03]
        );

        let rsp = service
            .process_frame(&[
                0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x02, 0x00, 0x03,
            ])
            .unwrap();
        assert_eq!(
            &rsp[..],
            &[
                0x00, 0x02, 0x00, 0x00, 0x00, 0x09, 0x01, 0x03, 0x06, 0x00, 0x0A, 0x00, 0x14,
                0x00, 0x1E
            ]
        );
    }

    #[test]
    fn process_write_single_echoes_request() {
        let service = service();
        let req = [0x12, 0x34, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x07, 0xAB, 0xCD];
        assert_eq!(&service.process_frame(&req).unwrap()[..], &req);

        let req = [0x12, 0x35, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x03, 0xFF, 0x00];
        assert_eq!(&service.process_frame(&req).unwrap()[..], &req);
    }

    #[test]
    fn process_exceptions() {
        let service = service();
        // unknown slave
        let rsp = service
            .process_frame(&[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x09, 0x03, 0x00, 0x00, 0x00, 0x01,
            ])
            .unwrap();
        assert_eq!(&rsp[..], &[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x09, 0x83, 0x0B]);

        // unsupported function
        let rsp = service
            .process_frame(&[0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0x01, 0x07])
            .unwrap();
        assert_eq!(&rsp[..], &[0x00, 0x02, 0x00, 0x00, 0x00, 0x03, 0x01, 0x87, 0x01]);

        // malformed PDU
        let rsp = service
            .process_frame(&[0x00, 0x03, 0x00, 0x00, 0x00, 0x03, 0x01, 0x03, 0x00])
            .unwrap();
        assert_eq!(&rsp[..], &[0x00, 0x03, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x04]);
    }

    #[test]
    fn drop_truncated_frames() {
        let service = service();
        assert!(service.process_frame(&[]).is_none());
        assert!(service
            .process_frame(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01])
            .is_none());
    }
}
