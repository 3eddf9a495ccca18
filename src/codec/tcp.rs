// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::{Error, Result};

use byteorder::{BigEndian, ByteOrder as _};
use bytes::{BufMut as _, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::*;
use crate::frame::{tcp::*, FunctionCode, Request};

const HEADER_LEN: usize = 7;

/// MBAP header plus function code.
const MIN_FRAME_LEN: usize = HEADER_LEN + 1;

const PROTOCOL_ID: u16 = 0x0000; // TCP

/// Splits inbound bytes into MBAP frames and encodes responses.
///
/// Frames are never reassembled across reads: whatever is buffered when
/// [`Decoder::decode`] runs is consumed entirely. Several complete frames
/// in one read are split by their length fields, a frame claiming more
/// bytes than were received is decoded from what arrived.
#[derive(Debug, Default)]
pub(crate) struct ServerCodec;

impl Decoder for ServerCodec {
    type Item = RequestFrame;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestFrame>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let frame_len = next_frame_len(buf);
        let frame = buf.split_to(frame_len).freeze();
        Ok(Some(decode_frame(frame)))
    }
}

impl Encoder<ResponseAdu> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<()> {
        encode_response_adu(buf, &adu);
        Ok(())
    }
}

fn next_frame_len(buf: &[u8]) -> usize {
    let available = buf.len();
    if available < HEADER_LEN {
        return available;
    }
    // The length field counts the unit id and everything after it.
    let declared = HEADER_LEN - 1 + usize::from(BigEndian::read_u16(&buf[4..6]));
    if (MIN_FRAME_LEN..available).contains(&declared) {
        declared
    } else {
        available
    }
}

/// Decodes a single MBAP frame.
///
/// The protocol id and the length field are not validated.
pub(crate) fn decode_frame(frame: Bytes) -> RequestFrame {
    if frame.len() < MIN_FRAME_LEN {
        return RequestFrame::Truncated(frame.len());
    }
    let hdr = Header {
        transaction_id: BigEndian::read_u16(&frame[0..2]),
        unit_id: frame[6],
    };
    let function = FunctionCode::new(frame[HEADER_LEN]);
    match Request::try_from(frame.slice(HEADER_LEN..)) {
        Ok(request) => RequestFrame::Request(RequestAdu { hdr, request }),
        Err(error) => RequestFrame::Malformed {
            hdr,
            function,
            error,
        },
    }
}

pub(crate) fn encode_response_adu(buf: &mut BytesMut, adu: &ResponseAdu) {
    let pdu_len = response_pdu_size(&adu.pdu);
    buf.reserve(HEADER_LEN + pdu_len);
    buf.put_u16(adu.hdr.transaction_id);
    buf.put_u16(PROTOCOL_ID);
    buf.put_u16(u16_len(pdu_len + 1));
    buf.put_u8(adu.hdr.unit_id);
    encode_response_result_pdu(buf, &adu.pdu);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ExceptionCode, ExceptionResponse, Response, ResponsePdu};

    fn decode_all(bytes: &[u8]) -> Vec<RequestFrame> {
        let mut codec = ServerCodec;
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        assert!(buf.is_empty());
        frames
    }

    fn encode(adu: ResponseAdu) -> Vec<u8> {
        let mut codec = ServerCodec;
        let mut buf = BytesMut::new();
        codec.encode(adu, &mut buf).unwrap();
        buf.to_vec()
    }

    mod server {
        use super::*;

        #[test]
        fn decode_empty_buffer() {
            assert!(decode_all(&[]).is_empty());
        }

        #[test]
        fn decode_read_request() {
            let frames = decode_all(&[
                0x12, 0x34, // transaction id
                0x00, 0x00, // protocol id
                0x00, 0x06, // length
                0x01, // unit id
                0x03, 0x00, 0x02, 0x00, 0x03,
            ]);
            assert_eq!(frames.len(), 1);
            let RequestFrame::Request(adu) = &frames[0] else {
                panic!("unexpected frame: {:?}", frames[0]);
            };
            assert_eq!(adu.hdr.transaction_id, 0x1234);
            assert_eq!(adu.hdr.unit_id, 0x01);
            assert_eq!(adu.request, Request::ReadHoldingRegisters(2, 3));
        }

        #[test]
        fn decode_truncated_frames() {
            let frames = decode_all(&[0x00, 0x01, 0x00]);
            assert!(matches!(frames[..], [RequestFrame::Truncated(3)]));

            let frames = decode_all(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01]);
            assert!(matches!(frames[..], [RequestFrame::Truncated(7)]));
        }

        #[test]
        fn decode_malformed_pdu() {
            let frames = decode_all(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x01, 0x03, 0x00]);
            assert_eq!(frames.len(), 1);
            let RequestFrame::Malformed { hdr, function, .. } = &frames[0] else {
                panic!("unexpected frame: {:?}", frames[0]);
            };
            assert_eq!(hdr.transaction_id, 7);
            assert_eq!(*function, FunctionCode::ReadHoldingRegisters);
        }

        #[test]
        fn decode_unsupported_function() {
            let frames = decode_all(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x01, 0x2B]);
            let RequestFrame::Request(adu) = &frames[0] else {
                panic!("unexpected frame: {:?}", frames[0]);
            };
            assert_eq!(adu.request, Request::Custom(0x2B, vec![]));
        }

        #[test]
        fn decode_oversized_unsupported_function() {
            let mut frame = vec![0x00, 0x01, 0x00, 0x00, 0x01, 0x01, 0x01, 0x2B];
            frame.resize(HEADER_LEN + 256, 0xAA);
            let frames = decode_all(&frame);
            assert_eq!(frames.len(), 1);
            let RequestFrame::Request(adu) = &frames[0] else {
                panic!("unexpected frame: {:?}", frames[0]);
            };
            assert_eq!(adu.request.function_code(), FunctionCode::Custom(0x2B));
        }

        #[test]
        fn split_coalesced_frames() {
            let frames = decode_all(&[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01, //
                0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x02, 0x01, 0x00, 0x08, 0x00, 0x10,
            ]);
            assert_eq!(frames.len(), 2);
            let (RequestFrame::Request(first), RequestFrame::Request(second)) =
                (&frames[0], &frames[1])
            else {
                panic!("unexpected frames: {frames:?}");
            };
            assert_eq!(first.hdr.transaction_id, 1);
            assert_eq!(first.request, Request::ReadHoldingRegisters(0, 1));
            assert_eq!(second.hdr.unit_id, 2);
            assert_eq!(second.request, Request::ReadCoils(8, 16));
        }

        #[test]
        fn overlong_length_field_consumes_available_bytes() {
            let frames = decode_all(&[
                0x00, 0x01, 0x00, 0x00, 0x00, 0xFF, 0x01, 0x04, 0x00, 0x00, 0x00, 0x01,
            ]);
            let RequestFrame::Request(adu) = &frames[0] else {
                panic!("unexpected frame: {:?}", frames[0]);
            };
            assert_eq!(adu.request, Request::ReadInputRegisters(0, 1));
        }

        #[test]
        fn trailing_fragment_after_complete_frame() {
            let frames = decode_all(&[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01, //
                0x00, 0x02, 0x00,
            ]);
            assert_eq!(frames.len(), 2);
            assert!(matches!(frames[1], RequestFrame::Truncated(3)));
        }

        #[test]
        fn encode_read_response() {
            let bytes = encode(ResponseAdu {
                hdr: Header {
                    transaction_id: 0x1234,
                    unit_id: 0x01,
                },
                pdu: Response::ReadHoldingRegisters(vec![10, 20, 30]).into(),
            });
            assert_eq!(
                bytes,
                [
                    0x12, 0x34, 0x00, 0x00, 0x00, 0x09, 0x01, 0x03, 0x06, 0x00, 0x0A, 0x00, 0x14,
                    0x00, 0x1E
                ]
            );
        }

        #[test]
        fn encode_write_multiple_response() {
            let bytes = encode(ResponseAdu {
                hdr: Header {
                    transaction_id: 0x0001,
                    unit_id: 0x01,
                },
                pdu: Response::WriteMultipleRegisters(2, 3).into(),
            });
            assert_eq!(
                bytes,
                [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x10, 0x00, 0x02, 0x00, 0x03]
            );
        }

        #[test]
        fn encode_exception_response() {
            let bytes = encode(ResponseAdu {
                hdr: Header {
                    transaction_id: 0x0102,
                    unit_id: 0x07,
                },
                pdu: ResponsePdu(Err(ExceptionResponse {
                    function: FunctionCode::ReadCoils,
                    exception: ExceptionCode::GatewayTargetDevice,
                })),
            });
            assert_eq!(bytes, [0x01, 0x02, 0x00, 0x00, 0x00, 0x03, 0x07, 0x81, 0x0B]);
        }
    }
}
