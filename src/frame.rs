// Fixed little-endian header followed by an optional MessagePack body.
//
// request:  | u32 operation_code | u32 body_length | u32 request_id | body
// response: | u32 operation_code | u32 body_length | u32 request_id | u32 return_code | body

use bytes::{Buf, BufMut};
use std::fmt;
use std::io::Cursor;
use std::string::FromUtf8Error;
use thiserror::Error as ThisError;

pub const HEADER_LEN: usize = 12;
pub const RESPONSE_HEADER_LEN: usize = 16;

/// Strings are at most 256 bytes; the extra room covers the index prefix and encoding overhead.
pub const MAX_BODY_LEN: u32 = 260;

/// Operation codes understood by the server.
pub mod op {
    pub const SWITCH_MAINTENANCE: u32 = 0x0001_0001;
    pub const SWITCH_READ_WRITE: u32 = 0x0001_0002;
    pub const SWITCH_READ_ONLY: u32 = 0x0001_0003;
    pub const REPLACE: u32 = 0x0002_0001;
    pub const READ: u32 = 0x0002_0002;
}

/// A request that fails to decode is answered with `ReturnCode::InvalidBody`.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("body length {0} exceeds the maximum of 260 bytes")]
    BodyTooLarge(u32),
    #[error("body holds {0} bytes, expected at least a 4 byte index")]
    MissingIndex(usize),
    #[error("index {0} doesn't fit in 32 bits")]
    IndexOverflow(i64),
    #[error("body text is not valid UTF-8")]
    InvalidUtf8(#[from] FromUtf8Error),
    #[error("invalid body encoding: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("failed to encode body: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ReturnCode {
    Ok = 0,
    /// The operation was rejected by the store or the code is unknown. The body says why.
    Failure = 1,
    InvalidBody = 401,
    TooManyRequests = 402,
}

impl From<ReturnCode> for u32 {
    fn from(code: ReturnCode) -> Self {
        code as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub operation_code: u32,
    pub body_length: u32,
    pub request_id: u32,
}

impl Header {
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        if src.remaining() < HEADER_LEN {
            return Err(Error::Incomplete);
        }

        Ok(Header {
            operation_code: src.get_u32_le(),
            body_length: src.get_u32_le(),
            request_id: src.get_u32_le(),
        })
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "op={:#010x} len={} id={}",
            self.operation_code, self.body_length, self.request_id
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Empty,
    Index { index: i64 },
    Entry { index: i64, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub operation_code: u32,
    pub request_id: u32,
    pub body: Body,
}

impl Request {
    pub fn new(operation_code: u32, request_id: u32, body: Body) -> Request {
        Request {
            operation_code,
            request_id,
            body,
        }
    }

    /// Parses a request. The body shape is chosen by the operation code; bodies of administrative
    /// and unknown operations are skipped.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        let header = Header::parse(src)?;

        if header.body_length > MAX_BODY_LEN {
            return Err(Error::BodyTooLarge(header.body_length));
        }

        // Clients disagree on whether `body_length` counts the encoded body or the raw blob, so
        // the blob is read from whatever follows the header rather than sliced to that length.
        let body = match header.operation_code {
            op::REPLACE => {
                let (index, text) = read_blob(src)?;
                Body::Entry {
                    index,
                    value: String::from_utf8(text)?,
                }
            }
            op::READ => {
                let (index, _) = read_blob(src)?;
                Body::Index { index }
            }
            _ => {
                src.advance(src.remaining());
                Body::Empty
            }
        };

        Ok(Request {
            operation_code: header.operation_code,
            request_id: header.request_id,
            body,
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let body = match &self.body {
            Body::Empty => Vec::new(),
            Body::Index { index } => write_blob(*index, b"")?,
            Body::Entry { index, value } => write_blob(*index, value.as_bytes())?,
        };

        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.put_u32_le(self.operation_code);
        bytes.put_u32_le(body.len() as u32);
        bytes.put_u32_le(self.request_id);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub operation_code: u32,
    pub request_id: u32,
    pub return_code: u32,
    pub body: String,
}

impl Response {
    pub fn new(
        operation_code: u32,
        request_id: u32,
        return_code: ReturnCode,
        body: impl Into<String>,
    ) -> Response {
        Response {
            operation_code,
            request_id,
            return_code: return_code.into(),
            body: body.into(),
        }
    }

    /// Builds an error response for a request that may not have been parsed. The operation code
    /// and request id are echoed when a header was received, and are zero otherwise.
    pub fn failure(header: Option<Header>, return_code: ReturnCode, body: &str) -> Response {
        let (operation_code, request_id) = header
            .map(|h| (h.operation_code, h.request_id))
            .unwrap_or_default();

        Response::new(operation_code, request_id, return_code, body)
    }

    pub fn is_ok(&self) -> bool {
        self.return_code == u32::from(ReturnCode::Ok)
    }

    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        let header = Header::parse(src)?;
        if src.remaining() < 4 {
            return Err(Error::Incomplete);
        }
        let return_code = src.get_u32_le();

        let length = header.body_length as usize;
        if src.remaining() < length {
            return Err(Error::Incomplete);
        }

        let body = if length == 0 {
            String::new()
        } else {
            let start = src.position() as usize;
            let body = rmp_serde::from_slice(&src.get_ref()[start..start + length])?;
            src.advance(length);
            body
        };

        Ok(Response {
            operation_code: header.operation_code,
            request_id: header.request_id,
            return_code,
            body,
        })
    }

    /// An empty body is written as zero bytes rather than as an encoded empty string.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let body = if self.body.is_empty() {
            Vec::new()
        } else {
            rmp_serde::to_vec(&self.body)?
        };

        let mut bytes = Vec::with_capacity(RESPONSE_HEADER_LEN + body.len());
        bytes.put_u32_le(self.operation_code);
        bytes.put_u32_le(body.len() as u32);
        bytes.put_u32_le(self.request_id);
        bytes.put_u32_le(self.return_code);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }
}

// The blob is a little-endian i32 index, optionally followed by the UTF-8 text, wrapped in a
// MessagePack bin (or str) value.
fn read_blob(src: &mut Cursor<&[u8]>) -> Result<(i64, Vec<u8>), Error> {
    let blob: serde_bytes::ByteBuf = rmp_serde::from_read(&mut *src)?;
    let mut blob = blob.into_vec();

    if blob.len() < 4 {
        return Err(Error::MissingIndex(blob.len()));
    }

    let text = blob.split_off(4);
    let index = i32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]);
    Ok((i64::from(index), text))
}

fn write_blob(index: i64, text: &[u8]) -> Result<Vec<u8>, Error> {
    let index = i32::try_from(index).map_err(|_| Error::IndexOverflow(index))?;

    let mut blob = Vec::with_capacity(4 + text.len());
    blob.extend_from_slice(&index.to_le_bytes());
    blob.extend_from_slice(text);

    Ok(rmp_serde::to_vec(serde_bytes::Bytes::new(&blob))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEAR: &str = "Идет медведь по лесу, видит — машина горит. Сел в нее и сгорел.";

    // Builds a request the way the reference clients do: `body_length` holds the raw blob length,
    // not the encoded one.
    fn raw_request(operation_code: u32, request_id: u32, index: u32, text: Option<&str>) -> Vec<u8> {
        let mut blob = index.to_le_bytes().to_vec();
        if let Some(text) = text {
            blob.extend_from_slice(text.as_bytes());
        }
        let encoded = rmp_serde::to_vec(serde_bytes::Bytes::new(&blob)).unwrap();

        let mut bytes = Vec::new();
        bytes.put_u32_le(operation_code);
        bytes.put_u32_le(blob.len() as u32);
        bytes.put_u32_le(request_id);
        bytes.extend_from_slice(&encoded);
        bytes
    }

    fn header_only(operation_code: u32, body_length: u32, request_id: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.put_u32_le(operation_code);
        bytes.put_u32_le(body_length);
        bytes.put_u32_le(request_id);
        bytes
    }

    fn parse(data: &[u8]) -> Result<Request, Error> {
        let mut cursor = Cursor::new(data);
        Request::parse(&mut cursor)
    }

    #[test]
    fn parse_replace_request() {
        let data = raw_request(op::REPLACE, 1, 1, Some(BEAR));

        let request = parse(&data).unwrap();

        assert_eq!(
            request,
            Request::new(
                op::REPLACE,
                1,
                Body::Entry {
                    index: 1,
                    value: BEAR.to_string()
                }
            )
        );
    }

    #[test]
    fn parse_read_request() {
        let data = raw_request(op::READ, 1, 7, None);

        let request = parse(&data).unwrap();

        assert_eq!(request, Request::new(op::READ, 1, Body::Index { index: 7 }));
    }

    #[test]
    fn parse_negative_index() {
        let data = raw_request(op::READ, 3, u32::MAX, None);

        let request = parse(&data).unwrap();

        assert_eq!(request.body, Body::Index { index: -1 });
    }

    #[test]
    fn parse_admin_request_ignores_body() {
        let mut data = header_only(op::SWITCH_READ_ONLY, 3, 9);
        data.extend_from_slice(&[0xc1, 0xc1, 0xc1]);

        let request = parse(&data).unwrap();

        assert_eq!(request, Request::new(op::SWITCH_READ_ONLY, 9, Body::Empty));
    }

    #[test]
    fn parse_unknown_operation_ignores_body() {
        let data = raw_request(0x0003_0001, 2, 5, Some("ignored"));

        let request = parse(&data).unwrap();

        assert_eq!(request, Request::new(0x0003_0001, 2, Body::Empty));
    }

    #[test]
    fn parse_rejects_oversized_body() {
        let long_text = BEAR.repeat(10);
        let data = raw_request(op::REPLACE, 1, 0, Some(&long_text));

        let err = parse(&data).unwrap_err();

        assert!(matches!(err, Error::BodyTooLarge(len) if len as usize == 4 + long_text.len()));
    }

    #[test]
    fn parse_accepts_body_at_the_limit() {
        let text = "x".repeat(256);
        let data = raw_request(op::REPLACE, 1, 0, Some(&text));

        let request = parse(&data).unwrap();

        assert_eq!(
            request.body,
            Body::Entry {
                index: 0,
                value: text
            }
        );
    }

    #[test]
    fn parse_incomplete_header() {
        let err = parse(&[1, 0, 2, 0, 0, 0]).unwrap_err();

        assert!(matches!(err, Error::Incomplete));
    }

    #[test]
    fn parse_blob_without_index() {
        let mut data = header_only(op::READ, 2, 1);
        data.extend(rmp_serde::to_vec(serde_bytes::Bytes::new(&[1, 2])).unwrap());

        let err = parse(&data).unwrap_err();

        assert!(matches!(err, Error::MissingIndex(2)));
    }

    #[test]
    fn parse_missing_body() {
        let data = header_only(op::REPLACE, 15, 1);

        let err = parse(&data).unwrap_err();

        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn parse_invalid_utf8_text() {
        let mut blob = 0u32.to_le_bytes().to_vec();
        blob.extend_from_slice(&[0xff, 0xfe]);
        let mut data = header_only(op::REPLACE, blob.len() as u32, 1);
        data.extend(rmp_serde::to_vec(serde_bytes::Bytes::new(&blob)).unwrap());

        let err = parse(&data).unwrap_err();

        assert!(matches!(err, Error::InvalidUtf8(_)));
    }

    #[test]
    fn parse_blob_encoded_as_string() {
        let mut data = header_only(op::REPLACE, 6, 1);
        data.extend(rmp_serde::to_vec("\u{0}\u{0}\u{0}\u{0}hi").unwrap());

        let request = parse(&data).unwrap();

        assert_eq!(
            request.body,
            Body::Entry {
                index: 0,
                value: "hi".to_string()
            }
        );
    }

    #[test]
    fn serialize_response_with_body() {
        let response = Response::new(0x0002_0002, 1, ReturnCode::Ok, BEAR);

        let bytes = response.serialize().unwrap();

        let mut expected = vec![2, 0, 2, 0, 114, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 217, 112];
        expected.extend_from_slice(BEAR.as_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn serialize_response_without_body() {
        let response = Response::new(op::SWITCH_MAINTENANCE, 0, ReturnCode::Ok, "");

        let bytes = response.serialize().unwrap();

        assert_eq!(bytes, vec![1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn serialize_response_body_lengths() {
        let read = Response::new(op::READ, 4, ReturnCode::Ok, "help me pls");
        let denied = Response::new(
            op::REPLACE,
            1,
            ReturnCode::Failure,
            "storage state doesn't allow this operation",
        );

        let read = read.serialize().unwrap();
        let denied = denied.serialize().unwrap();

        assert_eq!(&read[4..8], &12u32.to_le_bytes());
        assert_eq!(read.len(), RESPONSE_HEADER_LEN + 12);
        assert_eq!(&denied[4..8], &44u32.to_le_bytes());
        assert_eq!(&denied[12..16], &1u32.to_le_bytes());
    }

    #[test]
    fn parse_serialized_response() {
        let response = Response::new(op::READ, 6, ReturnCode::Failure, "nope");
        let bytes = response.serialize().unwrap();
        let mut cursor = Cursor::new(&bytes[..]);

        assert_eq!(Response::parse(&mut cursor).unwrap(), response);
        assert_eq!(cursor.position() as usize, bytes.len());
    }

    #[test]
    fn parse_truncated_response() {
        let bytes = Response::new(op::READ, 6, ReturnCode::Ok, "help me pls")
            .serialize()
            .unwrap();
        let mut cursor = Cursor::new(&bytes[..bytes.len() - 1]);

        assert!(matches!(Response::parse(&mut cursor), Err(Error::Incomplete)));
    }

    #[test]
    fn serialize_request_declares_encoded_length() {
        let request = Request::new(
            op::REPLACE,
            3,
            Body::Entry {
                index: 0,
                value: "help me pls".to_string(),
            },
        );

        let bytes = request.serialize().unwrap();

        // bin8 marker and length byte ahead of the 15 byte blob
        assert_eq!(&bytes[4..8], &17u32.to_le_bytes());
        assert_eq!(bytes.len(), HEADER_LEN + 17);
        assert_eq!(parse(&bytes).unwrap(), request);
    }

    #[test]
    fn serialize_request_rejects_wide_index() {
        let request = Request::new(op::READ, 0, Body::Index { index: 1 << 40 });

        assert!(matches!(
            request.serialize(),
            Err(Error::IndexOverflow(i)) if i == 1 << 40
        ));
    }

    #[test]
    fn failure_echoes_header() {
        let header = Header {
            operation_code: op::READ,
            body_length: 4,
            request_id: 11,
        };

        let echoed = Response::failure(Some(header), ReturnCode::TooManyRequests, "slow down");
        let blank = Response::failure(None, ReturnCode::InvalidBody, "bad");

        assert_eq!((echoed.operation_code, echoed.request_id), (op::READ, 11));
        assert_eq!(echoed.return_code, 402);
        assert_eq!((blank.operation_code, blank.request_id), (0, 0));
        assert!(!blank.is_ok());
    }
}
