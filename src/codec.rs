use bytes::BytesMut;
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Request, Response};

/// Decodes requests from and encodes responses into a byte buffer.
///
/// The server handles exactly one request per connection, so a decoded request consumes the whole
/// buffer: bytes past the body belong to no other frame.
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Request;
    type Error = frame::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut cursor = Cursor::new(&src[..]);
        let request = match Request::parse(&mut cursor) {
            Ok(request) => request,
            Err(frame::Error::Incomplete) => return Ok(None), // Not even a whole header yet.
            Err(err) => return Err(err),
        };

        src.clear();

        Ok(Some(request))
    }
}

impl Encoder<Response> for FrameCodec {
    type Error = frame::Error;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = item.serialize()?;
        dst.reserve(bytes.len());
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{op, Body, ReturnCode};

    #[test]
    fn decode_waits_for_a_full_header() {
        let mut src = BytesMut::from(&[1u8, 0, 1, 0, 0, 0, 0][..]);

        assert!(FrameCodec.decode(&mut src).unwrap().is_none());
        assert_eq!(src.len(), 7);
    }

    #[test]
    fn decode_consumes_the_buffer() {
        let request = Request::new(
            op::REPLACE,
            42,
            Body::Entry {
                index: 3,
                value: "hello".to_string(),
            },
        );
        let mut src = BytesMut::from(&request.serialize().unwrap()[..]);
        src.extend_from_slice(&[0; 16]);

        let decoded = FrameCodec.decode(&mut src).unwrap();

        assert_eq!(decoded, Some(request));
        assert!(src.is_empty());
    }

    #[test]
    fn decode_reports_oversized_body() {
        let mut src = BytesMut::new();
        src.extend_from_slice(&op::REPLACE.to_le_bytes());
        src.extend_from_slice(&261u32.to_le_bytes());
        src.extend_from_slice(&1u32.to_le_bytes());

        let err = FrameCodec.decode(&mut src).unwrap_err();

        assert!(matches!(err, frame::Error::BodyTooLarge(261)));
    }

    #[test]
    fn encode_appends_response() {
        let mut dst = BytesMut::from(&b"xx"[..]);
        let response = Response::new(op::READ, 4, ReturnCode::Ok, "help me pls");

        FrameCodec.encode(response.clone(), &mut dst).unwrap();

        assert_eq!(&dst[..2], b"xx");
        assert_eq!(&dst[2..], &response.serialize().unwrap()[..]);
    }
}
