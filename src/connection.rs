use bytes::BytesMut;
use std::io::{self, Cursor};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::frame::{self, Header, Request, Response};

/// Largest packet read from a client. A connection gets exactly one read.
pub const MAX_PACKET_SIZE: usize = 350;

pub struct Connection {
    pub id: Uuid,
    pub client_address: SocketAddr,
    stream: TcpStream,
    // Holds the single packet read from the socket until it is decoded.
    buffer: BytesMut,
    codec: FrameCodec,
}

impl Connection {
    pub fn new(stream: TcpStream, client_address: SocketAddr) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            client_address,
            stream,
            buffer: BytesMut::with_capacity(MAX_PACKET_SIZE),
            codec: FrameCodec,
        }
    }

    /// Reads the client's packet with a single read call. Returns `false` if the client closed the
    /// connection without sending anything.
    pub async fn read_packet(&mut self) -> io::Result<bool> {
        let mut packet = [0u8; MAX_PACKET_SIZE];
        let n = self.stream.read(&mut packet).await?;
        self.buffer.extend_from_slice(&packet[..n]);

        Ok(n > 0)
    }

    /// The header of the packet read so far, if it holds one.
    pub fn header(&self) -> Option<Header> {
        Header::parse(&mut Cursor::new(&self.buffer[..])).ok()
    }

    pub fn decode_request(&mut self) -> Result<Request, frame::Error> {
        self.codec
            .decode(&mut self.buffer)?
            .ok_or(frame::Error::Incomplete)
    }

    pub async fn write_response(&mut self, response: Response) -> Result<(), frame::Error> {
        let mut out = BytesMut::new();
        self.codec.encode(response, &mut out)?;

        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
