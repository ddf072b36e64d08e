use std::io::Cursor;
use thiserror::Error as ThisError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::commands::switch_mode::SwitchMode;
use crate::frame::{self, op, Body, Request, Response};
use crate::store::Mode;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] frame::Error),
    #[error("Connection closed without a response")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the iproto server.
///
/// The server answers one request per connection, so every call dials a fresh connection. Request
/// ids are assigned sequentially starting from zero.
pub struct Client {
    address: String,
    next_request_id: u32,
}

impl Client {
    pub fn new(address: impl Into<String>) -> Client {
        Client {
            address: address.into(),
            next_request_id: 0,
        }
    }

    pub async fn set_mode(&mut self, mode: Mode) -> Result<Response> {
        let code = SwitchMode { mode }.operation_code();
        self.call(code, Body::Empty).await
    }

    pub async fn write(&mut self, index: i64, value: &str) -> Result<Response> {
        let body = Body::Entry {
            index,
            value: value.to_string(),
        };
        self.call(op::REPLACE, body).await
    }

    pub async fn read(&mut self, index: i64) -> Result<Response> {
        self.call(op::READ, Body::Index { index }).await
    }

    pub async fn call(&mut self, operation_code: u32, body: Body) -> Result<Response> {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let request = Request::new(operation_code, request_id, body);
        self.send_raw(&request.serialize()?).await
    }

    /// Sends already encoded bytes and parses whatever the server answers.
    pub async fn send_raw(&self, packet: &[u8]) -> Result<Response> {
        let mut stream = TcpStream::connect(&self.address).await?;
        stream.write_all(packet).await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;

        if buffer.is_empty() {
            return Err(Error::ConnectionClosed);
        }

        let response = Response::parse(&mut Cursor::new(&buffer[..]))?;
        Ok(response)
    }
}
