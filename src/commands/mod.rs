pub mod executable;
pub mod read;
pub mod replace;
pub mod switch_mode;

use thiserror::Error as ThisError;
use tracing::debug;

use crate::commands::executable::Executable;
use crate::frame::{op, Body, Request, Response, ReturnCode};
use crate::store::{self, Store};

use read::Read;
use replace::Replace;
use switch_mode::SwitchMode;

#[derive(Debug, PartialEq)]
pub enum Command {
    SwitchMode(SwitchMode),
    Replace(Replace),
    Read(Read),
}

impl Executable for Command {
    fn exec(self, store: &Store) -> Result<String, CommandError> {
        match self {
            Command::SwitchMode(cmd) => cmd.exec(store),
            Command::Replace(cmd) => cmd.exec(store),
            Command::Read(cmd) => cmd.exec(store),
        }
    }
}

impl TryFrom<Request> for Command {
    type Error = CommandError;

    fn try_from(request: Request) -> Result<Self, Self::Error> {
        let code = request.operation_code;

        if let Some(cmd) = SwitchMode::from_operation_code(code) {
            return Ok(Command::SwitchMode(cmd));
        }

        match (code, request.body) {
            (op::REPLACE, Body::Entry { index, value }) => {
                Ok(Command::Replace(Replace { index, value }))
            }
            (op::READ, Body::Index { index }) => Ok(Command::Read(Read { index })),
            (op::REPLACE | op::READ, _) => Err(CommandError::UnexpectedBody { code }),
            _ => Err(CommandError::UnknownOperation { code }),
        }
    }
}

/// Runs the request against the store and builds the response. Every failure is reported with
/// `ReturnCode::Failure` and the error message as body.
pub fn dispatch(request: Request, store: &Store) -> Response {
    let (operation_code, request_id) = (request.operation_code, request.request_id);

    match Command::try_from(request).and_then(|cmd| cmd.exec(store)) {
        Ok(body) => Response::new(operation_code, request_id, ReturnCode::Ok, body),
        Err(err) => {
            debug!("command failed: {}", err);
            Response::new(operation_code, request_id, ReturnCode::Failure, err.to_string())
        }
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandError {
    #[error("incorrect operation code {code:#010x}")]
    UnknownOperation { code: u32 },
    #[error("request body doesn't match operation code {code:#010x}")]
    UnexpectedBody { code: u32 },
    #[error(transparent)]
    Storage(#[from] store::Error),
}
