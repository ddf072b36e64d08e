use crate::commands::CommandError;
use crate::store::Store;

pub trait Executable {
    /// Runs the command against the store and returns the response body.
    fn exec(self, store: &Store) -> Result<String, CommandError>;
}
