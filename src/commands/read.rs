use crate::commands::executable::Executable;
use crate::commands::CommandError;
use crate::store::Store;

/// Returns the value at `index`. An index that was never written holds the empty string.
#[derive(Debug, PartialEq)]
pub struct Read {
    pub index: i64,
}

impl Executable for Read {
    fn exec(self, store: &Store) -> Result<String, CommandError> {
        let value = store.read(self.index)?;
        Ok(value)
    }
}
