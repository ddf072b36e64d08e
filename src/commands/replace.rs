use crate::commands::executable::Executable;
use crate::commands::CommandError;
use crate::store::Store;

/// Stores `value` at `index`, replacing what was there. Only allowed in read-write mode.
#[derive(Debug, PartialEq)]
pub struct Replace {
    pub index: i64,
    pub value: String,
}

impl Executable for Replace {
    fn exec(self, store: &Store) -> Result<String, CommandError> {
        store.write(self.index, self.value)?;
        Ok(String::new())
    }
}
