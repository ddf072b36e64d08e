use parking_lot::RwLock;
use std::ops::Deref;
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use thiserror::Error as ThisError;

/// Number of slots in the store. Valid indices are `0..CAPACITY`.
pub const CAPACITY: usize = 1000;

/// Engine-wide operating mode. It decides which storage operations are allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Mode {
    /// Neither reads nor writes are served.
    Maintenance,
    ReadOnly,
    ReadWrite,
}

impl Mode {
    fn allows_read(self) -> bool {
        !matches!(self, Mode::Maintenance)
    }

    fn allows_write(self) -> bool {
        matches!(self, Mode::ReadWrite)
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    #[error("storage state doesn't allow this operation")]
    Unavailable,
    #[error("index is out of range: valid index is in [0;{capacity})")]
    OutOfRange { index: i64, capacity: usize },
}

/// The Store is a fixed array of string slots guarded by an engine-wide mode.
///
/// The mode and every slot are separate exclusion domains: operations on distinct indices never
/// contend with each other, and an operation holds at most one slot lock at a time. The store is
/// cheap to clone, every clone shares the same slots through reference counting.
#[derive(Clone)]
pub struct Store {
    inner: Arc<InnerStore>,
}

impl Store {
    pub fn new() -> Store {
        Store::with_mode(Mode::ReadWrite)
    }

    pub fn with_mode(mode: Mode) -> Store {
        let slots = (0..CAPACITY)
            .map(|_| RwLock::new(String::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let inner = Arc::new(InnerStore {
            mode: RwLock::new(mode),
            slots,
        });

        Self { inner }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Store {
    type Target = InnerStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct InnerStore {
    mode: RwLock<Mode>,
    slots: Box<[RwLock<String>]>,
}

impl InnerStore {
    pub fn mode(&self) -> Mode {
        *self.mode.read()
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.write() = mode;
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn read(&self, index: i64) -> Result<String, Error> {
        if !self.mode().allows_read() {
            return Err(Error::Unavailable);
        }

        let slot = self.slot(index)?;
        let value = slot.read().clone();
        Ok(value)
    }

    pub fn write(&self, index: i64, value: String) -> Result<(), Error> {
        // The mode guard outlives the slot guard, so a concurrent `set_mode` can't slip in between
        // the check and the mutation.
        let mode = self.mode.read();
        if !mode.allows_write() {
            return Err(Error::Unavailable);
        }

        let slot = self.slot(index)?;
        *slot.write() = value;
        Ok(())
    }

    fn slot(&self, index: i64) -> Result<&RwLock<String>, Error> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.slots.get(i))
            .ok_or(Error::OutOfRange {
                index,
                capacity: self.slots.len(),
            })
    }
}
