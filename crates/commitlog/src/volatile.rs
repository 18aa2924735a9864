/// Volatile, in-memory log.
///
/// A degenerate log with no segments, no files and no recovery: a record's
/// offset is simply how many records came before it. Everything is lost
/// when the value is dropped. Useful as a stand-in for [`Log`](crate::Log)
/// behind [`CommitLog`] in tests and throwaway setups.
use std::sync::RwLock;

use crate::{CommitLog, LogError};

#[derive(Debug, Default)]
pub struct MemoryLog {
    records: RwLock<Vec<Vec<u8>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> Result<u64, LogError> {
        let records = self.records.read().map_err(|_| LogError::Poisoned)?;
        Ok(records.len() as u64)
    }

    pub fn is_empty(&self) -> Result<bool, LogError> {
        Ok(self.len()? == 0)
    }
}

impl CommitLog for MemoryLog {
    fn append(&self, record: &[u8]) -> Result<u64, LogError> {
        let mut records = self.records.write().map_err(|_| LogError::Poisoned)?;
        let offset = records.len() as u64;
        records.push(record.to_vec());
        Ok(offset)
    }

    fn read(&self, offset: u64) -> Result<Vec<u8>, LogError> {
        let records = self.records.read().map_err(|_| LogError::Poisoned)?;
        usize::try_from(offset)
            .ok()
            .and_then(|i| records.get(i))
            .cloned()
            .ok_or(LogError::OutOfRange(offset))
    }
}
