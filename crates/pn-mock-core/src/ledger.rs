use std::sync::Arc;

use parking_lot::RwLock;

use crate::record::{Record, RecordKind};

/// Append-only, insertion-ordered store of records for one test run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordLedger {
    records: Vec<Record>,
}

impl RecordLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: Record) {
        self.records.push(record);
    }

    #[must_use]
    pub fn read_all(&self) -> &[Record] {
        &self.records
    }

    /// Records matching `predicate`, in insertion order.
    pub fn read_where<P>(&self, mut predicate: P) -> Vec<&Record>
    where
        P: FnMut(&Record) -> bool,
    {
        self.records.iter().filter(|record| predicate(record)).collect()
    }

    #[must_use]
    pub fn read_kind(&self, kind: RecordKind) -> Vec<&Record> {
        self.read_where(|record| record.kind() == kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<Record> for RecordLedger {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self { records: iter.into_iter().collect() }
    }
}

/// Cloneable handle over one ledger. Appends are serialized behind the write lock; reads copy
/// the records out so callers never hold the lock while projecting.
#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<RwLock<RecordLedger>>,
}

impl SharedLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: Record) {
        self.inner.write().append(record);
    }

    /// Build a record from the current contents and append it under the same write lock.
    ///
    /// The builder sees every record appended before this one and nothing after it.
    pub fn append_with<R, F>(&self, build: F) -> R
    where
        R: Clone + Into<Record>,
        F: FnOnce(&[Record]) -> R,
    {
        let mut ledger = self.inner.write();
        let record = build(ledger.read_all());
        ledger.append(record.clone().into());
        record
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Record> {
        self.inner.read().read_all().to_vec()
    }

    pub fn read_where<P>(&self, predicate: P) -> Vec<Record>
    where
        P: FnMut(&Record) -> bool,
    {
        self.inner.read().read_where(predicate).into_iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
