use crate::ingest::record::RetrievalRecord;
use std::sync::{Arc, Mutex};

/// Records parsed but not yet confirmed delivered, shared between the
/// ingestion loop (producer) and the delivery loop (consumer).
///
/// Both loops run on independent timers, so the batch lives behind a
/// mutex; `take_all` and `requeue` hold the lock for the whole operation
/// and never await, which keeps the swap atomic with respect to appends
/// happening during a delivery attempt's network wait.
pub type SharedBatch = Arc<Mutex<PendingBatch>>;

#[derive(Debug, Default)]
pub struct PendingBatch {
    records: Vec<RetrievalRecord>,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedBatch {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn append(&mut self, record: RetrievalRecord) {
        self.records.push(record);
    }

    /// Swap the entire batch out for delivery, leaving it empty.
    pub fn take_all(&mut self) -> Vec<RetrievalRecord> {
        std::mem::take(&mut self.records)
    }

    /// Restore a failed in-flight batch ahead of records that arrived
    /// while the delivery attempt was outstanding, so retries preserve
    /// delivery-order fairness.
    pub fn requeue(&mut self, mut in_flight: Vec<RetrievalRecord>) {
        in_flight.append(&mut self.records);
        self.records = in_flight;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
