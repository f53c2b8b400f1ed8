//! Append-only version history of a document
use crate::diff;
use crate::document::Versioned;
use crate::error::{WorkflowError, abort};
use crate::snapshot::Snapshot;
use crate::store::{encode_tx, load_tx};
use crate::types::TimeStamp;
use crate::utils;
use chrono::Utc;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};

/// State of a document immediately before one update or delete.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct HistoryRecord {
    #[n(0)]
    pub id: String, // bech32 "history_" id
    #[n(1)]
    pub entity_id: String,
    #[n(2)]
    pub version: u32, // 1-based, no gaps
    #[n(3)]
    pub snapshot: Snapshot,
    #[n(4)]
    pub snapshot_digest: String, // sha256 of the CBOR snapshot
    #[n(5)]
    pub changed_by: Option<String>,
    #[n(6)]
    pub changed_at: TimeStamp<Utc>,
}

/// Per-document counter, bumped in the same transaction that writes the record.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone, Default)]
pub struct HistorySequence {
    #[n(0)]
    pub last_version: u32,
    #[n(1)]
    pub last_changed_at: Option<TimeStamp<Utc>>,
}

/// A history record paired with what changed relative to the record before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryView {
    pub record: HistoryRecord,
    pub diff_summary: String,
}

impl HistoryRecord {
    pub fn verify_digest(&self) -> bool {
        self.snapshot
            .digest()
            .map(|digest| digest == self.snapshot_digest)
            .unwrap_or(false)
    }
}

impl HistorySequence {
    /// Version and timestamp for the next record. The timestamp never goes
    /// backwards, so time order and version order agree even if the clock does.
    pub fn advance(&mut self, now: TimeStamp<Utc>) -> (u32, TimeStamp<Utc>) {
        let changed_at = match &self.last_changed_at {
            Some(last) if now <= *last => last.next_tick(),
            _ => now,
        };
        self.last_version += 1;
        self.last_changed_at = Some(changed_at.clone());
        (self.last_version, changed_at)
    }
}

/// Attach a diff summary to each record of a newest-first history.
pub fn with_diffs(watch_list: &[&str], records: Vec<HistoryRecord>) -> Vec<HistoryView> {
    let summaries: Vec<String> = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let prior = records.get(i + 1).map(|older| &older.snapshot);
            diff::diff_summary(watch_list, &record.snapshot, prior)
        })
        .collect();

    records
        .into_iter()
        .zip(summaries)
        .map(|(record, diff_summary)| HistoryView {
            record,
            diff_summary,
        })
        .collect()
}

/// Snapshot `document` as it is now and append it as the next version.
///
/// Runs inside the transaction of the mutation it precedes, so the record only
/// becomes visible if that mutation commits. The version counter is read and
/// bumped in the same transaction, which rules out two records sharing a version.
pub(crate) fn record_before_mutation<T: Versioned>(
    history: &TransactionalTree,
    sequences: &TransactionalTree,
    document: &T,
    record_id: &str,
    changed_by: Option<String>,
) -> ConflictableTransactionResult<HistoryRecord, WorkflowError> {
    let entity_id = document.id();
    let mut sequence: HistorySequence =
        load_tx(sequences, entity_id.as_bytes())?.unwrap_or_default();
    let (version, changed_at) = sequence.advance(TimeStamp::new());

    let snapshot = document.snapshot();
    let snapshot_digest = match snapshot.digest() {
        Ok(digest) => digest,
        Err(err) => return abort(err),
    };
    let record = HistoryRecord {
        id: record_id.to_string(),
        entity_id: entity_id.to_string(),
        version,
        snapshot,
        snapshot_digest,
        changed_by,
        changed_at,
    };

    history.insert(
        utils::history_key(entity_id, version),
        encode_tx(&record)?,
    )?;
    sequences.insert(entity_id.as_bytes(), encode_tx(&sequence)?)?;

    Ok(record)
}

/// Remove every history record of `entity_id` together with its counter.
pub(crate) fn purge_tx(
    history: &TransactionalTree,
    sequences: &TransactionalTree,
    entity_id: &str,
) -> ConflictableTransactionResult<u32, WorkflowError> {
    let sequence: HistorySequence =
        load_tx(sequences, entity_id.as_bytes())?.unwrap_or_default();
    for version in 1..=sequence.last_version {
        history.remove(utils::history_key(entity_id, version))?;
    }
    sequences.remove(entity_id.as_bytes())?;
    Ok(sequence.last_version)
}
