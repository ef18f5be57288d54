use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use tracing::warn;

use super::{Database, Iter, TryFromKeyValue};
use crate::features::{FeatureRecord, Purpose};

/// Submissions identical to one stored within this window are dropped.
const DUPLICATE_WINDOW_NANOS: u64 = 1_000_000_000;

/// One answered prediction request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub(crate) struct QueryLogEntry {
    pub(crate) features: FeatureRecord,
    pub(crate) purpose: Purpose,
    pub(crate) predicted_price: f64,
    pub(crate) timestamp: DateTime<Utc>,
}

impl QueryLogEntry {
    pub(crate) fn new(features: FeatureRecord, purpose: Purpose, predicted_price: f64) -> Self {
        Self {
            features,
            purpose,
            predicted_price,
            timestamp: Utc::now(),
        }
    }

    /// Key of the duplicate marker: everything but the timestamp.
    fn submission_key(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&(
            &self.features,
            self.purpose,
            self.predicted_price.to_bits(),
        ))?)
    }
}

impl TryFromKeyValue for QueryLogEntry {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> Result<Self> {
        bincode::deserialize(value)
            .with_context(|| format!("invalid query log entry for key {key:02x?}"))
    }
}

/// Big-endian nanoseconds since the epoch, so byte order is time order.
fn time_prefix(timestamp: DateTime<Utc>) -> [u8; 8] {
    let nanos = timestamp
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0);
    nanos.to_be_bytes()
}

pub(crate) fn entry_key(timestamp: DateTime<Utc>, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&time_prefix(timestamp));
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn decode_marker(value: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| anyhow!("invalid submission marker of {} bytes", value.len()))?;
    Ok(u64::from_be_bytes(bytes))
}

impl Database {
    /// Stores `entry` unless an identical submission was stored within one
    /// second of it. Returns whether a row was written.
    ///
    /// The marker check and the insert run in one transaction, so concurrent
    /// identical submissions store a single row.
    pub(crate) fn append_query(&self, entry: &QueryLogEntry) -> Result<bool> {
        let marker = entry.submission_key()?;
        let stamp = time_prefix(entry.timestamp);
        let now = u64::from_be_bytes(stamp);
        let key = entry_key(entry.timestamp, self.db.generate_id()?);
        let value = bincode::serialize(entry)?;

        let written = (&self.query_tree, &self.submission_tree)
            .transaction(|(queries, submissions)| {
                if let Some(previous) = submissions.get(&marker)? {
                    let previous =
                        decode_marker(&previous).map_err(ConflictableTransactionError::Abort)?;
                    if previous.abs_diff(now) <= DUPLICATE_WINDOW_NANOS {
                        return Ok(false);
                    }
                }
                submissions.insert(marker.as_slice(), &stamp[..])?;
                queries.insert(key.as_slice(), value.as_slice())?;
                Ok(true)
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => e.into(),
            })?;

        if !written {
            warn!(
                "Duplicate entry prevented: zipcode {}, purpose {}, price {}",
                entry.features.zipcode(),
                entry.purpose,
                entry.predicted_price
            );
        }
        Ok(written)
    }

    /// Overwrites the duplicate marker of `entry` with bytes that do not
    /// decode, so the next identical append fails.
    #[cfg(test)]
    pub(crate) fn corrupt_submission_marker(&self, entry: &QueryLogEntry) -> Result<()> {
        self.submission_tree
            .insert(entry.submission_key()?, &b"bad"[..])?;
        Ok(())
    }

    /// Entries in chronological key order within `[start, end)`.
    pub(crate) fn query_log<T: TryFromKeyValue>(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Iter<T> {
        let start = start.unwrap_or(b"\x00");
        if let Some(end) = end {
            Iter::new(self.query_tree.range(start..end))
        } else {
            Iter::new(self.query_tree.range(start..))
        }
    }

    /// All entries, most recent first.
    pub(crate) fn recent_queries(&self) -> Result<Vec<QueryLogEntry>> {
        self.query_log::<QueryLogEntry>(None, None).rev().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    use chrono::TimeZone;

    use super::*;
    use crate::features::sample_record;

    fn connect() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path()).unwrap();
        (dir, db)
    }

    fn entry_at(secs: i64, millis: u32) -> QueryLogEntry {
        QueryLogEntry {
            features: sample_record(1500.0, "98001"),
            purpose: Purpose::Buy,
            predicted_price: 350_000.0,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, millis * 1_000_000).unwrap(),
        }
    }

    #[test]
    fn duplicate_within_a_second_is_suppressed() {
        let (_dir, db) = connect();
        assert!(db.append_query(&entry_at(0, 0)).unwrap());
        assert!(!db.append_query(&entry_at(0, 500)).unwrap());
        assert_eq!(db.recent_queries().unwrap().len(), 1);
    }

    #[test]
    fn resubmission_after_two_seconds_is_kept() {
        let (_dir, db) = connect();
        assert!(db.append_query(&entry_at(0, 0)).unwrap());
        assert!(db.append_query(&entry_at(2, 0)).unwrap());
        assert_eq!(db.recent_queries().unwrap().len(), 2);
    }

    #[test]
    fn different_submissions_are_kept() {
        let (_dir, db) = connect();
        let first = entry_at(0, 0);
        let mut second = entry_at(0, 100);
        second.purpose = Purpose::Sell;
        assert!(db.append_query(&first).unwrap());
        assert!(db.append_query(&second).unwrap());
        assert_eq!(db.recent_queries().unwrap().len(), 2);
    }

    #[test]
    fn recent_queries_are_newest_first() {
        let (_dir, db) = connect();
        for secs in [10, 0, 5] {
            let mut entry = entry_at(secs, 0);
            entry.predicted_price += f64::from(u32::try_from(secs).unwrap());
            db.append_query(&entry).unwrap();
        }
        let prices: Vec<f64> = db
            .recent_queries()
            .unwrap()
            .iter()
            .map(|e| e.predicted_price)
            .collect();
        assert_eq!(prices, vec![350_010.0, 350_005.0, 350_000.0]);
    }

    #[test]
    fn concurrent_identical_submissions_store_one_entry() {
        let (_dir, db) = connect();
        let trials = 50_u32;
        for trial in 0..trials {
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let db = db.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        let entry = QueryLogEntry::new(
                            sample_record(1500.0, "98001"),
                            Purpose::Buy,
                            350_000.0 + f64::from(trial),
                        );
                        barrier.wait();
                        db.append_query(&entry).unwrap()
                    })
                })
                .collect();
            let written = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|written| *written)
                .count();
            assert_eq!(written, 1, "trial {trial}");
        }
        assert_eq!(
            db.recent_queries().unwrap().len(),
            usize::try_from(trials).unwrap()
        );
    }

    #[test]
    fn corrupt_marker_fails_the_append() {
        let (_dir, db) = connect();
        let entry = entry_at(0, 0);
        db.corrupt_submission_marker(&entry).unwrap();
        assert!(db.append_query(&entry).is_err());
        assert!(db.recent_queries().unwrap().is_empty());
    }

    #[test]
    fn keys_sort_by_time() {
        let early = entry_key(entry_at(0, 0).timestamp, 9);
        let late = entry_key(entry_at(0, 1).timestamp, 1);
        assert!(early < late);
    }
}
