//! Append-only update journal.
//!
//! The journal is the time-ordered log every client converges through:
//! pushes append, pollers read deltas by timestamp, and a periodic trim pass
//! bounds memory. Ordering across clients is acceptance order (server
//! timestamps); within one batch request, synthetic millisecond offsets keep
//! submission order even when the wall clock ties.

use beacon_core::errors::SyncError;
use beacon_core::time;
use beacon_core::update::{StoredUpdate, UpdatePayload};
use chrono::Utc;

/// Default journal cap.
pub const DEFAULT_MAX_ENTRIES: usize = 2000;

/// Default entry count for a `poll` without `since`.
pub const DEFAULT_POLL_LIMIT: usize = 100;

/// In-memory, append-only journal of accepted updates.
#[derive(Debug)]
pub struct UpdateJournal {
    updates: Vec<StoredUpdate>,
    max_entries: usize,
    poll_limit: usize,
}

impl UpdateJournal {
    /// Create an empty journal.
    #[must_use]
    pub fn new(max_entries: usize, poll_limit: usize) -> Self {
        Self {
            updates: Vec::new(),
            max_entries,
            poll_limit,
        }
    }

    /// Create a journal pre-populated from a persisted snapshot.
    #[must_use]
    pub fn with_entries(entries: Vec<StoredUpdate>, max_entries: usize, poll_limit: usize) -> Self {
        Self {
            updates: entries,
            max_entries,
            poll_limit,
        }
    }

    /// Accept a single update: validate, assign the server timestamp, append.
    ///
    /// Client-supplied timestamps are ignored. Fails with
    /// [`SyncError::InvalidRequest`] when `type`, `action`, or `data` is
    /// missing; never fails due to journal size.
    pub fn append(&mut self, payload: UpdatePayload) -> Result<StoredUpdate, SyncError> {
        payload.validate()?;
        let stored = StoredUpdate {
            ts: time::now_iso(),
            source: payload.source_or_default().to_string(),
            kind: payload.kind,
            action: payload.action,
            data: payload.data,
        };
        self.updates.push(stored.clone());
        Ok(stored)
    }

    /// Accept a batch of updates with strictly increasing synthetic
    /// timestamps (`base + index` milliseconds), preserving submission order
    /// even when the wall clock would tie.
    ///
    /// Fails with [`SyncError::InvalidRequest`] on an empty batch. Items are
    /// not individually validated; the batch path trusts bulk importers.
    pub fn append_batch(
        &mut self,
        payloads: Vec<UpdatePayload>,
    ) -> Result<Vec<StoredUpdate>, SyncError> {
        if payloads.is_empty() {
            return Err(SyncError::invalid("updates must be a non-empty array"));
        }
        let base = Utc::now();
        let mut stored = Vec::with_capacity(payloads.len());
        for (i, payload) in payloads.into_iter().enumerate() {
            #[allow(clippy::cast_possible_wrap)]
            let ts = time::offset_iso(base, i as i64);
            stored.push(StoredUpdate {
                ts,
                source: payload.source_or_default().to_string(),
                kind: payload.kind,
                action: payload.action,
                data: payload.data,
            });
        }
        self.updates.extend(stored.iter().cloned());
        Ok(stored)
    }

    /// Updates newer than `since` (string comparison on the fixed ISO
    /// format), or the most recent `poll_limit` when `since` is omitted.
    ///
    /// A malformed `since` filters garbage-in/garbage-out without crashing;
    /// server-issued timestamps all share one format, so for well-behaved
    /// clients string order equals time order.
    #[must_use]
    pub fn poll(&self, since: Option<&str>) -> Vec<StoredUpdate> {
        match since {
            Some(since) => self
                .updates
                .iter()
                .filter(|u| u.ts.as_str() > since)
                .cloned()
                .collect(),
            None => {
                let skip = self.updates.len().saturating_sub(self.poll_limit);
                self.updates[skip..].to_vec()
            }
        }
    }

    /// Full journal snapshot, for cold-start reconciliation.
    #[must_use]
    pub fn all(&self) -> Vec<StoredUpdate> {
        self.updates.clone()
    }

    /// Number of journaled updates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Whether the journal is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Timestamp of the most recent update.
    #[must_use]
    pub fn last_ts(&self) -> Option<&str> {
        self.updates.last().map(|u| u.ts.as_str())
    }

    /// Borrow the entries, oldest first (persistence snapshot).
    #[must_use]
    pub fn entries(&self) -> &[StoredUpdate] {
        &self.updates
    }

    /// Discard oldest entries down to the cap; returns the discard count.
    pub fn trim(&mut self) -> usize {
        if self.updates.len() <= self.max_entries {
            return 0;
        }
        let excess = self.updates.len() - self.max_entries;
        let _ = self.updates.drain(..excess);
        excess
    }
}

impl Default for UpdateJournal {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_POLL_LIMIT)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(kind: &str, id: &str) -> UpdatePayload {
        UpdatePayload::new(kind, "create", json!({"id": id}))
    }

    #[test]
    fn append_assigns_server_timestamp() {
        let mut j = UpdateJournal::default();
        let stored = j.append(payload("task", "t1")).unwrap();
        assert_eq!(stored.ts.len(), 24);
        assert!(stored.ts.ends_with('Z'));
        assert_eq!(j.len(), 1);
    }

    #[test]
    fn append_rejects_incomplete_payload() {
        let mut j = UpdateJournal::default();
        let err = j
            .append(UpdatePayload::new("", "create", json!({})))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
        assert!(j.is_empty());
    }

    #[test]
    fn append_defaults_source() {
        let mut j = UpdateJournal::default();
        let stored = j.append(payload("task", "t1")).unwrap();
        assert_eq!(stored.source, "unknown");
        let stored = j
            .append(payload("task", "t2").with_source("mobile"))
            .unwrap();
        assert_eq!(stored.source, "mobile");
    }

    #[test]
    fn batch_timestamps_strictly_increase() {
        let mut j = UpdateJournal::default();
        let payloads: Vec<_> = (0..50).map(|i| payload("log", &format!("l{i}"))).collect();
        let stored = j.append_batch(payloads).unwrap();
        assert_eq!(stored.len(), 50);
        for pair in stored.windows(2) {
            assert!(pair[0].ts < pair[1].ts, "{} !< {}", pair[0].ts, pair[1].ts);
        }
    }

    #[test]
    fn batch_rejects_empty() {
        let mut j = UpdateJournal::default();
        assert!(matches!(
            j.append_batch(vec![]),
            Err(SyncError::InvalidRequest(_))
        ));
    }

    #[test]
    fn batch_items_not_individually_validated() {
        let mut j = UpdateJournal::default();
        // Bulk import path trusts items; only the envelope shape is checked.
        let stored = j
            .append_batch(vec![UpdatePayload::new("", "", serde_json::Value::Null)])
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(j.len(), 1);
    }

    #[test]
    fn poll_since_returns_strictly_newer() {
        let mut j = UpdateJournal::default();
        let first = j.append(payload("task", "t1")).unwrap();
        let batch = j
            .append_batch(vec![payload("task", "t2"), payload("task", "t3")])
            .unwrap();

        let newer = j.poll(Some(&first.ts));
        // Everything with ts > first.ts — at minimum the two batch items,
        // unless the batch landed on the same millisecond (offset makes the
        // second strictly greater regardless).
        assert!(newer.iter().all(|u| u.ts.as_str() > first.ts.as_str()));
        assert!(newer.iter().any(|u| u.ts == batch[1].ts));
    }

    #[test]
    fn poll_with_max_ts_returns_empty() {
        let mut j = UpdateJournal::default();
        let _ = j.append(payload("task", "t1")).unwrap();
        let _ = j.append(payload("task", "t2")).unwrap();
        let max_ts = j.last_ts().unwrap().to_string();
        assert!(j.poll(Some(&max_ts)).is_empty());
    }

    #[test]
    fn poll_without_since_caps_at_limit() {
        let mut j = UpdateJournal::new(DEFAULT_MAX_ENTRIES, 100);
        let payloads: Vec<_> = (0..150).map(|i| payload("log", &format!("l{i}"))).collect();
        let _ = j.append_batch(payloads).unwrap();
        let recent = j.poll(None);
        assert_eq!(recent.len(), 100);
        // The most recent 100, in order
        assert_eq!(recent.last().unwrap().ts, j.last_ts().unwrap());
        assert_eq!(recent[0].data["id"], "l50");
    }

    #[test]
    fn poll_without_since_returns_all_when_short() {
        let mut j = UpdateJournal::default();
        let _ = j.append(payload("task", "t1")).unwrap();
        assert_eq!(j.poll(None).len(), 1);
    }

    #[test]
    fn poll_with_garbage_since_does_not_crash() {
        let mut j = UpdateJournal::default();
        let _ = j.append(payload("task", "t1")).unwrap();
        // "zzz" sorts after any ISO timestamp → empty result, no panic
        assert!(j.poll(Some("zzz")).is_empty());
        // "" sorts before everything → full result
        assert_eq!(j.poll(Some("")).len(), 1);
    }

    #[test]
    fn trim_keeps_most_recent() {
        let mut j = UpdateJournal::new(10, DEFAULT_POLL_LIMIT);
        let payloads: Vec<_> = (0..25).map(|i| payload("log", &format!("l{i}"))).collect();
        let _ = j.append_batch(payloads).unwrap();
        let discarded = j.trim();
        assert_eq!(discarded, 15);
        assert_eq!(j.len(), 10);
        assert_eq!(j.entries()[0].data["id"], "l15");
        assert_eq!(j.entries()[9].data["id"], "l24");
    }

    #[test]
    fn trim_noop_under_cap() {
        let mut j = UpdateJournal::new(10, DEFAULT_POLL_LIMIT);
        let _ = j.append(payload("task", "t1")).unwrap();
        assert_eq!(j.trim(), 0);
        assert_eq!(j.len(), 1);
    }

    #[test]
    fn trim_bound_holds_after_repeated_growth() {
        let mut j = UpdateJournal::new(20, DEFAULT_POLL_LIMIT);
        for round in 0..5 {
            let payloads: Vec<_> = (0..30)
                .map(|i| payload("log", &format!("r{round}-{i}")))
                .collect();
            let _ = j.append_batch(payloads).unwrap();
            let _ = j.trim();
            assert!(j.len() <= 20);
        }
        assert_eq!(j.len(), 20);
    }

    #[test]
    fn with_entries_restores_persisted_journal() {
        let entries = vec![StoredUpdate {
            ts: "2026-02-11T08:17:02.123Z".into(),
            kind: "task".into(),
            action: "create".into(),
            source: "cc".into(),
            data: json!({"id": "t1"}),
        }];
        let j = UpdateJournal::with_entries(entries, 2000, 100);
        assert_eq!(j.len(), 1);
        assert_eq!(j.last_ts(), Some("2026-02-11T08:17:02.123Z"));
    }

    #[test]
    fn all_returns_full_snapshot() {
        let mut j = UpdateJournal::default();
        let _ = j.append(payload("task", "t1")).unwrap();
        let _ = j.append(payload("note", "n1")).unwrap();
        assert_eq!(j.all().len(), 2);
    }
}
