// src/tracker.rs
//! In-memory state of the calls currently in progress, keyed by
//! `Channel-Unique-ID`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub start_time: DateTime<Utc>,
    pub from: Option<String>,
    pub to: String,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CallRecord {
    pub fn new(from: Option<String>, to: String, start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            from,
            to,
            answer_time: None,
            end_time: None,
        }
    }

    /// Time between creation and answer, once answered.
    pub fn ring_duration(&self) -> Option<Duration> {
        self.answer_time.map(|answered| answered - self.start_time)
    }

    /// Time between answer and hangup; `None` for unanswered calls.
    pub fn talk_duration(&self) -> Option<Duration> {
        match (self.answer_time, self.end_time) {
            (Some(answered), Some(ended)) => Some(ended - answered),
            _ => None,
        }
    }
}

/// Owned by exactly one event processor at a time. Mutation needs `&mut`,
/// so sharing it between concurrent processors requires explicit
/// synchronization by the caller.
#[derive(Debug, Default)]
pub struct CallTracker {
    calls: HashMap<String, CallRecord>,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new call. Returns `false` and leaves the existing record
    /// untouched if the id is already tracked.
    pub fn start(&mut self, unique_id: &str, record: CallRecord) -> bool {
        if self.calls.contains_key(unique_id) {
            warn!("Call {} is already tracked, ignoring duplicate create", unique_id);
            return false;
        }
        self.calls.insert(unique_id.to_string(), record);
        true
    }

    /// Mark a tracked call as answered. The answer time never precedes the
    /// start time.
    pub fn answer(&mut self, unique_id: &str, at: DateTime<Utc>) -> Option<&CallRecord> {
        let record = self.calls.get_mut(unique_id)?;
        record.answer_time = Some(at.max(record.start_time));
        Some(record)
    }

    /// Stop tracking a call, returning its completed record.
    pub fn end(&mut self, unique_id: &str, at: DateTime<Utc>) -> Option<CallRecord> {
        let mut record = self.calls.remove(unique_id)?;
        let floor = record.answer_time.unwrap_or(record.start_time);
        record.end_time = Some(at.max(floor));
        Some(record)
    }

    /// Drop calls started before `now - max_age`, returning their ids. An
    /// age reaching past the representable range evicts nothing.
    pub fn evict_older_than(&mut self, max_age: Duration, now: DateTime<Utc>) -> Vec<String> {
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            return Vec::new();
        };
        let stale: Vec<String> = self
            .calls
            .iter()
            .filter(|(_, record)| record.start_time < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.calls.remove(id);
        }
        stale
    }

    pub fn get(&self, unique_id: &str) -> Option<&CallRecord> {
        self.calls.get(unique_id)
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.calls.contains_key(unique_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
