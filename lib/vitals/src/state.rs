use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::status::AvailabilityStatus;

/// The most recently observed state of a single check.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CheckState {
    /// Current status of the check.
    pub status: AvailabilityStatus,

    /// When the check was last executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,

    /// When the check last succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,

    /// When the check last failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,

    /// When the check was first executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_check_started_at: Option<DateTime<Utc>>,

    /// Number of failures since the last success.
    #[serde(skip_serializing_if = "is_zero")]
    pub contiguous_fails: u32,

    /// Error from the last failed execution. Cleared on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Detail payload reported by the probe on its last execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    #[serde(skip)]
    pub(crate) first_started: Option<Instant>,

    #[serde(skip)]
    pub(crate) last_success: Option<Instant>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl CheckState {
    /// Returns `true` if the check has been executed at least once.
    pub fn has_run(&self) -> bool {
        self.last_checked_at.is_some()
    }

    pub(crate) fn begin_run(&mut self, started: Instant) {
        if self.first_started.is_none() {
            self.first_started = Some(started);
            self.first_check_started_at = Some(Utc::now());
        }
    }

    /// Records an invocation that did not fail.
    ///
    /// Failure counters are reset regardless of the reported status, but only `Up` and custom statuses count as a
    /// success: a probe reporting `Unknown` leaves `last_success_at` untouched.
    pub(crate) fn record_success(&mut self, status: AvailabilityStatus, details: Option<Value>) {
        let now = Utc::now();
        self.last_checked_at = Some(now);
        if status != AvailabilityStatus::Unknown {
            self.last_success_at = Some(now);
            self.last_success = Some(Instant::now());
        }
        self.contiguous_fails = 0;
        self.error = None;
        self.details = details;
        self.status = status;
    }

    pub(crate) fn record_failure(
        &mut self, error: Option<String>, details: Option<Value>, max_contiguous_fails: u32, max_time_in_error: Duration,
    ) {
        let now = Utc::now();
        self.last_checked_at = Some(now);
        self.last_failure_at = Some(now);
        self.contiguous_fails = self.contiguous_fails.saturating_add(1);
        self.error = error;
        self.details = details;
        self.status = if self.failure_thresholds_crossed(max_contiguous_fails, max_time_in_error) {
            AvailabilityStatus::Down
        } else {
            AvailabilityStatus::Up
        };
    }

    fn failure_thresholds_crossed(&self, max_contiguous_fails: u32, max_time_in_error: Duration) -> bool {
        if self.contiguous_fails < max_contiguous_fails {
            return false;
        }

        // Time in error counts from both the very first run and the last success, whichever is later.
        let elapsed_at_least = |since: Option<Instant>| since.map_or(true, |since| since.elapsed() >= max_time_in_error);
        elapsed_at_least(self.first_started) && elapsed_at_least(self.last_success)
    }
}

/// Storage for the latest state of every registered check.
///
/// The set of checks is fixed at construction. Each entry is individually locked, so updating one check never contends
/// with updating another, and readers only ever receive copies.
#[derive(Debug)]
pub(crate) struct StateStore {
    entries: HashMap<Arc<str>, Mutex<CheckState>>,
}

impl StateStore {
    /// Creates a store with an `Unknown` entry for each of the given check names.
    pub fn new<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a Arc<str>>,
    {
        let entries = names
            .into_iter()
            .map(|name| (Arc::clone(name), Mutex::new(CheckState::default())))
            .collect();

        Self { entries }
    }

    /// Gets a copy of the current state of the given check.
    pub fn get(&self, name: &str) -> Option<CheckState> {
        self.entries
            .get(name)
            .map(|entry| entry.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Replaces the state of the given check, returning the previous state.
    ///
    /// Only the routine currently executing the check may call this. Unknown names are ignored.
    pub fn update(&self, name: &str, state: CheckState) -> Option<CheckState> {
        self.entries
            .get(name)
            .map(|entry| std::mem::replace(&mut *entry.lock().unwrap_or_else(PoisonError::into_inner), state))
    }

    /// Takes a copy of every entry.
    pub fn snapshot(&self) -> BTreeMap<String, CheckState> {
        self.entries
            .iter()
            .map(|(name, entry)| {
                let state = entry.lock().unwrap_or_else(PoisonError::into_inner).clone();
                (name.to_string(), state)
            })
            .collect()
    }
}
