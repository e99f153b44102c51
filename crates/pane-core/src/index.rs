use std::{
    cmp::Ordering,
    collections::HashSet,
    sync::Arc,
};

use chrono::{DateTime, NaiveDate};
use parking_lot::RwLock;

use crate::types::{MessageRecord, PresentationEntry};

/// Ordered, deduplicated, day-grouped projection of a conversation.
///
/// Entries are kept ascending by timestamp; a timestamp tie sorts a day
/// separator before the day's first message, and two messages with the same
/// timestamp sort by record id. The index owns the dedup sets, so replaying
/// a record (fetch + live push delivering the same id) is a silent no-op.
#[derive(Debug, Default, Clone)]
pub struct PresentationIndex {
    entries: Vec<PresentationEntry>,
    message_ids: HashSet<String>,
    separator_days: HashSet<NaiveDate>,
}

impl PresentationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current projected entries in display order.
    pub fn entries(&self) -> &[PresentationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bounds-checked lookup; out-of-range positions return `None`.
    pub fn entry_at(&self, position: usize) -> Option<&PresentationEntry> {
        self.entries.get(position)
    }

    /// Empty the index, returning every removed position ascending.
    pub fn clear(&mut self) -> Vec<usize> {
        let removed = (0..self.entries.len()).collect();
        self.entries.clear();
        self.message_ids.clear();
        self.separator_days.clear();
        removed
    }

    /// Merge a batch of records into the projection.
    ///
    /// Records already present (by id), records without a timestamp, and
    /// records whose timestamp is outside the calendar range are skipped
    /// silently. A day separator is synthesized for every calendar day not
    /// yet represented. The returned positions are the final positions of
    /// all inserted entries, ascending; pre-existing entries never move.
    pub fn merge(&mut self, records: &[MessageRecord]) -> Vec<usize> {
        let mut fresh: Vec<PresentationEntry> = Vec::new();

        for record in records {
            let Some(timestamp_ms) = record.created_at_ms else {
                continue;
            };
            let Some(day) = day_of(timestamp_ms) else {
                continue;
            };
            if self.message_ids.contains(&record.id) {
                continue;
            }

            self.message_ids.insert(record.id.clone());
            if self.separator_days.insert(day) {
                fresh.push(PresentationEntry::DaySeparator {
                    day,
                    timestamp_ms: day_start_ms(day, timestamp_ms),
                });
            }
            fresh.push(PresentationEntry::Message {
                message_id: record.id.clone(),
                timestamp_ms,
            });
        }

        if fresh.is_empty() {
            return Vec::new();
        }

        // Inserting in ascending key order keeps every recorded position
        // final: later insertions always land strictly after earlier ones.
        fresh.sort_by(entry_cmp);
        let mut inserted = Vec::with_capacity(fresh.len());
        for entry in fresh {
            let position = self
                .entries
                .partition_point(|existing| entry_cmp(existing, &entry) == Ordering::Less);
            self.entries.insert(position, entry);
            inserted.push(position);
        }
        inserted
    }
}

/// Display ordering: timestamp, then separator-before-message, then id.
fn entry_cmp(a: &PresentationEntry, b: &PresentationEntry) -> Ordering {
    a.timestamp_ms()
        .cmp(&b.timestamp_ms())
        .then_with(|| variant_rank(a).cmp(&variant_rank(b)))
        .then_with(|| tie_break(a).cmp(tie_break(b)))
}

fn variant_rank(entry: &PresentationEntry) -> u8 {
    match entry {
        PresentationEntry::DaySeparator { .. } => 0,
        PresentationEntry::Message { .. } => 1,
    }
}

fn tie_break(entry: &PresentationEntry) -> &str {
    match entry {
        PresentationEntry::DaySeparator { .. } => "",
        PresentationEntry::Message { message_id, .. } => message_id,
    }
}

fn day_of(timestamp_ms: u64) -> Option<NaiveDate> {
    let timestamp_ms = i64::try_from(timestamp_ms).ok()?;
    Some(DateTime::from_timestamp_millis(timestamp_ms)?.date_naive())
}

fn day_start_ms(day: NaiveDate, fallback_ms: u64) -> u64 {
    day.and_hms_opt(0, 0, 0)
        .map(|start| start.and_utc().timestamp_millis())
        .and_then(|ms| u64::try_from(ms).ok())
        .unwrap_or(fallback_ms)
}

/// Read-write-locked handle shared between the coordinator (writer) and the
/// rendering boundary (readers).
///
/// `merge` and `clear` hold the write lock for their whole
/// read-compute-insert sequence, so readers never observe a partially
/// applied mutation.
#[derive(Debug, Default, Clone)]
pub struct SharedPresentationIndex {
    inner: Arc<RwLock<PresentationIndex>>,
}

impl SharedPresentationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, records: &[MessageRecord]) -> Vec<usize> {
        self.inner.write().merge(records)
    }

    pub fn clear(&self) -> Vec<usize> {
        self.inner.write().clear()
    }

    pub fn entry_at(&self, position: usize) -> Option<PresentationEntry> {
        self.inner.read().entry_at(position).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Consistent copy of the whole projection.
    pub fn snapshot(&self) -> Vec<PresentationEntry> {
        self.inner.read().entries().to_vec()
    }
}
