use std::collections::HashMap;

use crate::clean::normalize_text;
use crate::model::{CleanedRecord, OutputRow};

/// Two records with equal keys describe the same person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub name: String,
    pub region: String,
    pub category: String,
}

impl IdentityKey {
    pub fn new(name: &str, region: &str, category: &str) -> Self {
        Self {
            name: normalize_name(name),
            region: normalize_text(region).to_lowercase(),
            category: normalize_text(category).to_lowercase(),
        }
    }

    pub fn of(record: &CleanedRecord) -> Self {
        Self::new(&record.name, &record.region, &record.category)
    }
}

/// Lowercased, whitespace-collapsed, with a leading "Dr." honorific dropped.
pub fn normalize_name(name: &str) -> String {
    let lowered = normalize_text(name).to_lowercase();
    let stripped = lowered
        .strip_prefix("dr.")
        .or_else(|| lowered.strip_prefix("dr "))
        .unwrap_or(&lowered);
    stripped.trim().to_string()
}

/// Anything the deduplicator can rank.
pub trait Identified {
    fn identity(&self) -> IdentityKey;
    fn filled_fields(&self) -> usize;
}

impl Identified for CleanedRecord {
    fn identity(&self) -> IdentityKey {
        IdentityKey::of(self)
    }

    fn filled_fields(&self) -> usize {
        CleanedRecord::filled_fields(self)
    }
}

impl Identified for OutputRow {
    fn identity(&self) -> IdentityKey {
        IdentityKey::new(&self.name, &self.region, &self.category)
    }

    fn filled_fields(&self) -> usize {
        OutputRow::filled_fields(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Accepted,
    SupersededExisting,
    RejectedDuplicate,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    pub accepted: usize,
    pub superseded: usize,
    pub rejected: usize,
}

/// Keeps the most complete record per [`IdentityKey`]. On equal completeness
/// the record seen first stays. Output order is first-seen order of keys.
#[derive(Debug)]
pub struct Deduplicator<T = CleanedRecord> {
    slots: Vec<T>,
    index: HashMap<IdentityKey, usize>,
    stats: DedupStats,
}

impl<T: Identified> Default for Deduplicator<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            stats: DedupStats::default(),
        }
    }
}

impl<T: Identified> Deduplicator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: T) -> InsertOutcome {
        let key = record.identity();
        match self.index.get(&key).copied() {
            None => {
                self.index.insert(key, self.slots.len());
                self.slots.push(record);
                self.stats.accepted += 1;
                InsertOutcome::Accepted
            }
            Some(slot) if record.filled_fields() > self.slots[slot].filled_fields() => {
                self.slots[slot] = record;
                self.stats.superseded += 1;
                InsertOutcome::SupersededExisting
            }
            Some(_) => {
                self.stats.rejected += 1;
                InsertOutcome::RejectedDuplicate
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }

    pub fn into_records(self) -> Vec<T> {
        self.slots
    }
}
