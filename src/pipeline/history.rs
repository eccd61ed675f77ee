use serde::Serialize;
use std::collections::VecDeque;

use crate::color::ColorSample;

pub const HISTORY_CAP: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub hex: String,
    pub name: String,
}

impl From<&ColorSample> for HistoryEntry {
    fn from(sample: &ColorSample) -> Self {
        Self {
            hex: sample.hex.clone(),
            name: sample.name.to_string(),
        }
    }
}

/// Most recent samples, newest at index 0. Memory only.
#[derive(Debug)]
pub struct ColorHistory {
    entries: VecDeque<HistoryEntry>,
}

impl Default for ColorHistory {
    fn default() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAP + 1),
        }
    }
}

impl ColorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: &ColorSample) {
        self.entries.push_front(HistoryEntry::from(sample));
        self.entries.truncate(HISTORY_CAP);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}
