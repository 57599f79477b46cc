//! Live and cumulative identity sets over tracker ids.

use std::collections::{BTreeMap, HashSet};

use crowdwatch_models::TrackedDetection;

/// Counts after one tracker update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentitySnapshot {
    /// Ids present in the current frame.
    pub live_count: usize,
    /// Distinct ids seen since the session started.
    pub unique_count: usize,
}

/// Maintains `current ⊆ unique` over externally assigned track ids.
///
/// Only detections whose class is in the counted set contribute to the live
/// and unique counts. Every class contributes to the per-class unique map.
/// Detections without a track id are ignored.
#[derive(Debug, Clone)]
pub struct IdentitySetTracker {
    counted_classes: HashSet<String>,
    current_ids: HashSet<u64>,
    unique_ids: HashSet<u64>,
    per_class: BTreeMap<String, HashSet<u64>>,
}

impl Default for IdentitySetTracker {
    fn default() -> Self {
        Self::new(["person"])
    }
}

impl IdentitySetTracker {
    pub fn new<I, S>(counted_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            counted_classes: counted_classes
                .into_iter()
                .map(|c| normalize_label(&c.into()))
                .filter(|c| !c.is_empty())
                .collect(),
            current_ids: HashSet::new(),
            unique_ids: HashSet::new(),
            per_class: BTreeMap::new(),
        }
    }

    fn is_counted(&self, class_label: &str) -> bool {
        self.counted_classes.contains(class_label)
    }

    /// Replace the live set with this frame's detections.
    ///
    /// An empty slice is a valid frame with zero detections.
    pub fn update(&mut self, detections: &[TrackedDetection]) -> IdentitySnapshot {
        self.current_ids.clear();
        for detection in detections {
            let Some(id) = detection.track_id else {
                continue;
            };
            let class_label = normalize_label(&detection.class_label);
            if self.is_counted(&class_label) {
                self.current_ids.insert(id);
            }
            self.per_class.entry(class_label).or_default().insert(id);
        }
        self.unique_ids.extend(self.current_ids.iter().copied());
        self.snapshot()
    }

    pub fn snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot {
            live_count: self.live_count(),
            unique_count: self.unique_count(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.current_ids.len()
    }

    pub fn unique_count(&self) -> usize {
        self.unique_ids.len()
    }

    pub fn current_ids(&self) -> &HashSet<u64> {
        &self.current_ids
    }

    pub fn unique_ids(&self) -> &HashSet<u64> {
        &self.unique_ids
    }

    /// Distinct ids seen per class label.
    pub fn unique_instances(&self) -> BTreeMap<String, usize> {
        self.per_class
            .iter()
            .map(|(label, ids)| (label.clone(), ids.len()))
            .collect()
    }

    /// Start a new tracking session.
    pub fn reset(&mut self) {
        self.current_ids.clear();
        self.unique_ids.clear();
        self.per_class.clear();
    }
}

/// Class labels compare case-insensitively, ignoring surrounding space.
fn normalize_label(class_label: &str) -> String {
    class_label.trim().to_lowercase()
}
