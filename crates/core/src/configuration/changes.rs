//! Unsaved structural change tracking
//!
//! Records which parameters were edited, added or deleted in the active
//! configuration step. Adding and deleting the same name cancels out in
//! either order.

use std::collections::BTreeSet;

/// Edited/added/deleted name sets for the active step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    edited: BTreeSet<String>,
    added: BTreeSet<String>,
    deleted: BTreeSet<String>,
}

impl ChangeTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value or comment edit
    pub fn record_edit(&mut self, name: &str) {
        self.edited.insert(name.to_string());
    }

    /// Record that a parameter was added to the step file
    ///
    /// Cancels a pending deletion of the same name.
    pub fn record_add(&mut self, name: &str) {
        if !self.deleted.remove(name) {
            self.added.insert(name.to_string());
        }
    }

    /// Record that a parameter was removed from the step file
    ///
    /// Cancels a pending addition of the same name.
    pub fn record_delete(&mut self, name: &str) {
        self.edited.remove(name);
        if !self.added.remove(name) {
            self.deleted.insert(name.to_string());
        }
    }

    /// Names edited since the step was loaded
    pub fn edited(&self) -> &BTreeSet<String> {
        &self.edited
    }

    /// Names added since the step was loaded
    pub fn added(&self) -> &BTreeSet<String> {
        &self.added
    }

    /// Names deleted since the step was loaded
    pub fn deleted(&self) -> &BTreeSet<String> {
        &self.deleted
    }

    /// True if an addition or deletion is still pending
    pub fn has_structural_changes(&self) -> bool {
        !self.added.is_empty() || !self.deleted.is_empty()
    }

    /// Forget everything (step changed)
    pub fn clear(&mut self) {
        self.edited.clear();
        self.added.clear();
        self.deleted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tracker() {
        let tracker = ChangeTracker::new();
        assert!(!tracker.has_structural_changes());
    }

    #[test]
    fn test_add_then_delete_cancels() {
        let mut tracker = ChangeTracker::new();
        tracker.record_add("X");
        assert!(tracker.has_structural_changes());
        tracker.record_delete("X");
        assert!(!tracker.has_structural_changes());
    }

    #[test]
    fn test_delete_then_add_cancels() {
        let mut tracker = ChangeTracker::new();
        tracker.record_delete("X");
        assert!(tracker.has_structural_changes());
        tracker.record_add("X");
        assert!(!tracker.has_structural_changes());
    }

    #[test]
    fn test_distinct_names_do_not_cancel() {
        let mut tracker = ChangeTracker::new();
        tracker.record_add("X");
        tracker.record_delete("Y");
        assert!(tracker.has_structural_changes());
        assert!(tracker.added().contains("X"));
        assert!(tracker.deleted().contains("Y"));
    }

    #[test]
    fn test_delete_forgets_edit() {
        let mut tracker = ChangeTracker::new();
        tracker.record_edit("X");
        tracker.record_delete("X");
        assert!(tracker.edited().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut tracker = ChangeTracker::new();
        tracker.record_add("X");
        tracker.record_edit("Y");
        tracker.clear();
        assert_eq!(tracker, ChangeTracker::new());
    }
}
