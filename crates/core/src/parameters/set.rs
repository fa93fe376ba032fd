//! Ordered parameter collection
//!
//! `ParameterSet` is a name-keyed map that remembers insertion order for
//! export. It exposes only the operations the configuration workflow
//! needs instead of a general map interface, so name uniqueness holds by
//! construction.

use std::collections::HashMap;

use super::documentation::{ParamDocFlags, ParameterDocumentation};
use super::name::mission_planner_cmp;
use super::record::{ParameterRecord, Tolerance};

/// Ordered mapping of parameter name to [`ParameterRecord`]
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    entries: Vec<(String, ParameterRecord)>,
    index: HashMap<String, usize>,
}

/// Result of [`ParameterSet::categorize_by_documentation`]
///
/// The three sets are pairwise disjoint.
#[derive(Debug, Clone, Default)]
pub struct CategorizedParameters {
    /// Non-default parameters the autopilot does not allow writing
    pub read_only: ParameterSet,
    /// Non-default writable parameters produced by calibrations
    pub calibration: ParameterSet,
    /// All remaining non-default parameters
    pub other: ParameterSet,
}

impl ParameterSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the set has no parameters
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if a parameter with this name is present
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Record for a parameter
    pub fn get(&self, name: &str) -> Option<&ParameterRecord> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Value of a parameter
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|r| r.value)
    }

    /// Insert or replace a parameter
    ///
    /// Replacing keeps the original position. Returns the previous record.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        record: ParameterRecord,
    ) -> Option<ParameterRecord> {
        let name = name.into();
        if let Some(&i) = self.index.get(&name) {
            return Some(core::mem::replace(&mut self.entries[i].1, record));
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, record));
        None
    }

    /// Remove a parameter, returning its record
    pub fn remove(&mut self, name: &str) -> Option<ParameterRecord> {
        let i = self.index.remove(name)?;
        let (_, record) = self.entries.remove(i);
        for (_, pos) in self.index.iter_mut() {
            if *pos > i {
                *pos -= 1;
            }
        }
        Some(record)
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterRecord)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    /// Names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Names in Mission Planner order
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_by(|a, b| mission_planner_cmp(a, b));
        names
    }

    /// Copy of this set re-ordered in Mission Planner order
    pub fn sorted(&self) -> ParameterSet {
        self.sorted_names()
            .into_iter()
            .filter_map(|n| self.get(n).map(|r| (n.to_string(), r.clone())))
            .collect()
    }

    /// Overwrite parameters present in `other` and append new ones
    pub fn merge(&mut self, other: &ParameterSet) {
        for (name, record) in other.iter() {
            self.insert(name, record.clone());
        }
    }

    /// Remove parameters whose value and comment exactly match `other`
    pub fn remove_if_similar(&mut self, other: &ParameterSet) {
        self.retain(|name, record| other.get(name) != Some(record));
    }

    /// Remove parameters whose value matches `other` within tolerance
    ///
    /// Comments are ignored, which is what allows subtracting factory
    /// defaults (no comments) from file parameters (with comments).
    pub fn remove_if_value_is_similar(&mut self, other: &ParameterSet, tolerance: Tolerance) {
        self.retain(|name, record| {
            !other
                .value(name)
                .is_some_and(|v| tolerance.is_within(record.value, v))
        });
    }

    /// Parameters absent from `other` or whose value differs beyond tolerance
    pub fn get_missing_or_different(
        &self,
        other: &ParameterSet,
        tolerance: Tolerance,
    ) -> ParameterSet {
        self.filter(|name, record| {
            !other
                .value(name)
                .is_some_and(|v| tolerance.is_within(record.value, v))
        })
    }

    /// Parameters present in `other` with a value matching within tolerance
    ///
    /// Complement of [`ParameterSet::get_missing_or_different`].
    pub fn get_common_parameters(&self, other: &ParameterSet, tolerance: Tolerance) -> ParameterSet {
        self.filter(|name, record| {
            other
                .value(name)
                .is_some_and(|v| tolerance.is_within(record.value, v))
        })
    }

    /// Subtract `defaults`, then split the remainder by documentation flags
    ///
    /// A parameter documented as both read-only and calibration lands in
    /// `read_only`. Undocumented parameters land in `other`.
    pub fn categorize_by_documentation(
        &self,
        documentation: &ParameterDocumentation,
        defaults: &ParameterSet,
        tolerance: Tolerance,
    ) -> CategorizedParameters {
        let mut non_default = self.clone();
        non_default.remove_if_value_is_similar(defaults, tolerance);

        let mut result = CategorizedParameters::default();
        for (name, record) in non_default.entries {
            let flags = documentation.flags(&name);
            let target = if flags.contains(ParamDocFlags::READ_ONLY) {
                &mut result.read_only
            } else if flags.contains(ParamDocFlags::CALIBRATION) {
                &mut result.calibration
            } else {
                &mut result.other
            };
            target.insert(name, record);
        }
        result
    }

    /// Plain name -> value view, dropping comments
    pub fn values_only(&self) -> HashMap<String, f64> {
        self.entries
            .iter()
            .map(|(n, r)| (n.clone(), r.value))
            .collect()
    }

    fn filter<F: Fn(&str, &ParameterRecord) -> bool>(&self, keep: F) -> ParameterSet {
        self.iter()
            .filter(|(n, r)| keep(n, r))
            .map(|(n, r)| (n.to_string(), r.clone()))
            .collect()
    }

    fn retain<F: FnMut(&str, &ParameterRecord) -> bool>(&mut self, mut keep: F) {
        self.entries.retain(|(n, r)| keep(n, r));
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (n, _))| (n.clone(), i))
            .collect();
    }
}

impl PartialEq for ParameterSet {
    /// Order-insensitive: insertion order only matters for export
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(n, r)| other.get(n) == Some(r))
    }
}

impl FromIterator<(String, ParameterRecord)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ParameterRecord)>>(iter: I) -> Self {
        let mut set = ParameterSet::new();
        for (name, record) in iter {
            set.insert(name, record);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = (&'a str, &'a ParameterRecord);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a ParameterRecord)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::documentation::ParameterDoc;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn set(items: &[(&str, f64)]) -> ParameterSet {
        items
            .iter()
            .map(|(n, v)| (n.to_string(), ParameterRecord::new(*v)))
            .collect()
    }

    #[test]
    fn test_insert_keeps_order_and_position() {
        let mut s = set(&[("B", 1.0), ("A", 2.0)]);
        s.insert("B", ParameterRecord::new(3.0));
        let names: Vec<_> = s.names().collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(s.value("B"), Some(3.0));
    }

    #[test]
    fn test_remove_reindexes() {
        let mut s = set(&[("A", 1.0), ("B", 2.0), ("C", 3.0)]);
        assert_eq!(s.remove("A"), Some(ParameterRecord::new(1.0)));
        assert_eq!(s.value("C"), Some(3.0));
        assert_eq!(s.remove("A"), None);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_merge_overwrites_and_appends() {
        let mut a = set(&[("A", 1.0), ("B", 2.0)]);
        let b = set(&[("B", 5.0), ("C", 6.0)]);
        a.merge(&b);
        assert_eq!(a.value("B"), Some(5.0));
        assert_eq!(a.value("C"), Some(6.0));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_remove_if_similar_requires_comment_match() {
        let mut a = ParameterSet::new();
        a.insert("A", ParameterRecord::with_comment(1.0, "why"));
        a.insert("B", ParameterRecord::new(2.0));
        let b = set(&[("A", 1.0), ("B", 2.0)]);
        a.remove_if_similar(&b);
        assert!(a.contains("A"));
        assert!(!a.contains("B"));
    }

    #[test]
    fn test_remove_if_value_is_similar_ignores_comment() {
        let mut a = ParameterSet::new();
        a.insert("A", ParameterRecord::with_comment(1.0, "why"));
        a.insert("B", ParameterRecord::new(2.5));
        let defaults = set(&[("A", 1.00001), ("B", 2.0)]);
        a.remove_if_value_is_similar(&defaults, Tolerance::default());
        assert!(!a.contains("A"));
        assert!(a.contains("B"));
    }

    #[test]
    fn test_missing_or_different() {
        let a = set(&[("A", 1.0), ("B", 2.0), ("C", 3.0)]);
        let b = set(&[("A", 1.0), ("B", 2.5)]);
        let diff = a.get_missing_or_different(&b, Tolerance::EXACT);
        let names: Vec<_> = diff.names().collect();
        assert_eq!(names, vec!["B", "C"]);
        let common = a.get_common_parameters(&b, Tolerance::EXACT);
        assert_eq!(common.names().collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn test_categorize_by_documentation() {
        let params = set(&[
            ("INS_ACCOFFS_X", 0.1),
            ("STAT_RUNTIME", 500.0),
            ("BATT_MONITOR", 4.0),
            ("FRAME_CLASS", 1.0),
        ]);
        let defaults = set(&[("FRAME_CLASS", 1.0), ("BATT_MONITOR", 0.0)]);
        let mut docs = ParameterDocumentation::new();
        docs.insert(
            "INS_ACCOFFS_X",
            ParameterDoc {
                flags: ParamDocFlags::CALIBRATION,
                ..Default::default()
            },
        );
        docs.insert(
            "STAT_RUNTIME",
            ParameterDoc {
                flags: ParamDocFlags::READ_ONLY | ParamDocFlags::CALIBRATION,
                ..Default::default()
            },
        );

        let cat = params.categorize_by_documentation(&docs, &defaults, Tolerance::default());
        assert!(cat.read_only.contains("STAT_RUNTIME"));
        assert!(cat.calibration.contains("INS_ACCOFFS_X"));
        assert!(cat.other.contains("BATT_MONITOR"));
        assert!(!cat.other.contains("FRAME_CLASS"));
        assert_eq!(cat.read_only.len() + cat.calibration.len() + cat.other.len(), 3);
    }

    #[test]
    fn test_sorted_uses_mission_planner_order() {
        let s = set(&[("RC10_MIN", 1.0), ("RC1_MAX_X", 2.0), ("RC1_MAX", 3.0)]);
        assert_eq!(s.sorted_names(), vec!["RC1_MAX", "RC1_MAX_X", "RC10_MIN"]);
        assert_eq!(s.sorted(), s);
    }

    fn arb_set() -> impl Strategy<Value = ParameterSet> {
        proptest::collection::btree_map("[A-E]", -5i32..5, 0..5).prop_map(|m| {
            m.into_iter()
                .map(|(n, v)| (n, ParameterRecord::new(v as f64)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_missing_and_common_partition(a in arb_set(), b in arb_set()) {
            let diff = a.get_missing_or_different(&b, Tolerance::default());
            let common = a.get_common_parameters(&b, Tolerance::default());
            let d: HashSet<_> = diff.names().collect();
            let c: HashSet<_> = common.names().collect();
            prop_assert!(d.is_disjoint(&c));
            let all: HashSet<_> = a.names().collect();
            prop_assert_eq!(d.union(&c).copied().collect::<HashSet<_>>(), all);
        }

        #[test]
        fn prop_remove_if_value_is_similar_exact_keys(a in arb_set(), b in arb_set()) {
            let tol = Tolerance::default();
            let mut reduced = a.clone();
            reduced.remove_if_value_is_similar(&b, tol);
            for (name, record) in a.iter() {
                let similar = b.value(name).is_some_and(|v| tol.is_within(record.value, v));
                prop_assert_eq!(reduced.contains(name), !similar);
            }
        }

        #[test]
        fn prop_categories_partition_non_default(a in arb_set(), defaults in arb_set()) {
            let mut docs = ParameterDocumentation::new();
            docs.insert("A", ParameterDoc { flags: ParamDocFlags::READ_ONLY, ..Default::default() });
            docs.insert("B", ParameterDoc { flags: ParamDocFlags::CALIBRATION, ..Default::default() });
            let tol = Tolerance::default();
            let cat = a.categorize_by_documentation(&docs, &defaults, tol);

            let mut expected = a.clone();
            expected.remove_if_value_is_similar(&defaults, tol);

            let r: HashSet<_> = cat.read_only.names().collect();
            let c: HashSet<_> = cat.calibration.names().collect();
            let o: HashSet<_> = cat.other.names().collect();
            prop_assert!(r.is_disjoint(&c) && r.is_disjoint(&o) && c.is_disjoint(&o));
            let union: HashSet<_> = r.union(&c).chain(o.iter()).copied().collect();
            prop_assert_eq!(union, expected.names().collect::<HashSet<_>>());
        }
    }
}
