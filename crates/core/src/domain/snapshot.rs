use crate::domain::identity::ProductId;
use crate::domain::observation::Observation;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// The complete set of observations captured by one scrape run.
///
/// Immutable once built; shared between readers behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    observations: Vec<Observation>,
}

impl Snapshot {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn contains_product(&self, id: &ProductId) -> bool {
        self.observations.iter().any(|o| &o.product_id == id)
    }

    pub fn rows_for_product(&self, id: &ProductId) -> Vec<&Observation> {
        self.observations
            .iter()
            .filter(|o| &o.product_id == id)
            .collect()
    }

    /// Sorted, deduplicated canonical ids.
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.observations
            .iter()
            .map(|o| o.product_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        unique_in_order(self.observations.iter().map(|o| o.category.as_str()))
    }

    /// Distinct queries in first-seen order.
    pub fn queries(&self) -> Vec<String> {
        unique_in_order(self.observations.iter().map(|o| o.query.as_str()))
    }

    /// Earliest and latest `checked_at` in the snapshot.
    pub fn captured_window(&self) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        let first = self.observations.iter().map(|o| o.checked_at).min()?;
        let last = self.observations.iter().map(|o| o.checked_at).max()?;
        Some((first, last))
    }
}

impl From<Vec<Observation>> for Snapshot {
    fn from(observations: Vec<Observation>) -> Self {
        Self::new(observations)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}

fn unique_in_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in values {
        if seen.insert(v) {
            out.push(v.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_checked_at;

    fn obs(id: &str, category: &str, query: &str, at: &str) -> Observation {
        Observation::new(id, "Item", category, query, 1, parse_checked_at(at).unwrap())
    }

    #[test]
    fn read_helpers_tolerate_empty_snapshot() {
        let s = Snapshot::empty();
        assert!(s.product_ids().is_empty());
        assert!(s.categories().is_empty());
        assert!(s.queries().is_empty());
        assert!(!s.contains_product(&ProductId::new("1")));
        assert!(s.captured_window().is_none());
    }

    #[test]
    fn product_ids_are_sorted_and_deduplicated() {
        let s = Snapshot::new(vec![
            obs("30", "a", "q", "2025-03-01"),
            obs("100", "a", "q", "2025-03-01"),
            obs(" 30", "a", "q2", "2025-03-01"),
        ]);
        let ids: Vec<_> = s.product_ids().into_iter().map(ProductId::into_string).collect();
        assert_eq!(ids, vec!["100", "30"]);
    }

    #[test]
    fn categories_and_queries_keep_first_seen_order() {
        let s = Snapshot::new(vec![
            obs("1", "shoes", "boots", "2025-03-01"),
            obs("2", "bags", "tote", "2025-03-01"),
            obs("3", "shoes", "boots", "2025-03-01"),
        ]);
        assert_eq!(s.categories(), vec!["shoes", "bags"]);
        assert_eq!(s.queries(), vec!["boots", "tote"]);
    }

    #[test]
    fn captured_window_spans_min_and_max() {
        let s = Snapshot::new(vec![
            obs("1", "a", "q", "2025-03-02 10:00:00"),
            obs("1", "a", "q", "2025-03-01 10:00:00"),
        ]);
        let (first, last) = s.captured_window().unwrap();
        assert!(first < last);
        assert_eq!(first, parse_checked_at("2025-03-01 10:00:00").unwrap());
    }
}
