use crate::domain::{ProductId, Snapshot};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestRow {
    pub query: String,
    pub position: u32,
    /// Set only for promoted rows.
    pub promo_position: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestEntry {
    pub category: String,
    pub product_id: ProductId,
    pub name: String,
    pub rows: Vec<DigestRow>,
}

/// Post-check listing of every product found, for the "check finished" message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckDigest {
    pub checked_from: Option<DateTime<FixedOffset>>,
    pub checked_to: Option<DateTime<FixedOffset>>,
    pub entries: Vec<DigestEntry>,
}

type DigestKey<'a> = (&'a str, (bool, usize, &'a str), &'a str);

/// Groups a snapshot by `(category, product_id, name)` in key order; numeric
/// ids sort by value.
pub fn check_digest(snapshot: &Snapshot) -> CheckDigest {
    let mut grouped: BTreeMap<DigestKey<'_>, Vec<DigestRow>> = BTreeMap::new();
    for o in snapshot {
        grouped
            .entry((o.category.as_str(), o.product_id.numeric_order(), o.name.as_str()))
            .or_default()
            .push(DigestRow {
                query: o.query.clone(),
                position: o.position,
                promo_position: if o.promo_flag { o.promo_position } else { None },
            });
    }

    let window = snapshot.captured_window();
    CheckDigest {
        checked_from: window.map(|(from, _)| from),
        checked_to: window.map(|(_, to)| to),
        entries: grouped
            .into_iter()
            .map(|((category, (_, _, product_id), name), rows)| DigestEntry {
                category: category.to_string(),
                product_id: ProductId::new(product_id),
                name: name.to_string(),
                rows,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::time::parse_checked_at;

    fn obs(id: u64, category: &str, query: &str, position: u32) -> Observation {
        let at = parse_checked_at("2025-03-01 10:00").unwrap();
        Observation::new(id, "Item", category, query, position, at)
    }

    #[test]
    fn groups_in_key_order_and_keeps_row_order() {
        let s = Snapshot::new(vec![
            obs(2, "skirts", "mini", 4),
            obs(1, "dresses", "summer", 7).with_promo_position(Some(2)),
            obs(2, "skirts", "midi", 9),
        ]);

        let digest = check_digest(&s);
        assert_eq!(digest.entries.len(), 2);
        assert_eq!(digest.entries[0].category, "dresses");
        assert_eq!(digest.entries[0].rows[0].promo_position, Some(2));

        let queries: Vec<_> = digest.entries[1].rows.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(queries, vec!["mini", "midi"]);
        assert!(digest.checked_from.is_some());
    }

    #[test]
    fn article_ids_sort_by_value_within_category() {
        let s = Snapshot::new(vec![
            obs(10, "dresses", "a", 1),
            obs(9, "dresses", "a", 2),
            obs(100, "dresses", "a", 3),
        ]);
        let ids: Vec<_> = check_digest(&s)
            .entries
            .iter()
            .map(|e| e.product_id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["9", "10", "100"]);
    }

    #[test]
    fn empty_snapshot_has_no_entries() {
        let digest = check_digest(&Snapshot::empty());
        assert!(digest.entries.is_empty());
        assert!(digest.checked_from.is_none());
    }
}
