//! Shared group -> aggregate -> rank -> truncate steps used by every report.

use crate::analytics::mean;
use crate::domain::Observation;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

#[derive(Debug)]
pub(crate) struct Group<'a, K> {
    pub key: K,
    pub rows: Vec<&'a Observation>,
}

impl<K> Group<'_, K> {
    pub fn mean_position(&self) -> f64 {
        mean(self.rows.iter().map(|o| f64::from(o.position))).unwrap_or(0.0)
    }

    pub fn distinct<T, F>(&self, f: F) -> usize
    where
        T: Eq + Hash,
        F: Fn(&Observation) -> T,
    {
        self.rows.iter().map(|&o| f(o)).collect::<HashSet<_>>().len()
    }

    pub fn promo_count(&self) -> usize {
        self.rows.iter().filter(|o| o.promo_flag).count()
    }
}

/// Groups rows by key; groups come out in first-encountered order.
pub(crate) fn group_by<'a, K, F>(
    rows: impl IntoIterator<Item = &'a Observation>,
    key_fn: F,
) -> Vec<Group<'a, K>>
where
    K: Eq + Hash + Clone,
    F: Fn(&Observation) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Group<'a, K>> = Vec::new();
    for row in rows {
        let key = key_fn(row);
        match index.get(&key) {
            Some(&i) => groups[i].rows.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    rows: vec![row],
                });
            }
        }
    }
    groups
}

/// Stable ascending sort on `metric`, then truncation to `top_n`.
///
/// Equal metrics keep their incoming order.
pub(crate) fn rank_ascending<T, F>(mut items: Vec<T>, metric: F, top_n: usize) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    items.sort_by(|a, b| metric(a).partial_cmp(&metric(b)).unwrap_or(Ordering::Equal));
    items.truncate(top_n);
    items
}

/// Groups, ranks by mean position and builds the report rows of the top groups.
pub(crate) fn top_groups_by_mean<'a, K, T, KF, BF>(
    rows: impl IntoIterator<Item = &'a Observation>,
    key_fn: KF,
    top_n: usize,
    build: BF,
) -> Vec<T>
where
    K: Eq + Hash + Clone,
    KF: Fn(&Observation) -> K,
    BF: Fn(&Group<'a, K>, f64) -> T,
{
    let scored: Vec<(f64, Group<'a, K>)> = group_by(rows, key_fn)
        .into_iter()
        .map(|g| (g.mean_position(), g))
        .collect();
    rank_ascending(scored, |(m, _)| *m, top_n)
        .iter()
        .map(|(m, g)| build(g, *m))
        .collect()
}
