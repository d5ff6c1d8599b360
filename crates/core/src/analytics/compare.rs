use crate::analytics::{mean, percentage, round1};
use crate::domain::{Observation, ProductId, Snapshot};
use crate::error::{AnalyticsError, Result};
use serde::Serialize;
use std::collections::HashMap;

// Summary verdict thresholds, as fractions of joined records.
const STRONG_IMPROVED_SHARE: f64 = 0.7;
const WEAK_WORSENED_SHARE: f64 = 0.5;
const PROMO_IMPROVED_FLOOR: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Improved,
    Worsened,
    Unchanged,
}

impl Direction {
    pub fn from_delta(delta: i64) -> Self {
        match delta {
            d if d > 0 => Self::Improved,
            d if d < 0 => Self::Worsened,
            _ => Self::Unchanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRecord {
    pub product_id: ProductId,
    pub name: String,
    pub query: String,
    pub previous_position: u32,
    pub current_position: u32,
    /// `previous - current`; positive means the product moved up.
    pub delta: i64,
    pub direction: Direction,
    pub current_promo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductComparison {
    pub product_id: ProductId,
    pub name: String,
    pub records: Vec<ComparisonRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Most positions improved.
    Strong,
    /// More than half of the positions got worse.
    Weak,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub total: usize,
    pub improved: usize,
    pub worsened: usize,
    pub unchanged: usize,
    pub improved_pct: f64,
    pub worsened_pct: f64,
    pub unchanged_pct: f64,
    pub avg_improvement: f64,
    /// Magnitude, reported as a positive number.
    pub avg_worsening: f64,
    pub promo_total: usize,
    pub promo_improved: usize,
    pub verdict: Verdict,
    pub promo_underperforming: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub products: Vec<ProductComparison>,
    pub summary: ComparisonSummary,
}

impl Comparison {
    pub fn records(&self) -> impl Iterator<Item = &ComparisonRecord> {
        self.products.iter().flat_map(|p| p.records.iter())
    }
}

type JoinKey<'a> = (&'a ProductId, &'a str, &'a str);

fn join_key(o: &Observation) -> JoinKey<'_> {
    (&o.product_id, o.name.as_str(), o.query.as_str())
}

/// Inner-joins two snapshots on `(product_id, name, query)`.
///
/// Rows present on one side only are dropped. Output follows the previous
/// snapshot's row order, grouped by product in first-seen order.
pub fn compare_snapshots(
    previous: Option<&Snapshot>,
    current: Option<&Snapshot>,
) -> Result<Comparison> {
    let previous = previous.ok_or_else(|| {
        AnalyticsError::ComparisonUnavailable("no previous check to compare against".to_string())
    })?;
    let current = current.ok_or_else(|| {
        AnalyticsError::ComparisonUnavailable("no current check data".to_string())
    })?;

    let records = join(previous, current);
    if records.is_empty() {
        return Err(AnalyticsError::ComparisonUnavailable(
            "no products in common between checks".to_string(),
        ));
    }

    let summary = summarize(&records);
    let products = group_records(records);

    tracing::debug!(
        products = products.len(),
        joined = summary.total,
        improved = summary.improved,
        worsened = summary.worsened,
        "snapshots compared"
    );

    Ok(Comparison { products, summary })
}

fn join(previous: &Snapshot, current: &Snapshot) -> Vec<ComparisonRecord> {
    let mut by_key: HashMap<JoinKey<'_>, Vec<&Observation>> = HashMap::new();
    for o in current {
        by_key.entry(join_key(o)).or_default().push(o);
    }

    let mut out = Vec::new();
    for prev in previous {
        let Some(matches) = by_key.get(&join_key(prev)) else {
            continue;
        };
        for curr in matches {
            let delta = i64::from(prev.position) - i64::from(curr.position);
            out.push(ComparisonRecord {
                product_id: prev.product_id.clone(),
                name: prev.name.clone(),
                query: prev.query.clone(),
                previous_position: prev.position,
                current_position: curr.position,
                delta,
                direction: Direction::from_delta(delta),
                current_promo: curr.promo_flag,
            });
        }
    }
    out
}

fn group_records(records: Vec<ComparisonRecord>) -> Vec<ProductComparison> {
    let mut index: HashMap<ProductId, usize> = HashMap::new();
    let mut out: Vec<ProductComparison> = Vec::new();
    for r in records {
        match index.get(&r.product_id) {
            Some(&i) => out[i].records.push(r),
            None => {
                index.insert(r.product_id.clone(), out.len());
                out.push(ProductComparison {
                    product_id: r.product_id.clone(),
                    name: r.name.clone(),
                    records: vec![r],
                });
            }
        }
    }
    out
}

fn summarize(records: &[ComparisonRecord]) -> ComparisonSummary {
    let total = records.len();
    let count = |d: Direction| records.iter().filter(|r| r.direction == d).count();
    let improved = count(Direction::Improved);
    let worsened = count(Direction::Worsened);
    let unchanged = count(Direction::Unchanged);

    let avg_improvement = mean(
        records
            .iter()
            .filter(|r| r.delta > 0)
            .map(|r| r.delta as f64),
    )
    .map(round1)
    .unwrap_or(0.0);
    let avg_worsening = mean(
        records
            .iter()
            .filter(|r| r.delta < 0)
            .map(|r| r.delta.unsigned_abs() as f64),
    )
    .map(round1)
    .unwrap_or(0.0);

    let promo_total = records.iter().filter(|r| r.current_promo).count();
    let promo_improved = records
        .iter()
        .filter(|r| r.current_promo && r.direction == Direction::Improved)
        .count();

    let share = |part: usize, whole: usize| {
        if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64
        }
    };
    let verdict = if share(improved, total) > STRONG_IMPROVED_SHARE {
        Verdict::Strong
    } else if share(worsened, total) > WEAK_WORSENED_SHARE {
        Verdict::Weak
    } else {
        Verdict::Neutral
    };

    ComparisonSummary {
        total,
        improved,
        worsened,
        unchanged,
        improved_pct: percentage(improved, total),
        worsened_pct: percentage(worsened, total),
        unchanged_pct: percentage(unchanged, total),
        avg_improvement,
        avg_worsening,
        promo_total,
        promo_improved,
        verdict,
        promo_underperforming: promo_total > 0
            && share(promo_improved, promo_total) < PROMO_IMPROVED_FLOOR,
    }
}
