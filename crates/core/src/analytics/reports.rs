use crate::analytics::pipeline::{group_by, top_groups_by_mean};
use crate::analytics::{mean, percentage, round1};
use crate::config::DEFAULT_TOP_N;
use crate::domain::{Observation, ProductId, Snapshot};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandRank {
    pub brand: String,
    pub avg_position: f64,
    pub product_count: usize,
}

/// A product row in a top-N ranking. Category and global rankings fill
/// `distinct_queries`; query rankings fill `promo_count`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRank {
    pub product_id: ProductId,
    pub name: String,
    pub avg_position: f64,
    pub distinct_queries: Option<usize>,
    pub promo_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRank {
    pub query: String,
    pub avg_position: f64,
    pub product_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryReport {
    pub category: String,
    pub brand_count: usize,
    pub product_count: usize,
    pub avg_position: f64,
    pub top_brands: Vec<BrandRank>,
    pub top_products: Vec<ProductRank>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub avg_position: f64,
    pub product_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    pub query: String,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub product_count: usize,
    pub avg_position: f64,
    pub best_position: u32,
    pub promo_percentage: f64,
    pub daily: Vec<DailyStat>,
    pub top_products: Vec<ProductRank>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromoEffect {
    pub product_id: ProductId,
    pub name: String,
    pub avg_position_without_promo: f64,
    pub avg_position_with_promo: f64,
    /// Positive when the promoted placement ranked better.
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromoReport {
    pub promo_product_count: usize,
    pub avg_promo_position: f64,
    pub avg_non_promo_position: Option<f64>,
    pub most_effective: Vec<PromoEffect>,
    pub least_effective: Vec<PromoEffect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopOverallReport {
    pub top_products: Vec<ProductRank>,
    pub top_queries: Vec<QueryRank>,
}

/// Report generators over one immutable snapshot.
///
/// Every report runs filter -> group -> aggregate -> stable ascending sort on
/// mean position -> truncate to `top_n`. Absent data yields `None`.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsEngine<'a> {
    snapshot: &'a Snapshot,
    top_n: usize,
}

impl<'a> AnalyticsEngine<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            snapshot,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n.max(1);
        self
    }

    pub fn category_report(&self, category: &str) -> Option<CategoryReport> {
        let rows: Vec<&Observation> = self
            .snapshot
            .iter()
            .filter(|o| o.category == category)
            .collect();
        if rows.is_empty() {
            tracing::debug!(category, "category not found");
            return None;
        }

        // Rows without a brand count toward products, never toward brands.
        let branded: Vec<&Observation> = rows
            .iter()
            .copied()
            .filter(|o| !o.brand.trim().is_empty())
            .collect();

        let top_brands = top_groups_by_mean(
            branded.iter().copied(),
            |o| o.brand.trim().to_string(),
            self.top_n,
            |g, m| BrandRank {
                brand: g.key.clone(),
                avg_position: round1(m),
                product_count: g.distinct(|o| o.product_id.clone()),
            },
        );

        let top_products = top_groups_by_mean(
            rows.iter().copied(),
            product_key,
            self.top_n,
            |g, m| ProductRank {
                product_id: g.key.0.clone(),
                name: g.key.1.clone(),
                avg_position: round1(m),
                distinct_queries: Some(g.distinct(|o| o.query.clone())),
                promo_count: None,
            },
        );

        Some(CategoryReport {
            category: category.to_string(),
            brand_count: distinct(&branded, |o| o.brand.trim()),
            product_count: distinct(&rows, |o| o.product_id.as_str()),
            avg_position: round1(mean_position(&rows)),
            top_brands,
            top_products,
        })
    }

    pub fn query_report(&self, query: &str) -> Option<QueryReport> {
        let rows: Vec<&Observation> = self.snapshot.iter().filter(|o| o.query == query).collect();
        if rows.is_empty() {
            tracing::debug!(query, "query not found");
            return None;
        }

        let first_seen = rows.iter().map(|o| o.checked_at).min()?.date_naive();
        let last_seen = rows.iter().map(|o| o.checked_at).max()?.date_naive();
        let best_position = rows.iter().map(|o| o.position).min()?;
        let promo_rows = rows.iter().filter(|o| o.promo_flag).count();

        let mut daily: Vec<DailyStat> =
            group_by(rows.iter().copied(), |o| o.checked_at.date_naive())
                .into_iter()
                .map(|g| DailyStat {
                    date: g.key,
                    avg_position: round1(g.mean_position()),
                    product_count: g.distinct(|o| o.product_id.clone()),
                })
                .collect();
        daily.sort_by_key(|d| d.date);

        let top_products = top_groups_by_mean(
            rows.iter().copied(),
            product_key,
            self.top_n,
            |g, m| ProductRank {
                product_id: g.key.0.clone(),
                name: g.key.1.clone(),
                avg_position: round1(m),
                distinct_queries: None,
                promo_count: Some(g.promo_count()),
            },
        );

        Some(QueryReport {
            query: query.to_string(),
            first_seen,
            last_seen,
            product_count: distinct(&rows, |o| o.product_id.as_str()),
            avg_position: round1(mean_position(&rows)),
            best_position,
            promo_percentage: percentage(promo_rows, rows.len()),
            daily,
            top_products,
        })
    }

    pub fn promo_effectiveness(&self) -> Option<PromoReport> {
        let (promoted, organic): (Vec<&Observation>, Vec<&Observation>) =
            self.snapshot.iter().partition(|o| o.promo_flag);
        if promoted.is_empty() {
            tracing::debug!("no promoted rows; promo report unavailable");
            return None;
        }

        let mut effects: Vec<(f64, PromoEffect)> = group_by(self.snapshot, product_key)
            .into_iter()
            .filter_map(|g| {
                let positions = |promoted: bool| {
                    g.rows
                        .iter()
                        .filter(move |o| o.promo_flag == promoted)
                        .map(|o| f64::from(o.position))
                };
                let with = mean(positions(true))?;
                let without = mean(positions(false))?;
                let difference = without - with;
                Some((
                    difference,
                    PromoEffect {
                        product_id: g.key.0,
                        name: g.key.1,
                        avg_position_without_promo: round1(without),
                        avg_position_with_promo: round1(with),
                        difference: round1(difference),
                    },
                ))
            })
            .collect();

        // Largest gain first; ties keep first-seen order.
        effects.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        let effects: Vec<PromoEffect> = effects.into_iter().map(|(_, e)| e).collect();

        let most_effective = effects.iter().take(self.top_n).cloned().collect();
        let least_effective = effects[effects.len().saturating_sub(self.top_n)..].to_vec();

        Some(PromoReport {
            promo_product_count: distinct(&promoted, |o| o.product_id.as_str()),
            avg_promo_position: round1(mean_position(&promoted)),
            avg_non_promo_position: mean(organic.iter().map(|o| f64::from(o.position))).map(round1),
            most_effective,
            least_effective,
        })
    }

    pub fn top_overall(&self) -> Option<TopOverallReport> {
        if self.snapshot.is_empty() {
            return None;
        }

        let top_products =
            top_groups_by_mean(self.snapshot, product_key, self.top_n, |g, m| ProductRank {
                product_id: g.key.0.clone(),
                name: g.key.1.clone(),
                avg_position: round1(m),
                distinct_queries: Some(g.distinct(|o| o.query.clone())),
                promo_count: None,
            });

        let top_queries = top_groups_by_mean(
            self.snapshot,
            |o| o.query.clone(),
            self.top_n,
            |g, m| QueryRank {
                query: g.key.clone(),
                avg_position: round1(m),
                product_count: g.distinct(|o| o.product_id.clone()),
            },
        );

        Some(TopOverallReport {
            top_products,
            top_queries,
        })
    }
}

fn product_key(o: &Observation) -> (ProductId, String) {
    (o.product_id.clone(), o.name.clone())
}

fn mean_position(rows: &[&Observation]) -> f64 {
    mean(rows.iter().map(|o| f64::from(o.position))).unwrap_or(0.0)
}

fn distinct<'r, F>(rows: &[&'r Observation], f: F) -> usize
where
    F: Fn(&'r Observation) -> &'r str,
{
    rows.iter().map(|&o| f(o)).collect::<HashSet<_>>().len()
}
