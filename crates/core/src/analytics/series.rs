//! Tabular series for the chart renderer: labelled `(x, y)` points only.

use crate::analytics::pipeline::group_by;
use crate::analytics::round1;
use crate::domain::{HistoryPoint, ProductId, Snapshot};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: DateTime<FixedOffset>,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub points: Vec<ChartPoint>,
}

/// One series per query the product was seen under, points in time order.
pub fn position_series(snapshot: &Snapshot, product_id: &ProductId) -> Vec<ChartSeries> {
    let rows = snapshot.rows_for_product(product_id);
    group_by(rows, |o| o.query.clone())
        .into_iter()
        .map(|g| {
            let label = format!("{} (avg: {})", g.key, round1(g.mean_position()));
            let mut points: Vec<ChartPoint> = g
                .rows
                .iter()
                .map(|o| ChartPoint {
                    x: o.checked_at,
                    y: f64::from(o.position),
                })
                .collect();
            points.sort_by_key(|p| p.x);
            ChartSeries { label, points }
        })
        .collect()
}

pub fn history_series(product_id: &ProductId, history: &[HistoryPoint]) -> Option<ChartSeries> {
    if history.is_empty() {
        return None;
    }
    Some(ChartSeries {
        label: format!("{product_id} (checks: {})", history.len()),
        points: history
            .iter()
            .map(|p| ChartPoint {
                x: p.computed_at,
                y: p.avg_position,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::time::parse_checked_at;

    fn obs(id: u64, query: &str, position: u32, at: &str) -> Observation {
        Observation::new(id, "Item", "cat", query, position, parse_checked_at(at).unwrap())
    }

    #[test]
    fn one_series_per_query_sorted_by_time() {
        let s = Snapshot::new(vec![
            obs(1, "dress", 9, "2025-03-02 10:00:00"),
            obs(1, "skirt", 3, "2025-03-01 10:00:00"),
            obs(1, "dress", 4, "2025-03-01 10:00:00"),
            obs(2, "dress", 1, "2025-03-01 10:00:00"),
        ]);

        let series = position_series(&s, &ProductId::new("1"));
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].label, "dress (avg: 6.5)");
        let ys: Vec<_> = series[0].points.iter().map(|p| p.y).collect();
        assert_eq!(ys, vec![4.0, 9.0]);
        assert_eq!(series[1].label, "skirt (avg: 3)");

        assert!(position_series(&s, &ProductId::new("404")).is_empty());
    }

    #[test]
    fn history_series_follows_check_order() {
        let history = vec![
            HistoryPoint {
                check_index: 1,
                avg_position: 4.5,
                computed_at: parse_checked_at("2025-03-01 12:00:00").unwrap(),
            },
            HistoryPoint {
                check_index: 2,
                avg_position: 3.0,
                computed_at: parse_checked_at("2025-03-02 12:00:00").unwrap(),
            },
        ];
        let id = ProductId::new("42");
        let series = history_series(&id, &history).unwrap();
        assert_eq!(series.label, "42 (checks: 2)");
        assert_eq!(series.points[1].y, 3.0);
        assert!(history_series(&id, &[]).is_none());
    }
}
