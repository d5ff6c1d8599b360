pub mod compare;
pub mod digest;
pub(crate) mod pipeline;
pub mod reports;
pub mod series;

pub use compare::{
    compare_snapshots, Comparison, ComparisonRecord, ComparisonSummary, Direction, Verdict,
};
pub use digest::{check_digest, CheckDigest, DigestEntry};
pub use reports::{
    AnalyticsEngine, CategoryReport, PromoReport, QueryReport, TopOverallReport,
};
pub use series::{history_series, position_series, ChartSeries};

/// Rounds to one decimal place, ties to even.
///
/// Every mean and percentage leaving this crate goes through here.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    (count > 0).then(|| sum / count as f64)
}

/// `100 * part / whole`, rounded; 0 for an empty whole.
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(part as f64 * 100.0 / whole as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_positions_round_to_one_decimal() {
        assert_eq!(mean([1.0, 2.0]).map(round1), Some(1.5));
        assert_eq!(mean([1.0, 2.0, 2.0]).map(round1), Some(1.7));
        assert_eq!(mean([1.0, 4.0]).map(round1), Some(2.5));
        assert_eq!(mean(Vec::<f64>::new()), None);
    }

    #[test]
    fn exact_half_steps_round_to_even() {
        // 1.25 and 1.75 are exact in binary, so these hit the tie rule.
        assert_eq!(mean([1.0, 1.0, 1.0, 2.0]).map(round1), Some(1.2));
        assert_eq!(round1(1.75), 1.8);
        assert_eq!(round1(0.25), 0.2);
        assert_eq!(percentage(1, 16), 6.2);
        assert_eq!(percentage(3, 16), 18.8);
    }

    #[test]
    fn percentage_of_nothing_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.3);
    }
}
