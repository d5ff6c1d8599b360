pub mod analytics;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod storage;
pub mod time;

pub use error::{AnalyticsError, Result};

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    pub const DEFAULT_DATA_FILE: &str = "positions_data.csv";
    pub const DEFAULT_AVG_POSITIONS_FILE: &str = "avg_positions.csv";
    pub const DEFAULT_TOP_N: usize = 5;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub data_file: PathBuf,
        pub avg_positions_file: PathBuf,
        pub top_n: usize,
        pub sentry_dsn: Option<String>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                data_file: PathBuf::from(DEFAULT_DATA_FILE),
                avg_positions_file: PathBuf::from(DEFAULT_AVG_POSITIONS_FILE),
                top_n: DEFAULT_TOP_N,
                sentry_dsn: None,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let mut out = Self::default();

            if let Some(p) = non_empty_var("DATA_FILE") {
                out.data_file = PathBuf::from(p);
            }
            if let Some(p) = non_empty_var("AVG_POSITIONS_FILE") {
                out.avg_positions_file = PathBuf::from(p);
            }
            if let Some(s) = non_empty_var("REPORT_TOP_N") {
                out.top_n = s
                    .parse::<usize>()
                    .with_context(|| format!("REPORT_TOP_N must be a positive integer (got {s})"))?;
                anyhow::ensure!(out.top_n >= 1, "REPORT_TOP_N must be >= 1");
            }
            out.sentry_dsn = non_empty_var("SENTRY_DSN");

            Ok(out)
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
