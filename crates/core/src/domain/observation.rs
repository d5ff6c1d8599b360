use crate::domain::identity::ProductId;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One measured rank of one product for one search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub brand: String,
    pub supplier: String,
    pub query: String,
    /// 1-based rank, global across result pages.
    pub position: u32,
    pub organic_position: Option<u32>,
    pub promo_position: Option<u32>,
    pub promo_flag: bool,
    pub cpm: f64,
    pub placement_type: String,
    pub checked_at: DateTime<FixedOffset>,
    pub city: String,
}

impl Observation {
    /// Builds an observation with the optional attributes left blank.
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        category: impl Into<String>,
        query: impl Into<String>,
        position: u32,
        checked_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            category: category.into(),
            brand: String::new(),
            supplier: String::new(),
            query: query.into(),
            position,
            organic_position: None,
            promo_position: None,
            promo_flag: false,
            cpm: 0.0,
            placement_type: "-".to_string(),
            checked_at,
            city: String::new(),
        }
    }

    /// Sets the promoted placement; the promo flag follows its presence.
    pub fn with_promo_position(mut self, promo_position: Option<u32>) -> Self {
        self.promo_position = promo_position;
        self.promo_flag = promo_position.is_some();
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }
}

/// Mean position of one product over one ingested snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageEntry {
    pub product_id: ProductId,
    pub avg_position: f64,
    pub computed_at: DateTime<FixedOffset>,
}

/// Charting tuple for the average-position history of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// 1-based, assigned in `computed_at` order.
    pub check_index: usize,
    pub avg_position: f64,
    pub computed_at: DateTime<FixedOffset>,
}
