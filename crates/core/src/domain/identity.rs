use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Canonical product identifier.
///
/// Digit strings (optionally padded with whitespace, leading zeros or a
/// float-style `.0` tail) and integers collapse to the same decimal key.
/// Anything else is kept as its trimmed text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(raw: &str) -> Self {
        Self(canonicalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Sort key with numeric ids in integer order ("9" before "10"), ahead of
    /// any non-numeric id.
    pub fn numeric_order(&self) -> (bool, usize, &str) {
        let numeric = !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit());
        (!numeric, if numeric { self.0.len() } else { 0 }, &self.0)
    }
}

pub fn canonicalize(raw: &str) -> String {
    let trimmed = raw.trim();
    match integral_digits(trimmed) {
        Some(digits) => {
            let stripped = digits.trim_start_matches('0');
            if stripped.is_empty() {
                "0".to_string()
            } else {
                stripped.to_string()
            }
        }
        None => trimmed.to_string(),
    }
}

// "123", "123.0", "123.000" -> "123"; anything else -> None.
fn integral_digits(s: &str) -> Option<&str> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match frac_part {
        None => Some(int_part),
        Some(f) if !f.is_empty() && f.bytes().all(|b| b == b'0') => Some(int_part),
        Some(_) => None,
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ProductId {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<u64> for ProductId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for ProductId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u32> for ProductId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for ProductId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ProductIdVisitor;

        impl Visitor<'_> for ProductIdVisitor {
            type Value = ProductId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a product id as string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ProductId, E> {
                Ok(ProductId::new(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ProductId, E> {
                Ok(ProductId::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ProductId, E> {
                Ok(ProductId::from(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<ProductId, E> {
                Ok(ProductId::new(&v.to_string()))
            }
        }

        deserializer.deserialize_any(ProductIdVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_representations_share_one_key() {
        for n in [0u64, 7, 123456789, 987654321012] {
            let padded = ProductId::new(&format!("  {n} "));
            let text = ProductId::new(&n.to_string());
            let int = ProductId::from(n);
            let float_tail = ProductId::new(&format!("{n}.0"));
            assert_eq!(padded, int);
            assert_eq!(text, int);
            assert_eq!(float_tail, int);
        }
    }

    #[test]
    fn leading_zeros_collapse_like_integer_parse() {
        assert_eq!(ProductId::new("00042").as_str(), "42");
        assert_eq!(ProductId::new("000").as_str(), "0");
    }

    #[test]
    fn non_numeric_ids_compare_as_trimmed_text() {
        assert_eq!(ProductId::new(" SKU-1 ").as_str(), "SKU-1");
        assert_ne!(ProductId::new("SKU-1"), ProductId::new("sku-1"));
        assert_eq!(ProductId::new("12.5").as_str(), "12.5");
        assert_eq!(ProductId::new("-5"), ProductId::from(-5i64));
        assert_eq!(ProductId::new("   ").as_str(), "");
    }

    #[test]
    fn numeric_order_follows_integer_value() {
        let mut ids = vec![
            ProductId::new("10"),
            ProductId::new("SKU-1"),
            ProductId::new("9"),
            ProductId::new("100"),
        ];
        ids.sort_by(|a, b| a.numeric_order().cmp(&b.numeric_order()));
        let ordered: Vec<_> = ids.iter().map(ProductId::as_str).collect();
        assert_eq!(ordered, vec!["9", "10", "100", "SKU-1"]);
    }

    #[test]
    fn deserializes_from_string_or_number() {
        let from_num: ProductId = serde_json::from_str("12345").unwrap();
        let from_text: ProductId = serde_json::from_str("\" 12345\"").unwrap();
        assert_eq!(from_num, from_text);
        assert_eq!(serde_json::to_string(&from_num).unwrap(), "\"12345\"");
    }
}
