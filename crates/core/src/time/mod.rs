pub mod msk;

pub use msk::{format_checked_at, msk_now, msk_offset, parse_checked_at};
