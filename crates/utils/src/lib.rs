pub mod isin;
pub mod numeric;

// Re-export commonly used items
pub use crate::isin::{extract_isin, looks_like_isin, strip_isin};
pub use crate::numeric::parse_eu_decimal;
