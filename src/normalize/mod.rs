//! Value normalizers (C2): small, dependency-free functions that turn a raw
//! cell string into a canonical form plus a confidence score. Each module
//! covers one value family and is usable independently of the detector
//! agents that call it.

pub mod date;
pub mod fuzzy;
pub mod phone;
pub mod units;

pub use date::parse_date;
pub use fuzzy::{category_similarity, fuzzy_match_category, EntityMatcher};
pub use phone::{detect_phone_country, normalize_phone};
pub use units::{convert_units, parse_units};
