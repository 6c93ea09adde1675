pub mod fundamentals;
pub mod peer;

/// Placeholder shown wherever a value could not be determined.
pub const NOT_AVAILABLE: &str = "N/A";

pub fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or(NOT_AVAILABLE)
}
