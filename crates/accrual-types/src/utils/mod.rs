//! Utility functions for order numbers and log formatting.

pub mod formatting;
pub mod luhn;

pub use formatting::truncate_id;
pub use luhn::is_valid_luhn;
