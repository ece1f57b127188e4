//! Common types module for the accrual reconciliation system.
//!
//! This module defines the data model shared by the storage layer, the accrual
//! client and the reconciliation engine, so every crate agrees on how orders,
//! balances and accrual responses look.

/// Accrual service wire types.
pub mod accrual;
/// User balance types credited by processed orders.
pub mod balance;
/// Order types and the order status progression.
pub mod order;
/// Storage types for managing persistent data.
pub mod storage;
/// Utility functions for order numbers and log formatting.
pub mod utils;

// Re-export all types for convenient access
pub use accrual::*;
pub use balance::*;
pub use order::*;
pub use storage::*;
pub use utils::{is_valid_luhn, truncate_id};
