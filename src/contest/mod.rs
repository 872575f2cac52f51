//! Contest Module
//!
//! The contestant data model and the winner predicate.
//!
//! ## Responsibilities
//! - Parse and hold immutable contestant records
//! - Classify a contestant as winner / non-winner
//! - Filter a batch while keeping input order

mod contestant;
mod predicate;

pub use contestant::Contestant;
pub use predicate::{select_winners, HashDraw, WinnerPredicate};
