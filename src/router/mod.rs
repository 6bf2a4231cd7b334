//! Route matching
//!
//! Decides whether a live request falls under a configured allow-list entry.

mod matcher;
mod rule;

pub use matcher::{match_rules, matches};
pub use rule::{ParsedUri, RouteRule};
