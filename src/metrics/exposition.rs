//! Text exposition format
//!
//! Renders collected families into the pull format scraped by Prometheus.

use prometheus::{Encoder, TextEncoder};

use crate::error::StorageError;
use crate::storage::MetricFamily;

/// MIME type of the rendered document
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Render families into one exposition document.
pub fn render(families: &[MetricFamily]) -> Result<String, StorageError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
