// Utility functions shared by handlers and configuration

use axum::http::{HeaderMap, HeaderValue, header};

/// Create headers for an archive download
pub fn bundle_download_headers(content_type: &'static str, filename: &str, size: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename={}", filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers
}

/// Parse duration string (e.g., "60s", "5m", "1h") into Duration
pub fn parse_duration(s: &str) -> anyhow::Result<tokio::time::Duration> {
    use anyhow::Context;
    use tokio::time::Duration;

    // Simple parser: "60s", "5m", "1h", or bare seconds
    let s = s.trim();
    let (number, unit) = if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 3600)
    } else {
        (s, 1)
    };

    let value: u64 = number.parse().context("Invalid duration format")?;
    let secs = value
        .checked_mul(unit)
        .with_context(|| format!("Duration too large: {}", s))?;
    Ok(Duration::from_secs(secs))
}
