use url::Url;

use crate::error::FetchError;

/// Canonical form used as the article key: fragment and default port
/// dropped, trailing slash trimmed from non-root paths. Scheme and host are
/// lowercased by the parser.
pub fn normalize_url(raw: &str) -> Result<String, FetchError> {
    let mut parsed = parse_http_url(raw)?;

    parsed.set_fragment(None);

    if parsed.port() == Some(80) && parsed.scheme() == "http"
        || parsed.port() == Some(443) && parsed.scheme() == "https"
    {
        let _ = parsed.set_port(None);
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    Ok(parsed.to_string())
}

/// Parse an absolute http(s) URL with a host.
pub fn parse_http_url(raw: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", raw, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(format!(
            "{}: unsupported scheme {}",
            raw,
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(FetchError::InvalidUrl(format!("{}: missing host", raw)));
    }

    Ok(parsed)
}

pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw).ok()?.host_str().map(str::to_string)
}
