//! URL checks and redaction for outbound HTTP.
//!
//! Both the document scanner and the tool client go through [`parse_http_url`], so only
//! `http(s)` sources are ever fetched.

use crate::runtime::HttpToolsError;
use url::Url;

/// Parse `raw` and require an `http`/`https` scheme with a host.
///
/// # Errors
///
/// Returns a validation error for unparsable URLs, other schemes, or a missing host.
pub fn parse_http_url(raw: &str) -> Result<Url, HttpToolsError> {
    let url = Url::parse(raw)
        .map_err(|e| HttpToolsError::Validation(format!("invalid URL '{raw}': {e}")))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(HttpToolsError::Validation(format!(
            "unsupported URL scheme '{scheme}' (only http and https are allowed)"
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(HttpToolsError::Validation(format!(
            "URL '{raw}' has no host"
        )));
    }

    Ok(url)
}

/// Drop credentials, query and fragment (API keys may travel in the query).
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}
