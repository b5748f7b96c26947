//! Deterministic tool-name synthesis.
//!
//! Names are `[a-z0-9_]+` and at most [`MAX_TOOL_NAME_LEN`] characters. An explicit
//! `x-mcp-tool-name` override is the only way to get a name outside that alphabet.

use crate::types::Endpoint;

pub const MAX_TOOL_NAME_LEN: usize = 64;

const FALLBACK_NAME: &str = "unknown_tool";

/// Lower-case, replace anything outside `[a-z0-9_]` with `_`, collapse runs of `_`, trim them
/// from both ends. Never returns an empty string.
#[must_use]
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars().flat_map(char::to_lowercase) {
        let ch = if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            ch
        } else {
            '_'
        };
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Short forms for common path placeholders; unknown names are cut to 6 characters.
fn abbreviate_placeholder(name: &str) -> String {
    match name {
        "locationId" => "loc".to_string(),
        "latitude" => "lat".to_string(),
        "longitude" => "lon".to_string(),
        "geocode" => "geo".to_string(),
        other => truncate(other, 6).to_string(),
    }
}

/// Dictionary of common path segments; unknown segments are cut to 8 characters.
#[must_use]
pub fn abbreviate_segment(part: &str) -> String {
    let short = match part.to_ascii_lowercase().as_str() {
        "forecast" => "fcst",
        "observations" => "obs",
        "current" => "cur",
        "historical" => "hist",
        "location" => "loc",
        "geocode" => "geo",
        "notifications" => "notif",
        "intraday" => "intra",
        "hourly" => "hr",
        "daily" => "day",
        "lightning" => "light",
        "temperature" => "temp",
        "humidity" => "humid",
        "pressure" => "press",
        "precipitation" => "precip",
        "weather" => "wx",
        "almanac" => "alm",
        "astronomy" => "astro",
        "airquality" => "aq",
        "pollen" => "pol",
        "tides" => "tide",
        _ => return truncate(part, 8).to_string(),
    };
    short.to_string()
}

/// Char-boundary-safe prefix of at most `max` bytes.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Name synthesized from the path segments followed by the lower-cased method.
#[must_use]
pub fn compact_path_name(path: &str, method: &str) -> String {
    let mut parts = Vec::new();
    for part in path.trim_matches('/').split('/') {
        if let Some(param) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            parts.push(abbreviate_placeholder(param));
        } else {
            let short = abbreviate_segment(part);
            if !short.is_empty() {
                parts.push(short);
            }
        }
    }

    sanitize(&format!("{}_{}", parts.join("_"), method.to_ascii_lowercase()))
}

/// Shrink `name` to `max_len`: abbreviate each segment, then keep the leading segments plus
/// the final (method) segment, then hard-truncate.
#[must_use]
pub fn shorten(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }

    let parts: Vec<String> = name
        .split('_')
        .map(abbreviate_segment)
        .filter(|p| !p.is_empty())
        .collect();
    let joined = parts.join("_");
    if joined.len() <= max_len {
        return joined;
    }

    if let Some((last, first)) = parts.split_last()
        && parts.len() > 2
        && last.len() + 1 < max_len
    {
        let room = max_len - last.len() - 1;
        let head = first.join("_");
        let head = truncate(&head, room).trim_end_matches('_');
        if !head.is_empty() {
            return format!("{head}_{last}");
        }
    }

    truncate(&joined, max_len).trim_end_matches('_').to_string()
}

/// Inputs that decide the name beyond the endpoint itself.
#[derive(Debug, Clone, Default)]
pub struct NameContext<'a> {
    /// Document version; appended as `_v<version>`.
    pub version: &'a str,
    /// Set when sibling endpoints share this endpoint's logical path in other formats.
    pub format_suffix: Option<&'a str>,
    pub use_operation_id: bool,
}

/// Produce the tool name for `endpoint`.
#[must_use]
pub fn tool_name(endpoint: &Endpoint, ctx: &NameContext<'_>) -> String {
    if let Some(explicit) = endpoint.tool_name_override.as_deref().map(str::trim)
        && !explicit.is_empty()
    {
        if explicit.len() <= MAX_TOOL_NAME_LEN {
            return explicit.to_string();
        }
        tracing::warn!(
            tool_name = %explicit,
            length = explicit.len(),
            "x-mcp-tool-name exceeds 64 characters; generating a name instead"
        );
    }

    let base = match endpoint.operation_id.as_deref() {
        Some(id) if ctx.use_operation_id => sanitize(id),
        _ => compact_path_name(&endpoint.path, &endpoint.method),
    };

    let format_suffix = ctx
        .format_suffix
        .map(|f| format!("_{}", sanitize(f)))
        .unwrap_or_default();
    let version_suffix = if ctx.version.trim().is_empty() {
        String::new()
    } else {
        format!("_v{}", sanitize(ctx.version))
    };

    let available = MAX_TOOL_NAME_LEN.saturating_sub(format_suffix.len() + version_suffix.len());
    let base = shorten(&base, available.max(1));

    let full = format!("{base}{format_suffix}{version_suffix}");
    if full.len() <= MAX_TOOL_NAME_LEN {
        return full;
    }
    let cut = truncate(&full, MAX_TOOL_NAME_LEN).trim_end_matches('_');
    if cut.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cut.to_string()
    }
}
