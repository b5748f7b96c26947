//! Discovery of description documents on disk and over HTTP.
//!
//! A scan never fails as a whole: every bad path, unreadable file or unreachable URL becomes a
//! [`OpenApiToolsError::Discovery`] entry in [`ScanResult::errors`] and the scan moves on.
//!
//! Remote documents whose top-level value is an array are treated as URL lists. Their entries
//! are fetched concurrently (one task per URL, all joined before returning), recursing up to
//! [`ScanOptions::max_url_list_depth`] levels.

use crate::config::ScanOptions;
use crate::error::{OpenApiToolsError, Result};
use crate::parser::{DocumentFormat, decode, detect_format};
use crate::types::{ClassificationTags, DocumentInfo};
use futures::future::{BoxFuture, FutureExt as _, join_all};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use swagger_docs_http_tools::safety::{parse_http_url, redact_url};
use walkdir::WalkDir;

const DOCUMENT_ACCEPT: &str = "application/json, application/yaml, text/yaml, */*";
const DEFAULT_VERSION: &str = "1";
const REMOTE_FALLBACK_TITLE: &str = "Remote Swagger Document";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Candidate files and fetched URLs examined.
    pub total_files: usize,
    pub valid_documents: usize,
    pub errors: usize,
    #[serde(rename = "scanTimeMs", serialize_with = "serialize_millis")]
    pub scan_time: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub documents: Vec<DocumentInfo>,
    /// Only `Discovery` errors.
    pub errors: Vec<OpenApiToolsError>,
    pub stats: ScanStats,
}

impl ScanResult {
    fn merge(&mut self, other: ScanResult) {
        self.documents.extend(other.documents);
        self.errors.extend(other.errors);
        self.stats.total_files += other.stats.total_files;
    }

    fn error(&mut self, source: impl Into<String>, message: impl ToString) {
        self.errors
            .push(OpenApiToolsError::discovery(source, message));
    }
}

#[derive(Debug, Clone)]
pub struct DocumentScanner {
    options: ScanOptions,
    client: reqwest::Client,
}

impl DocumentScanner {
    /// # Errors
    ///
    /// Returns a `Config` error if the HTTP client cannot be built.
    pub fn new(options: ScanOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.fetch_timeout())
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|e| OpenApiToolsError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { options, client })
    }

    #[must_use]
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan local paths (sequentially) and URLs (concurrently), then de-duplicate by location.
    pub async fn scan(&self, paths: &[String], urls: &[String]) -> ScanResult {
        let started = Instant::now();
        tracing::info!(paths = ?paths, urls = ?urls, "starting document scan");

        let mut result = ScanResult::default();
        for path in paths {
            result.merge(self.scan_path(path).await);
        }

        let remote = join_all(urls.iter().map(|url| self.scan_url(url.clone(), 0))).await;
        for part in remote {
            result.merge(part);
        }

        let mut seen = HashSet::new();
        result.documents.retain(|doc| seen.insert(doc.location.clone()));

        result.stats.valid_documents = result.documents.len();
        result.stats.errors = result.errors.len();
        result.stats.scan_time = started.elapsed();

        tracing::info!(
            total_files = result.stats.total_files,
            valid_documents = result.stats.valid_documents,
            errors = result.stats.errors,
            scan_time_ms = u64::try_from(result.stats.scan_time.as_millis()).unwrap_or(u64::MAX),
            "document scan complete"
        );
        result
    }

    /// Scan one file or directory.
    pub async fn scan_path(&self, path: &str) -> ScanResult {
        let options = self.options.clone();
        let owned = path.to_string();
        match tokio::task::spawn_blocking(move || scan_local(&options, &owned)).await {
            Ok(result) => result,
            Err(err) => {
                let mut result = ScanResult::default();
                result.error(path, format!("scan task failed: {err}"));
                result
            }
        }
    }

    /// Fetch one URL; expand URL lists concurrently.
    pub fn scan_url(&self, url: String, depth: usize) -> BoxFuture<'_, ScanResult> {
        async move {
            let mut result = ScanResult {
                stats: ScanStats {
                    total_files: 1,
                    ..ScanStats::default()
                },
                ..ScanResult::default()
            };

            let (bytes, root) = match self.fetch(&url).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    tracing::warn!(url = %display_url(&url), error = %err, "failed to scan URL");
                    result.errors.push(err);
                    return result;
                }
            };

            match root {
                Value::Array(items) => {
                    if depth >= self.options.max_url_list_depth {
                        result.error(
                            url.as_str(),
                            format!(
                                "URL list nesting exceeds {} levels",
                                self.options.max_url_list_depth
                            ),
                        );
                        return result;
                    }
                    self.expand_url_list(&url, items, depth, &mut result).await;
                }
                root @ Value::Object(_) => {
                    let parsed = parse_http_url(&url).ok();
                    let url_path = parsed.as_ref().map_or("", url::Url::path);
                    let version = version_from_segments(url_path.split('/'))
                        .unwrap_or_else(|| version_from_document(&root));
                    let title = title_from_url(&url);
                    tracing::debug!(url = %display_url(&url), version = %version, title = %title, "scanned remote document");
                    result.documents.push(DocumentInfo {
                        tags: ClassificationTags::from_document(&root),
                        location: url,
                        version,
                        title,
                        is_remote: true,
                        content: Some(Arc::from(bytes)),
                    });
                }
                _ => result.error(url.as_str(), "document is not a JSON/YAML object or URL list"),
            }
            result
        }
        .boxed()
    }

    async fn expand_url_list(
        &self,
        source: &str,
        items: Vec<Value>,
        depth: usize,
        result: &mut ScanResult,
    ) {
        let mut urls = Vec::new();
        for item in items {
            match item {
                Value::String(u) => match parse_http_url(&u) {
                    Ok(_) => urls.push(u),
                    Err(err) => result.error(u.as_str(), err),
                },
                other => result.error(
                    source,
                    format!("invalid URL list entry: expected string, got {}", json_kind(&other)),
                ),
            }
        }

        tracing::info!(
            source = %display_url(source),
            entries = urls.len(),
            "expanding URL list"
        );

        let children = join_all(urls.into_iter().map(|u| self.scan_url(u, depth + 1))).await;
        for child in children {
            result.documents.extend(child.documents);
            result.errors.extend(child.errors);
            result.stats.total_files += child.stats.total_files;
        }
    }

    async fn fetch(&self, raw: &str) -> Result<(Vec<u8>, Value)> {
        let url = parse_http_url(raw).map_err(|e| OpenApiToolsError::discovery(raw, e))?;

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, DOCUMENT_ACCEPT)
            .send()
            .await
            .map_err(|e| {
                OpenApiToolsError::discovery(
                    raw,
                    format!(
                        "failed to fetch (timeout: {}s): {}",
                        self.options.fetch_timeout_secs,
                        swagger_docs_http_tools::safety::sanitize_reqwest_error(&e)
                    ),
                )
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !status.is_success() {
            return Err(OpenApiToolsError::discovery(
                raw,
                format!("HTTP {status} (content-type: {content_type})"),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| OpenApiToolsError::discovery(raw, format!("failed to read body: {e}")))?
            .to_vec();

        let format = if content_type.contains("yaml") || content_type.contains("yml") {
            DocumentFormat::Yaml
        } else {
            detect_format(raw, &bytes)
        };
        let root = decode(&bytes, format, raw).map_err(|e| {
            OpenApiToolsError::discovery(raw, format!("{e} (content size: {} bytes)", bytes.len()))
        })?;
        Ok((bytes, root))
    }
}

fn display_url(raw: &str) -> String {
    parse_http_url(raw).map_or_else(|_| raw.to_string(), |u| redact_url(&u))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn scan_local(options: &ScanOptions, raw: &str) -> ScanResult {
    let mut result = ScanResult::default();
    let path = Path::new(raw);

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(err) => {
            tracing::warn!(path = %raw, error = %err, "failed to scan path");
            result.error(raw, err);
            return result;
        }
    };

    if metadata.is_file() {
        result.stats.total_files = 1;
        let ext = extension(path);
        if !options.accepts_extension(&ext) {
            result.error(raw, format!("unsupported file extension: .{ext}"));
            return result;
        }
        match scan_file(path) {
            Ok(doc) => result.documents.push(doc),
            Err(err) => result.errors.push(err),
        }
        return result;
    }

    let walk_depth = if options.include_subdirectories {
        options.max_depth.saturating_add(1)
    } else {
        1
    };

    for entry in WalkDir::new(path)
        .max_depth(walk_depth)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let at = err
                    .path()
                    .map_or_else(|| raw.to_string(), |p| p.display().to_string());
                result.error(at, err);
                continue;
            }
        };
        if !entry.file_type().is_file() || !options.accepts_extension(&extension(entry.path())) {
            continue;
        }

        result.stats.total_files += 1;
        match scan_file(entry.path()) {
            Ok(doc) => result.documents.push(doc),
            Err(err) => result.errors.push(err),
        }
    }
    result
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Metadata pre-pass over one local file: tags and version only, no endpoint extraction.
fn scan_file(path: &Path) -> Result<DocumentInfo> {
    let location = path.display().to_string();
    let bytes = std::fs::read(path)
        .map_err(|e| OpenApiToolsError::discovery(location.as_str(), format!("failed to read file: {e}")))?;
    let root = decode(&bytes, detect_format(&location, &bytes), &location).map_err(|e| {
        OpenApiToolsError::discovery(
            location.as_str(),
            format!("{e} (size: {} bytes)", bytes.len()),
        )
    })?;
    if !root.is_object() {
        return Err(OpenApiToolsError::discovery(
            location,
            "document is not a JSON/YAML object",
        ));
    }

    let version = version_from_path(path).unwrap_or_else(|| version_from_document(&root));
    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string();

    Ok(DocumentInfo {
        tags: ClassificationTags::from_document(&root),
        location,
        version,
        title,
        is_remote: false,
        content: None,
    })
}

fn version_from_path(path: &Path) -> Option<String> {
    let segments = path
        .components()
        .filter_map(|c| c.as_os_str().to_str().map(str::to_string))
        .collect::<Vec<_>>();
    version_from_segments(segments.iter().map(String::as_str))
}

/// A whole segment `vN`, else a `vN` fragment in the last segment.
fn version_from_segments<'a>(segments: impl Iterator<Item = &'a str>) -> Option<String> {
    let segments: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();

    for segment in &segments {
        if let Some(digits) = segment.strip_prefix('v')
            && !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Some(digits.to_string());
        }
    }

    let filename = segments.last()?;
    filename
        .match_indices('v')
        .map(|(i, _)| leading_digits(&filename[i + 1..]))
        .find(|d| !d.is_empty())
        .map(str::to_string)
}

fn leading_digits(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    &s[..end]
}

/// Major number of `info.version` (optionally `v`-prefixed), else of `openapi`/`swagger`.
fn version_from_document(root: &Value) -> String {
    let declared = root
        .pointer("/info/version")
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .map(|v| leading_digits(v.trim().trim_start_matches(['v', 'V'])).to_string())
        .filter(|d| !d.is_empty());
    if let Some(version) = declared {
        return version;
    }

    ["openapi", "swagger"]
        .iter()
        .filter_map(|k| root.get(*k).and_then(Value::as_str))
        .map(|v| leading_digits(v).to_string())
        .find(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string())
}

/// `https://host/specs/daily-forecast_api.json` → `Daily Forecast Api`.
fn title_from_url(raw: &str) -> String {
    let Ok(url) = parse_http_url(raw) else {
        return REMOTE_FALLBACK_TITLE.to_string();
    };

    let last = url
        .path()
        .trim_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| url.host_str().unwrap_or_default().to_string());

    let stem = [".json", ".yaml", ".yml"]
        .iter()
        .find_map(|ext| last.strip_suffix(ext))
        .unwrap_or(&last);

    let title = stem
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        REMOTE_FALLBACK_TITLE.to_string()
    } else {
        title
    }
}
