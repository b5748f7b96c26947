//! Classification-tag filtering.
//!
//! Within one tag family a filter matches when any requested value appears in the item's list;
//! across families every non-empty filter must match.

use crate::config::TwcFilters;
use crate::types::{ClassificationTags, DocumentInfo, GeneratedTool};
use serde::{Deserialize, Serialize};

fn any_match(wanted: &[String], have: &[String]) -> bool {
    wanted.is_empty() || wanted.iter().any(|w| have.contains(w))
}

/// Keep documents carrying at least one of `package_ids`. Documents without package ids are
/// dropped once a filter is given.
#[must_use]
pub fn filter_by_package_ids(documents: Vec<DocumentInfo>, package_ids: &[String]) -> Vec<DocumentInfo> {
    if package_ids.is_empty() {
        return documents;
    }
    documents
        .into_iter()
        .filter(|doc| any_match(package_ids, &doc.tags.package_ids))
        .collect()
}

#[must_use]
pub fn filter_by_twc(documents: Vec<DocumentInfo>, filters: &TwcFilters) -> Vec<DocumentInfo> {
    if filters.is_empty() {
        return documents;
    }
    documents
        .into_iter()
        .filter(|doc| twc_matches(filters, &doc.tags))
        .collect()
}

fn twc_matches(filters: &TwcFilters, tags: &ClassificationTags) -> bool {
    any_match(&filters.portfolios, &tags.portfolios)
        && any_match(&filters.domains, &tags.domains)
        && any_match(&filters.usage_classifications, &tags.usage_classifications)
        && any_match(&filters.geographies, &tags.geographies)
}

/// Request-time catalog filter.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolFilter {
    pub package_ids: Vec<String>,
    #[serde(flatten)]
    pub twc: TwcFilters,
    /// Free-text terms matched against document title, tool description and endpoint tags.
    pub custom: Vec<String>,
}

impl ToolFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.package_ids.is_empty() && self.twc.is_empty() && self.custom.is_empty()
    }

    #[must_use]
    pub fn matches(&self, tool: &GeneratedTool) -> bool {
        let tags = &tool.document.tags;
        any_match(&self.package_ids, &tags.package_ids)
            && twc_matches(&self.twc, tags)
            && (self.custom.is_empty() || self.custom.iter().any(|term| custom_matches(tool, term)))
    }
}

fn custom_matches(tool: &GeneratedTool, term: &str) -> bool {
    let term = term.to_lowercase();
    tool.document.title.to_lowercase().contains(&term)
        || tool.description.to_lowercase().contains(&term)
        || tool
            .endpoint
            .tags
            .iter()
            .any(|t| t.to_lowercase().contains(&term))
}

/// Split a comma-separated query value, dropping blanks.
#[must_use]
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
