//! Name-keyed stores for generated tools, prompts and resources.
//!
//! Each registry serializes mutation behind its own `RwLock`. A name that is already taken is
//! rejected with [`OpenApiToolsError::Conflict`]; the existing entry is left untouched.

use crate::error::{OpenApiToolsError, Result};
use crate::generator::{ToolStatistics, statistics};
use crate::prompts::{GeneratedPrompt, PromptCategory};
use crate::resources::{GeneratedResource, ResourceCategory};
use crate::types::GeneratedTool;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

fn conflict(name: &str, new_source: String, existing_source: String) -> OpenApiToolsError {
    OpenApiToolsError::Conflict {
        name: name.to_string(),
        new_source,
        existing_source,
    }
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<GeneratedTool>>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// `Conflict` naming both sources when `tool.name` is already registered.
    pub fn register(&self, tool: GeneratedTool) -> Result<Arc<GeneratedTool>> {
        let mut tools = self.tools.write();
        if let Some(existing) = tools.get(&tool.name) {
            return Err(conflict(&tool.name, tool.source_label(), existing.source_label()));
        }
        let tool = Arc::new(tool);
        tools.insert(tool.name.clone(), Arc::clone(&tool));
        Ok(tool)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<GeneratedTool>> {
        self.tools.read().get(name).cloned()
    }

    /// Sorted by name.
    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<GeneratedTool>> {
        self.tools.read().values().cloned().collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.tools.read().len()
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools.write().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.tools.write().clear();
    }

    #[must_use]
    pub fn by_version(&self, version: &str) -> Vec<Arc<GeneratedTool>> {
        self.tools
            .read()
            .values()
            .filter(|t| t.document.version == version)
            .cloned()
            .collect()
    }

    /// Tools whose document carries any of `package_ids`; everything when the list is empty.
    #[must_use]
    pub fn by_package_ids(&self, package_ids: &[String]) -> Vec<Arc<GeneratedTool>> {
        self.tools
            .read()
            .values()
            .filter(|t| {
                package_ids.is_empty()
                    || package_ids
                        .iter()
                        .any(|id| t.document.tags.package_ids.contains(id))
            })
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn statistics(&self) -> ToolStatistics {
        let tools = self.tools.read();
        statistics(tools.values().map(Arc::as_ref))
    }
}

#[derive(Debug, Default)]
pub struct PromptRegistry {
    prompts: RwLock<BTreeMap<String, Arc<GeneratedPrompt>>>,
}

impl PromptRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// `Conflict` when a prompt with the same name exists.
    pub fn register(&self, prompt: GeneratedPrompt) -> Result<()> {
        let mut prompts = self.prompts.write();
        if let Some(existing) = prompts.get(&prompt.name) {
            return Err(conflict(
                &prompt.name,
                prompt.source.location.clone(),
                existing.source.location.clone(),
            ));
        }
        prompts.insert(prompt.name.clone(), Arc::new(prompt));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<GeneratedPrompt>> {
        self.prompts.read().get(name).cloned()
    }

    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<GeneratedPrompt>> {
        self.prompts.read().values().cloned().collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.prompts.read().len()
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.prompts.read().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.prompts.write().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.prompts.write().clear();
    }

    #[must_use]
    pub fn by_category(&self, category: PromptCategory) -> Vec<Arc<GeneratedPrompt>> {
        self.prompts
            .read()
            .values()
            .filter(|p| p.category == category)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct ResourceIndex {
    by_name: BTreeMap<String, Arc<GeneratedResource>>,
    by_uri: BTreeMap<String, Arc<GeneratedResource>>,
}

/// Resources are reachable by name and by URI; both must be unused to register.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    inner: RwLock<ResourceIndex>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// `Conflict` when either the name or the URI is taken.
    pub fn register(&self, resource: GeneratedResource) -> Result<()> {
        let mut index = self.inner.write();
        let existing = index
            .by_name
            .get(&resource.name)
            .or_else(|| index.by_uri.get(&resource.uri));
        if let Some(existing) = existing {
            return Err(conflict(&resource.name, resource.uri.clone(), existing.uri.clone()));
        }
        let resource = Arc::new(resource);
        index.by_name.insert(resource.name.clone(), Arc::clone(&resource));
        index.by_uri.insert(resource.uri.clone(), resource);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<GeneratedResource>> {
        self.inner.read().by_name.get(name).cloned()
    }

    #[must_use]
    pub fn get_by_uri(&self, uri: &str) -> Option<Arc<GeneratedResource>> {
        self.inner.read().by_uri.get(uri).cloned()
    }

    /// Sorted by URI.
    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<GeneratedResource>> {
        self.inner.read().by_uri.values().cloned().collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().by_uri.len()
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.inner.read().by_name.contains_key(name)
    }

    #[must_use]
    pub fn has_uri(&self, uri: &str) -> bool {
        self.inner.read().by_uri.contains_key(uri)
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut index = self.inner.write();
        match index.by_name.remove(name) {
            Some(resource) => {
                index.by_uri.remove(&resource.uri);
                true
            }
            None => false,
        }
    }

    pub fn remove_by_uri(&self, uri: &str) -> bool {
        let mut index = self.inner.write();
        match index.by_uri.remove(uri) {
            Some(resource) => {
                index.by_name.remove(&resource.name);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut index = self.inner.write();
        index.by_name.clear();
        index.by_uri.clear();
    }

    #[must_use]
    pub fn by_category(&self, category: ResourceCategory) -> Vec<Arc<GeneratedResource>> {
        self.filtered(|r| r.category == category)
    }

    #[must_use]
    pub fn by_mime_type(&self, mime_type: &str) -> Vec<Arc<GeneratedResource>> {
        self.filtered(|r| r.mime_type == mime_type)
    }

    fn filtered(&self, keep: impl Fn(&GeneratedResource) -> bool) -> Vec<Arc<GeneratedResource>> {
        self.inner
            .read()
            .by_uri
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassificationTags, DocumentInfo, Endpoint};
    use serde_json::{Map, json};

    fn document(title: &str, version: &str, package_ids: &[&str]) -> Arc<DocumentInfo> {
        Arc::new(DocumentInfo {
            location: format!("/specs/{title}.json"),
            version: version.to_string(),
            title: title.to_string(),
            is_remote: false,
            tags: ClassificationTags {
                package_ids: package_ids.iter().map(|s| (*s).to_string()).collect(),
                ..ClassificationTags::default()
            },
            content: None,
        })
    }

    fn tool(name: &str, method: &str, path: &str, document: &Arc<DocumentInfo>) -> GeneratedTool {
        GeneratedTool {
            name: name.to_string(),
            description: String::new(),
            input_schema: json!({"type": "object", "properties": {}, "required": []}),
            endpoint: Arc::new(Endpoint {
                path: path.to_string(),
                method: method.to_string(),
                operation_id: None,
                summary: None,
                description: None,
                deprecated: false,
                tags: Vec::new(),
                parameters: Vec::new(),
                request_body: None,
                responses: Map::new(),
                security: Vec::new(),
                tool_name_override: None,
            }),
            document: Arc::clone(document),
            base_url: None,
        }
    }

    fn resource(name: &str, uri: &str, category: ResourceCategory, mime: &str) -> GeneratedResource {
        GeneratedResource {
            uri: uri.to_string(),
            name: name.to_string(),
            description: String::new(),
            mime_type: mime.to_string(),
            category,
            tags: Vec::new(),
            metadata: json!({}),
            content: String::new(),
            source: document("weather", "1", &[]),
        }
    }

    #[test]
    fn duplicate_tool_is_rejected_and_existing_kept() {
        let registry = ToolRegistry::new();
        let alpha = document("alpha", "1", &[]);
        let beta = document("beta", "2", &[]);

        registry.register(tool("get_x", "GET", "/x", &alpha)).expect("first");
        let err = registry
            .register(tool("get_x", "POST", "/y", &beta))
            .expect_err("duplicate");

        let message = err.to_string();
        assert!(message.contains("POST /y from beta"), "{message}");
        assert!(message.contains("GET /x from alpha"), "{message}");
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get("get_x").map(|t| t.endpoint.method.clone()).as_deref(), Some("GET"));
    }

    #[test]
    fn tool_queries_and_removal() {
        let registry = ToolRegistry::new();
        let alpha = document("alpha", "1", &["pkg-a"]);
        let beta = document("beta", "2", &["pkg-b"]);
        for (name, doc) in [("zeta", &alpha), ("alpha_get", &beta), ("mid", &alpha)] {
            registry.register(tool(name, "GET", "/p", doc)).expect("register");
        }

        assert_eq!(registry.names(), vec!["alpha_get", "mid", "zeta"]);
        assert_eq!(registry.by_version("1").len(), 2);
        assert_eq!(registry.by_package_ids(&["pkg-b".to_string()]).len(), 1);
        assert_eq!(registry.by_package_ids(&[]).len(), 3);

        let stats = registry.statistics();
        assert_eq!(stats.total_tools, 3);
        assert_eq!(stats.tools_by_version.get("1"), Some(&2));

        assert!(registry.unregister("mid"));
        assert!(!registry.unregister("mid"));
        assert!(!registry.has("mid"));
        registry.clear();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn concurrent_registration_has_one_winner() {
        let registry = Arc::new(ToolRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let doc = document(&format!("doc{i}"), "1", &[]);
                    registry.register(tool("shared", "GET", "/s", &doc)).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn resources_are_indexed_by_name_and_uri() {
        let registry = ResourceRegistry::new();
        registry
            .register(resource("Doc", "swagger://w/swagger.json", ResourceCategory::Documentation, "application/json"))
            .expect("doc");
        registry
            .register(resource("Overview", "swagger://w/overview.md", ResourceCategory::Documentation, "text/markdown"))
            .expect("overview");

        assert!(
            registry
                .register(resource("Doc", "swagger://w/other.json", ResourceCategory::Schema, "application/json"))
                .is_err()
        );
        assert!(
            registry
                .register(resource("Other", "swagger://w/overview.md", ResourceCategory::Schema, "text/markdown"))
                .is_err()
        );

        assert_eq!(registry.get_by_uri("swagger://w/overview.md").map(|r| r.name.clone()).as_deref(), Some("Overview"));
        assert_eq!(registry.by_mime_type("text/markdown").len(), 1);
        assert_eq!(registry.by_category(ResourceCategory::Documentation).len(), 2);
        assert!(registry.by_category(ResourceCategory::Schema).is_empty());

        assert!(registry.remove_by_uri("swagger://w/overview.md"));
        assert!(!registry.has("Overview"));
        assert!(registry.remove("Doc"));
        assert!(!registry.has_uri("swagger://w/swagger.json"));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn prompts_reject_duplicates_and_filter_by_category() {
        let registry = PromptRegistry::new();
        let prompt = |name: &str, category: PromptCategory| GeneratedPrompt {
            name: name.to_string(),
            description: String::new(),
            arguments: Vec::new(),
            category,
            template: String::new(),
            examples: Vec::new(),
            tags: Vec::new(),
            source: document("weather", "1", &[]),
        };

        registry.register(prompt("get-forecast-overview", PromptCategory::Forecast)).expect("first");
        registry.register(prompt("get-alerts-overview", PromptCategory::Alerts)).expect("second");
        assert!(registry.register(prompt("get-forecast-overview", PromptCategory::Forecast)).is_err());

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.by_category(PromptCategory::Alerts).len(), 1);
        assert_eq!(
            registry.get_all().iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["get-alerts-overview", "get-forecast-overview"]
        );
        assert!(registry.remove("get-alerts-overview"));
        registry.clear();
        assert!(!registry.has("get-forecast-overview"));
    }
}
