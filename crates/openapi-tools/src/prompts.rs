//! Prompt templates derived from endpoints.
//!
//! Endpoints are classified into subject categories by keyword; each categorized endpoint gets
//! a prompt, each category gets an overview prompt, and every document gets an analysis prompt
//! (plus a comparison prompt when it spans more than one category).

use crate::config::PromptsConfig;
use crate::error::{OpenApiToolsError, Result};
use crate::types::{DocumentInfo, Endpoint};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptCategory {
    CurrentConditions,
    Forecast,
    Alerts,
    Historical,
    Marine,
    Aviation,
    Lifestyle,
    Analysis,
    Comparison,
}

/// Keyword table, checked in order; the first family with a hit wins.
const KEYWORDS: [(PromptCategory, &[&str]); 7] = [
    (PromptCategory::CurrentConditions, &["current", "conditions", "now", "present"]),
    (PromptCategory::Forecast, &["forecast", "prediction", "future", "daily", "hourly"]),
    (PromptCategory::Alerts, &["alert", "warning", "watch", "advisory"]),
    (PromptCategory::Historical, &["history", "historical", "past", "archive"]),
    (PromptCategory::Marine, &["marine", "ocean", "sea", "wave", "tide"]),
    (PromptCategory::Aviation, &["aviation", "flight", "airport", "metar", "taf"]),
    (PromptCategory::Lifestyle, &["lifestyle", "index", "comfort", "activity"]),
];

impl PromptCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CurrentConditions => "current-conditions",
            Self::Forecast => "forecast",
            Self::Alerts => "alerts",
            Self::Historical => "historical",
            Self::Marine => "marine",
            Self::Aviation => "aviation",
            Self::Lifestyle => "lifestyle",
            Self::Analysis => "analysis",
            Self::Comparison => "comparison",
        }
    }
}

impl fmt::Display for PromptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword classification over path, summary and description.
#[must_use]
pub fn categorize(endpoint: &Endpoint) -> Option<PromptCategory> {
    let text = endpoint.classification_text();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(category, _)| *category)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl PromptArgument {
    fn new(name: &str, description: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptExample {
    pub description: String,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct GeneratedPrompt {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
    pub category: PromptCategory,
    pub template: String,
    pub examples: Vec<PromptExample>,
    pub tags: Vec<String>,
    pub source: Arc<DocumentInfo>,
}

impl GeneratedPrompt {
    /// Listing shape: name, description, arguments.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "arguments": self.arguments,
        })
    }

    /// Detailed shape used by the HTTP prompt endpoint.
    #[must_use]
    pub fn to_detail_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "arguments": self.arguments,
            "category": self.category,
            "template": self.template,
            "examples": self.examples,
            "tags": self.tags,
            "source": self.source.location,
        })
    }

    /// Template with `{{name}}` placeholders filled, followed by the supplied argument values in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error naming the first required argument that is missing or blank.
    pub fn render(&self, arguments: &Map<String, Value>) -> Result<String> {
        let mut text = self.template.clone();
        let mut lines = Vec::new();
        for arg in &self.arguments {
            let value = arguments.get(&arg.name).and_then(|v| match v {
                Value::Null => None,
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            });
            match value {
                Some(v) => {
                    text = text.replace(&format!("{{{{{}}}}}", arg.name), &v);
                    lines.push(format!("- {}: {v}", arg.name));
                }
                None if arg.required => {
                    return Err(OpenApiToolsError::Validation(format!(
                        "missing required argument: {}",
                        arg.name
                    )));
                }
                None => {}
            }
        }

        if !lines.is_empty() {
            text.push_str("\n\nArguments:\n");
            text.push_str(&lines.join("\n"));
        }
        Ok(text)
    }

    /// `prompts/get` result: description plus a single user message.
    ///
    /// # Errors
    ///
    /// See [`GeneratedPrompt::render`].
    pub fn to_messages(&self, arguments: &Map<String, Value>) -> Result<Value> {
        let text = self.render(arguments)?;
        Ok(json!({
            "description": self.description,
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": text },
            }],
        }))
    }
}

/// `get /v1/alerts/{id}` → `get-v1-alerts-id-endpoint`.
#[must_use]
pub fn prompt_name(path: &str, method: &str, suffix: &str) -> String {
    let mut clean = String::with_capacity(path.len());
    for ch in path.chars() {
        let ch = if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            ch
        } else {
            '-'
        };
        if ch == '-' && clean.ends_with('-') {
            continue;
        }
        clean.push(ch);
    }

    let mut name = format!("{}-{}", method.to_ascii_lowercase(), clean.trim_matches('-'));
    if !suffix.is_empty() {
        name.push('-');
        name.push_str(suffix);
    }
    name
}

#[derive(Debug, Clone, Default)]
pub struct PromptGenerator {
    config: PromptsConfig,
    max_description_length: usize,
}

impl PromptGenerator {
    #[must_use]
    pub fn new(config: PromptsConfig, max_description_length: usize) -> Self {
        Self {
            config,
            max_description_length,
        }
    }

    #[must_use]
    pub fn generate(&self, endpoints: &[Endpoint], info: &Arc<DocumentInfo>) -> Vec<GeneratedPrompt> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut prompts = Vec::new();
        let mut by_category: BTreeMap<PromptCategory, usize> = BTreeMap::new();

        for endpoint in endpoints {
            let Some(category) = categorize(endpoint) else {
                continue;
            };
            *by_category.entry(category).or_default() += 1;

            if self.config.generate_from_endpoints && self.allows(category) {
                prompts.push(self.endpoint_prompt(endpoint, category, info));
            }
        }

        for (&category, &count) in &by_category {
            prompts.push(self.overview_prompt(category, count, info));
        }
        if by_category.len() > 1 {
            prompts.push(self.comparison_prompt(info));
        }
        prompts.push(self.analysis_prompt(info));

        tracing::debug!(document = %info.location, prompts = prompts.len(), "generated prompts");
        prompts
    }

    fn allows(&self, category: PromptCategory) -> bool {
        self.config.categories.is_empty()
            || self.config.categories.iter().any(|c| c == category.as_str())
    }

    fn examples(&self, description: String, arguments: Value) -> Vec<PromptExample> {
        if !self.config.include_examples {
            return Vec::new();
        }
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        vec![PromptExample {
            description,
            arguments,
        }]
    }

    fn truncate(&self, text: String) -> String {
        if self.max_description_length == 0 || text.chars().count() <= self.max_description_length {
            return text;
        }
        let mut cut: String = text
            .chars()
            .take(self.max_description_length.saturating_sub(3))
            .collect();
        cut.push_str("...");
        cut
    }

    fn endpoint_prompt(
        &self,
        endpoint: &Endpoint,
        category: PromptCategory,
        info: &Arc<DocumentInfo>,
    ) -> GeneratedPrompt {
        let summary = endpoint.summary.as_deref().unwrap_or_default().to_lowercase();
        let description = endpoint
            .description
            .clone()
            .unwrap_or_else(|| format!("Get {summary} data"));

        let mut template = format!("I need to get {category} data");
        if let Some(detail) = &endpoint.description {
            template.push_str(" - specifically: ");
            template.push_str(detail);
        }
        template.push_str("\n\nPlease provide the data in a clear, structured format.");
        let extra = match category {
            PromptCategory::CurrentConditions => {
                Some("Include current temperature, humidity, wind conditions, and visibility.")
            }
            PromptCategory::Forecast => {
                Some("Include forecast periods, expected conditions, and confidence levels.")
            }
            PromptCategory::Alerts => Some("Include alert types, severity levels, and affected areas."),
            PromptCategory::Historical => {
                Some("Include historical trends and comparisons to normal conditions.")
            }
            _ => None,
        };
        if let Some(extra) = extra {
            template.push_str("\n\n");
            template.push_str(extra);
        }

        let mut arguments = vec![PromptArgument::new(
            "location",
            "Location for weather data (e.g., 'New York, NY' or coordinates)",
            true,
        )];
        arguments.extend(
            endpoint
                .parameters
                .iter()
                .filter(|p| !matches!(p.name.as_str(), "location" | "lat" | "lon"))
                .map(|p| PromptArgument {
                    name: p.name.clone(),
                    description: p.description.clone().unwrap_or_default(),
                    required: p.required,
                }),
        );

        GeneratedPrompt {
            name: prompt_name(&endpoint.path, &endpoint.method, "endpoint"),
            description: self.truncate(description),
            arguments,
            category,
            template,
            examples: self.examples(
                format!("Get {summary} for New York"),
                json!({ "location": "New York, NY" }),
            ),
            tags: vec![
                endpoint.method.to_ascii_lowercase(),
                category.to_string(),
                "endpoint".to_string(),
            ],
            source: Arc::clone(info),
        }
    }

    fn overview_prompt(
        &self,
        category: PromptCategory,
        endpoint_count: usize,
        info: &Arc<DocumentInfo>,
    ) -> GeneratedPrompt {
        let mut template = format!("I need comprehensive {category} information");
        if endpoint_count > 1 {
            template.push_str(&format!(" from {endpoint_count} available data sources"));
        }
        template.push_str("\n\nPlease provide:");
        let details: &[&str] = match category {
            PromptCategory::CurrentConditions => &[
                "Current temperature, humidity, and pressure",
                "Wind speed and direction",
                "Visibility and cloud cover",
                "Any significant weather conditions",
            ],
            PromptCategory::Forecast => &[
                "Multi-day forecast with daily summaries",
                "Hourly details for the next 24-48 hours",
                "Probability of precipitation",
                "Temperature trends and extremes",
            ],
            PromptCategory::Alerts => &[
                "All active weather alerts and warnings",
                "Severity levels and affected areas",
                "Timing and expected impacts",
                "Recommended actions if applicable",
            ],
            _ => &[],
        };
        for line in details {
            template.push_str("\n- ");
            template.push_str(line);
        }

        let mut arguments = vec![PromptArgument::new("location", "Location for weather data", true)];
        let mut example = json!({ "location": "Chicago, IL" });
        match category {
            PromptCategory::Forecast => {
                arguments.push(PromptArgument::new(
                    "days",
                    "Number of forecast days (default: 5)",
                    false,
                ));
                example["days"] = json!(7);
            }
            PromptCategory::Historical => {
                arguments.push(PromptArgument::new(
                    "start_date",
                    "Start date for historical data (YYYY-MM-DD)",
                    false,
                ));
                arguments.push(PromptArgument::new(
                    "end_date",
                    "End date for historical data (YYYY-MM-DD)",
                    false,
                ));
                example["start_date"] = json!("2024-01-01");
                example["end_date"] = json!("2024-01-07");
            }
            _ => {}
        }

        GeneratedPrompt {
            name: format!("get-{category}-overview"),
            description: format!("Get comprehensive {category} information"),
            arguments,
            category,
            template,
            examples: self.examples(format!("Get {category} overview for Chicago"), example),
            tags: vec![
                category.to_string(),
                "overview".to_string(),
                "comprehensive".to_string(),
            ],
            source: Arc::clone(info),
        }
    }

    fn comparison_prompt(&self, info: &Arc<DocumentInfo>) -> GeneratedPrompt {
        GeneratedPrompt {
            name: "compare-weather-data".to_string(),
            description: "Compare different weather data sources and formats".to_string(),
            arguments: vec![
                PromptArgument::new("location", "Location for weather data comparison", true),
                PromptArgument::new(
                    "data_types",
                    "Comma-separated list of data types to compare",
                    false,
                ),
            ],
            category: PromptCategory::Comparison,
            template: "I need to compare weather data from multiple sources to get a comprehensive view.\n\n\
                Please provide:\n\
                - Side-by-side comparison of the requested data types\n\
                - Highlight any significant differences between sources\n\
                - Explain potential reasons for discrepancies\n\
                - Recommend the most reliable source for each data type\n\n\
                Format the comparison in a clear, easy-to-read table or structured format."
                .to_string(),
            examples: self.examples(
                "Compare current conditions from multiple sources".to_string(),
                json!({ "location": "New York, NY", "data_types": "current,forecast,alerts" }),
            ),
            tags: vec![
                "comparison".to_string(),
                "analysis".to_string(),
                "multiple-sources".to_string(),
            ],
            source: Arc::clone(info),
        }
    }

    fn analysis_prompt(&self, info: &Arc<DocumentInfo>) -> GeneratedPrompt {
        GeneratedPrompt {
            name: "analyze-weather-patterns".to_string(),
            description: "Analyze weather patterns and trends".to_string(),
            arguments: vec![
                PromptArgument::new("location", "Location for weather analysis", true),
                PromptArgument::new(
                    "time_period",
                    "Time period for analysis (e.g., '7 days', '1 month')",
                    false,
                ),
                PromptArgument::new(
                    "focus_areas",
                    "Specific areas to focus on (e.g., 'temperature', 'precipitation')",
                    false,
                ),
            ],
            category: PromptCategory::Analysis,
            template: "I need a detailed analysis of weather patterns and trends.\n\n\
                Please provide:\n\
                - Trend analysis over the specified time period\n\
                - Comparison to historical averages or norms\n\
                - Identification of notable patterns or anomalies\n\
                - Implications for the specified focus areas\n\
                - Recommendations or insights based on the analysis\n\n\
                Present the analysis with clear explanations and supporting data."
                .to_string(),
            examples: self.examples(
                "Analyze temperature trends over the past week".to_string(),
                json!({
                    "location": "Chicago, IL",
                    "time_period": "7 days",
                    "focus_areas": "temperature,precipitation",
                }),
            ),
            tags: vec![
                "analysis".to_string(),
                "patterns".to_string(),
                "trends".to_string(),
            ],
            source: Arc::clone(info),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{extract_endpoints, parse_document};
    use crate::types::ClassificationTags;

    fn info() -> Arc<DocumentInfo> {
        Arc::new(DocumentInfo {
            location: "/specs/weather.json".to_string(),
            version: "3".to_string(),
            title: "weather".to_string(),
            is_remote: false,
            tags: ClassificationTags::default(),
            content: None,
        })
    }

    fn endpoints() -> Vec<Endpoint> {
        let doc = parse_document(
            swagger_docs_test_support::weather_spec_json("https://api.example.com").as_bytes(),
            "weather.json",
        )
        .expect("parse");
        extract_endpoints(&doc)
    }

    fn names(prompts: &[GeneratedPrompt]) -> Vec<&str> {
        prompts.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn categorizes_by_first_matching_family() {
        let eps = endpoints();
        let by_path: BTreeMap<_, _> = eps.iter().map(|e| (e.path.as_str(), categorize(e))).collect();
        assert_eq!(by_path["/v3/wx/forecast/daily/{days}"], Some(PromptCategory::Forecast));
        assert_eq!(by_path["/v1/alerts"], Some(PromptCategory::Alerts));
        assert_eq!(by_path["/v2/observations"], None);
    }

    #[test]
    fn generates_endpoint_overview_comparison_and_analysis_prompts() {
        let prompts = PromptGenerator::new(PromptsConfig::default(), 500).generate(&endpoints(), &info());
        assert_eq!(
            names(&prompts),
            vec![
                "get-v1-alerts-endpoint",
                "get-v3-wx-forecast-daily-days-endpoint",
                "get-forecast-overview",
                "get-alerts-overview",
                "compare-weather-data",
                "analyze-weather-patterns",
            ]
        );

        let daily = &prompts[1];
        assert_eq!(daily.description, "Get daily forecast data");
        assert_eq!(daily.tags, vec!["get", "forecast", "endpoint"]);
        let arg_names: Vec<_> = daily.arguments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(arg_names, vec!["location", "days", "geocode", "x-trace"]);
        assert!(daily.template.starts_with("I need to get forecast data"));
        assert_eq!(daily.examples[0].arguments["location"], "New York, NY");

        let overview = &prompts[2];
        assert!(overview.arguments.iter().any(|a| a.name == "days"));
        assert_eq!(overview.examples[0].arguments["days"], 7);
    }

    #[test]
    fn category_allow_list_and_toggles() {
        let config = PromptsConfig {
            categories: vec!["alerts".to_string()],
            include_examples: false,
            ..PromptsConfig::default()
        };
        let prompts = PromptGenerator::new(config, 500).generate(&endpoints(), &info());
        assert!(names(&prompts).contains(&"get-v1-alerts-endpoint"));
        assert!(!names(&prompts).contains(&"get-v3-wx-forecast-daily-days-endpoint"));
        assert!(prompts.iter().all(|p| p.examples.is_empty()));

        let disabled = PromptsConfig {
            enabled: false,
            ..PromptsConfig::default()
        };
        assert!(PromptGenerator::new(disabled, 500).generate(&endpoints(), &info()).is_empty());
    }

    #[test]
    fn render_requires_required_arguments() {
        let prompts = PromptGenerator::new(PromptsConfig::default(), 500).generate(&endpoints(), &info());
        let analysis = prompts.last().expect("analysis");

        let err = analysis.render(&Map::new()).unwrap_err();
        assert!(err.to_string().contains("missing required argument: location"));

        let mut args = Map::new();
        args.insert("location".into(), json!("Paris"));
        args.insert("focus_areas".into(), json!(["wind"]));
        let text = analysis.render(&args).expect("render");
        assert!(text.starts_with("I need a detailed analysis"));
        assert!(text.ends_with("Arguments:\n- location: Paris\n- focus_areas: [\"wind\"]"));

        let mut templated = analysis.clone();
        templated.template = "Weather for {{location}}".to_string();
        assert!(templated.render(&args).expect("render").starts_with("Weather for Paris\n\nArguments:"));

        let messages = analysis.to_messages(&args).expect("messages");
        assert_eq!(messages["messages"][0]["role"], "user");
        assert_eq!(messages["messages"][0]["content"]["text"], text);
    }

    #[test]
    fn prompt_names_are_dash_separated() {
        assert_eq!(prompt_name("/v1/{geo}/now.json", "GET", "endpoint"), "get-v1-geo-now-json-endpoint");
    }
}
