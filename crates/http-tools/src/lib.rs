//! Outbound HTTP runtime for swagger-docs-mcp tools.
//!
//! Used by the document scanner (URL checks) and by both server transports (tool execution).
//! Knows nothing about `OpenAPI`; callers describe each call as an [`config::HttpOperation`].

pub mod config;
pub mod runtime;
pub mod safety;
