//! Swagger/OpenAPI document pipeline.
//!
//! Discovery ([`scanner`]) finds description documents on disk or behind URLs, [`parser`]
//! validates them and extracts endpoints, and the generators turn those endpoints into tools,
//! prompts and resources which the [`registry`] stores by name.
//!
//! Outbound execution of generated tools lives in `swagger-docs-http-tools`; this crate only
//! describes the calls (see [`types::GeneratedTool::operation`]).

pub mod config;
pub mod error;
pub mod filter;
pub mod generator;
pub mod naming;
pub mod parser;
pub mod prompts;
pub mod registry;
pub mod resources;
pub mod scanner;
pub mod types;
