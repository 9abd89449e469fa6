//! Template-driven HTTP requests.
//!
//! A JSON template document describes a request: method, URL, headers, a
//! body whose strings contain template expressions, hooks to run around
//! the exchange, and optional caching and retry. [`Client`] renders the
//! template against input data and carries the request through the
//! pipeline.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod hooks;
pub mod http;
pub mod script;
pub mod template;

pub use client::{Client, ResponseCache, RetryPolicy, TemplateDefinition};
pub use config::ClientConfig;
pub use error::{Error, HookError, Result, TemplateError, TransportError};
pub use hooks::{AfterHook, BeforeHook, Hook, HookChain, HookDefinition};
pub use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use template::TemplateEngine;
