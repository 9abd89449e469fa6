//! # Template Engine
//!
//! Named templates compiled against a shared function library. Templates
//! use Jinja syntax (`{{ name }}`, `{{ toUpper(user.name) }}`,
//! `{% if admin %}...{% endif %}`); string literals inside templates that
//! are themselves embedded in JSON should use single quotes.
//!
//! Functions are resolved when a template renders, so a function
//! registered after a template was added is visible to it.

pub mod functions;

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use minijinja::value::{Rest, Value};
use minijinja::{Environment, ErrorKind};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::TemplateError;

/// A memoized render, tied to the data object it was produced from. The
/// weak handle keeps the allocation reserved, so its address cannot be
/// handed to another object while the entry exists.
struct Rendered {
    data: Weak<dyn Any + Send + Sync>,
    output: Bytes,
}

impl Rendered {
    fn is_for<D: Any + Send + Sync>(&self, data: &Arc<D>) -> bool {
        self.data.strong_count() > 0
            && std::ptr::addr_eq(self.data.as_ptr(), Arc::as_ptr(data))
    }
}

/// Renders named templates with the built-in function library.
pub struct TemplateEngine {
    env: RwLock<Environment<'static>>,
    rendered: RwLock<HashMap<String, Vec<Rendered>>>,
    next_temporary: AtomicU64,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        functions::register_builtins(&mut env);
        Self {
            env: RwLock::new(env),
            rendered: RwLock::new(HashMap::new()),
            next_temporary: AtomicU64::new(0),
        }
    }

    /// Add or override a function available to every template.
    pub fn register_function<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, minijinja::Error> + Send + Sync + 'static,
    {
        let name = name.into();
        self.env
            .write()
            .add_function(name, move |args: Rest<Value>| function(&args));
    }

    /// Compile `source` under `name`, replacing any previous template and
    /// its memoized output.
    pub fn add_template(
        &self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), TemplateError> {
        let name = name.into();
        self.env
            .write()
            .add_template_owned(name.clone(), source.into())
            .map_err(|source| TemplateError::Parse {
                name: name.clone(),
                source,
            })?;
        self.rendered.write().remove(&name);
        Ok(())
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.env.read().get_template(name).is_ok()
    }

    pub fn remove_template(&self, name: &str) {
        self.env.write().remove_template(name);
        self.rendered.write().remove(name);
    }

    /// Render `name` against `data`.
    pub fn execute<D: Serialize>(&self, name: &str, data: &D) -> Result<String, TemplateError> {
        let env = self.env.read();
        let template = env.get_template(name).map_err(|err| match err.kind() {
            ErrorKind::TemplateNotFound => TemplateError::NotFound(name.to_string()),
            _ => TemplateError::Execution {
                name: name.to_string(),
                source: err,
            },
        })?;

        template.render(data).map_err(|source| TemplateError::Execution {
            name: name.to_string(),
            source,
        })
    }

    /// Render `name` and check the output is valid JSON.
    ///
    /// Output is memoized per template and per data object: calling again
    /// with the same `Arc` returns the stored bytes without rendering. A
    /// different object, even one with equal contents, renders afresh.
    pub fn render_json<D>(&self, name: &str, data: &Arc<D>) -> Result<Bytes, TemplateError>
    where
        D: Serialize + Send + Sync + 'static,
    {
        if let Some(hit) = self
            .rendered
            .read()
            .get(name)
            .and_then(|entries| entries.iter().find(|entry| entry.is_for(data)))
        {
            return Ok(hit.output.clone());
        }

        let output = self.render_validated(name, data.as_ref())?;
        let handle: Weak<dyn Any + Send + Sync> = Arc::downgrade(data) as Weak<D>;
        let mut rendered = self.rendered.write();
        let entries = rendered.entry(name.to_string()).or_default();
        entries.retain(|entry| entry.data.strong_count() > 0);
        entries.push(Rendered {
            data: handle,
            output: output.clone(),
        });
        Ok(output)
    }

    /// Render `name` and check the output is valid JSON, without memoizing.
    pub fn render_validated<D: Serialize>(
        &self,
        name: &str,
        data: &D,
    ) -> Result<Bytes, TemplateError> {
        let output = self.execute(name, data)?;
        if let Err(source) = serde_json::from_str::<serde_json::Value>(&output) {
            return Err(TemplateError::InvalidJson {
                name: name.to_string(),
                output,
                source,
            });
        }
        Ok(Bytes::from(output))
    }

    /// Render a one-off template that is discarded afterwards.
    pub fn parse_and_render_json<D: Serialize>(
        &self,
        source: &str,
        data: &D,
    ) -> Result<Bytes, TemplateError> {
        let id = self.next_temporary.fetch_add(1, Ordering::Relaxed);
        let name = format!("temp_template_{id}");
        self.add_template(name.clone(), source)?;
        let result = self.render_validated(&name, data);
        self.remove_template(&name);
        result
    }

    /// Drop every memoized render.
    pub fn clear_cache(&self) {
        self.rendered.write().clear();
    }

    pub fn format_json(&self, json: &[u8]) -> Result<String, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(json)?;
        serde_json::to_string_pretty(&value)
    }

    pub fn validate_json(&self, json: &[u8]) -> Result<(), serde_json::Error> {
        serde_json::from_slice::<serde_json::Value>(json).map(|_| ())
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
