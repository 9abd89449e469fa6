//! # Client
//!
//! [`Client`] turns a JSON template document plus input data into an HTTP
//! exchange: render body and headers, run before-hooks, consult the
//! response cache, send (with retry when enabled), run after-hooks and
//! store successful responses.

mod cache;
mod definition;
mod retry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Error, Result, TemplateError};
use crate::hooks::{
    AfterHook, AuthHook, BeforeHook, CommandHook, ExecutionMode, HookChain, HookDefinition,
    LoggingHook, ScriptHook, ScriptSource,
};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::script::{JsRuntime, ScriptRuntime};
use crate::template::TemplateEngine;

pub use cache::{ResponseCache, fingerprint};
pub use definition::{CachingSpec, RequestSpec, RetrySpec, TemplateDefinition};
pub use retry::{RetryPolicy, is_retryable};

/// Template-driven HTTP client.
///
/// Configure it (headers, global hooks, template functions) before sharing
/// it; executions only need `&self` and may run concurrently.
pub struct Client {
    transport: Arc<dyn Transport>,
    base_url: String,
    headers: Vec<(String, String)>,
    before: HookChain<dyn BeforeHook>,
    after: HookChain<dyn AfterHook>,
    engine: TemplateEngine,
    cache: Arc<ResponseCache>,
    runtime: Arc<dyn ScriptRuntime>,
    next_template: AtomicU64,
}

impl Client {
    /// Client sending over `reqwest` with the given default timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let transport = ReqwestTransport::new(timeout)?;
        Ok(Self::with_transport(base_url, Arc::new(transport)))
    }

    pub fn with_transport(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            headers: Vec::new(),
            before: HookChain::new(),
            after: HookChain::new(),
            engine: TemplateEngine::new(),
            cache: Arc::new(ResponseCache::new()),
            runtime: Arc::new(JsRuntime::new()),
            next_template: AtomicU64::new(0),
        }
    }

    /// Apply default headers, a global auth hook when a token is set and
    /// logging hooks when logging is enabled.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut client = Self::new(config.base_url.clone(), config.timeout_duration())?;
        for (name, value) in &config.default_headers {
            client.set_header(name.clone(), value.clone());
        }
        if let Some(token) = config.auth_token.as_deref().filter(|t| !t.is_empty()) {
            client.add_before_hook(AuthHook::new(token));
        }
        if config.enable_logging {
            client.add_before_hook(LoggingHook);
            client.add_after_hook(LoggingHook);
        }
        Ok(client)
    }

    /// Share a response cache between clients, or inject a prepared one.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Runtime used by script hooks declared in templates.
    pub fn with_script_runtime(mut self, runtime: Arc<dyn ScriptRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Set a client-level header. Values may contain template expressions.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.headers.push((name, value)),
        }
    }

    pub fn add_before_hook<H: BeforeHook + 'static>(&mut self, hook: H) {
        let label = hook.name().to_string();
        self.before.push(label, Arc::new(hook), ExecutionMode::Sync);
    }

    pub fn add_after_hook<H: AfterHook + 'static>(&mut self, hook: H) {
        let label = hook.name().to_string();
        self.after.push(label, Arc::new(hook), ExecutionMode::Sync);
    }

    /// Run `hook` on its own task, failing the request after `timeout`.
    pub fn add_async_before_hook<H: BeforeHook + 'static>(&mut self, hook: H, timeout: Duration) {
        let label = hook.name().to_string();
        self.before.push(label, Arc::new(hook), ExecutionMode::Async(timeout));
    }

    pub fn add_async_after_hook<H: AfterHook + 'static>(&mut self, hook: H, timeout: Duration) {
        let label = hook.name().to_string();
        self.after.push(label, Arc::new(hook), ExecutionMode::Async(timeout));
    }

    /// Add an inline script as a global before-request hook.
    pub fn add_script_hook(&mut self, source: impl Into<String>, is_async: bool, timeout: Duration) {
        let hook = ScriptHook::with_runtime(
            ScriptSource::Inline(source.into()),
            Arc::clone(&self.runtime),
        );
        self.push_before(hook, is_async, timeout);
    }

    /// Like [`add_script_hook`](Self::add_script_hook), reading the script
    /// from `path` each time it runs. Fails when the file does not exist.
    pub fn add_script_hook_from_file(
        &mut self,
        path: impl Into<PathBuf>,
        is_async: bool,
        timeout: Duration,
    ) -> Result<()> {
        let path = path.into();
        let hook = ScriptHook::from_file(&path)
            .map_err(|source| Error::HookDefinition {
                hook: path.display().to_string(),
                source,
            })?
            .runtime(Arc::clone(&self.runtime));
        self.push_before(hook, is_async, timeout);
        Ok(())
    }

    /// Pipe request bodies through a shell command.
    pub fn add_command_hook(&mut self, command: impl Into<String>, is_async: bool, timeout: Duration) {
        self.push_before(CommandHook::new(command, timeout), is_async, timeout);
    }

    fn push_before<H: BeforeHook + 'static>(&mut self, hook: H, is_async: bool, timeout: Duration) {
        if is_async {
            let timeout = if timeout.is_zero() {
                crate::hooks::DEFAULT_HOOK_TIMEOUT
            } else {
                timeout
            };
            self.add_async_before_hook(hook, timeout);
        } else {
            self.add_before_hook(hook);
        }
    }

    pub fn template_engine(&self) -> &TemplateEngine {
        &self.engine
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Execute a template document against `data`.
    pub async fn execute_template_json<D: Serialize>(
        &self,
        template_json: &str,
        data: &D,
    ) -> Result<HttpResponse> {
        let definition = TemplateDefinition::parse(template_json)?;
        let id = format!(
            "template_{}",
            self.next_template.fetch_add(1, Ordering::Relaxed)
        );
        let mut scope = TemplateScope::new(&self.engine);

        let body = match definition.body_source()? {
            Some(source) => {
                scope.add(&id, source)?;
                self.engine.render_validated(&id, data)?
            }
            None => Bytes::new(),
        };

        let base_url = definition
            .request
            .base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.base_url);
        let url = format!("{base_url}{}", definition.request.path);
        let method = match definition.request.method.as_deref() {
            Some(method) if !method.trim().is_empty() => method
                .parse::<HttpMethod>()
                .map_err(Error::InvalidRequest)?,
            _ => HttpMethod::Get,
        };

        let mut request = HttpRequest::new(method, url).with_body(body);
        request.timeout = definition.timeout();
        let headers = self
            .headers
            .iter()
            .map(|(k, v)| (k, v))
            .chain(definition.request.headers.iter());
        for (name, value) in headers {
            let template = format!("{id}_header_{name}");
            scope.add(&template, value.as_str())?;
            let rendered = self.engine.execute(&template, data)?;
            request.set_header(name, &rendered)?;
        }
        if method.is_mutating() && request.header("Content-Type").is_none() {
            request.set_header("Content-Type", "application/json")?;
        }

        let before = self.before_chain(&definition.before_hooks)?;
        let after = self.after_chain(&definition.after_hooks)?;

        let request = before.run(request).await?;

        let cache_key = if definition.caching.enabled {
            Some(self.cache_key(&definition, &id, &mut scope, data, &request)?)
        } else {
            None
        };
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key).await {
                debug!(key = %key, "cache hit");
                // Stored responses already went through the template's hooks.
                return self.after.run(cached).await;
            }
            debug!(key = %key, "cache miss");
        }

        let response = match definition.retry_policy() {
            Some(policy) => policy.send(self.transport.as_ref(), &request).await?,
            None => self.transport.send(request.clone()).await?,
        };
        let response = after.run(response).await?;

        if let Some(key) = cache_key {
            if response.is_success() {
                self.cache
                    .insert(key, response.clone(), definition.cache_ttl())
                    .await;
            }
        }
        Ok(response)
    }

    /// Read a template document from `path` and execute it.
    pub async fn execute_template_file<D: Serialize>(
        &self,
        path: impl AsRef<Path>,
        data: &D,
    ) -> Result<HttpResponse> {
        let template = read_file(path.as_ref()).await?;
        self.execute_template_json(&template, data).await
    }

    /// Execute the template at `template_path` with JSON data read from
    /// `data_path`.
    pub async fn execute_template_with_data_file(
        &self,
        template_path: impl AsRef<Path>,
        data_path: impl AsRef<Path>,
    ) -> Result<HttpResponse> {
        let template = read_file(template_path.as_ref()).await?;
        let data_path = data_path.as_ref();
        let raw = read_file(data_path).await?;
        let data: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| Error::Data {
                path: data_path.to_path_buf(),
                source,
            })?;
        self.execute_template_json(&template, &data).await
    }

    /// Send a request without a template: client headers and global hooks
    /// apply, caching and retry do not.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<HttpResponse> {
        let mut request = HttpRequest::new(method, format!("{}{path}", self.base_url));
        for (name, value) in &self.headers {
            request.set_header(name, value)?;
        }
        if let Some(body) = body {
            request = request.with_body(body);
            if method.is_mutating() && request.header("Content-Type").is_none() {
                request.set_header("Content-Type", "application/json")?;
            }
        }
        let request = self.before.run(request).await?;
        let response = self.transport.send(request).await?;
        self.after.run(response).await
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        self.request(HttpMethod::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: impl Into<Bytes>) -> Result<HttpResponse> {
        self.request(HttpMethod::Post, path, Some(body.into())).await
    }

    pub async fn put(&self, path: &str, body: impl Into<Bytes>) -> Result<HttpResponse> {
        self.request(HttpMethod::Put, path, Some(body.into())).await
    }

    pub async fn delete(&self, path: &str) -> Result<HttpResponse> {
        self.request(HttpMethod::Delete, path, None).await
    }

    /// Template hooks first, then the global ones.
    fn before_chain(&self, definitions: &[HookDefinition]) -> Result<HookChain<dyn BeforeHook>> {
        let mut chain: HookChain<dyn BeforeHook> = HookChain::new();
        for definition in definitions {
            let hook = definition
                .build_with_runtime(Arc::clone(&self.runtime))
                .map_err(|source| Error::HookDefinition {
                    hook: definition.label().to_string(),
                    source,
                })?;
            chain.push(definition.label(), Arc::new(hook), definition.execution_mode());
        }
        chain.extend(&self.before);
        Ok(chain)
    }

    fn after_chain(&self, definitions: &[HookDefinition]) -> Result<HookChain<dyn AfterHook>> {
        let mut chain: HookChain<dyn AfterHook> = HookChain::new();
        for definition in definitions {
            let hook = definition
                .build_with_runtime(Arc::clone(&self.runtime))
                .map_err(|source| Error::HookDefinition {
                    hook: definition.label().to_string(),
                    source,
                })?;
            chain.push(definition.label(), Arc::new(hook), definition.execution_mode());
        }
        chain.extend(&self.after);
        Ok(chain)
    }

    /// The rendered key pattern, or the request fingerprint when there is
    /// no pattern or it renders blank.
    fn cache_key<D: Serialize>(
        &self,
        definition: &TemplateDefinition,
        id: &str,
        scope: &mut TemplateScope<'_>,
        data: &D,
        request: &HttpRequest,
    ) -> Result<String> {
        if let Some(pattern) = definition.key_pattern() {
            let template = format!("{id}_cache_key");
            scope.add(&template, pattern)?;
            let key = self.engine.execute(&template, data)?;
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }
        Ok(fingerprint(&request.url, &request.body))
    }
}

/// Per-execution templates, removed from the engine when dropped.
struct TemplateScope<'a> {
    engine: &'a TemplateEngine,
    names: Vec<String>,
}

impl<'a> TemplateScope<'a> {
    fn new(engine: &'a TemplateEngine) -> Self {
        Self {
            engine,
            names: Vec::new(),
        }
    }

    fn add(&mut self, name: &str, source: impl Into<String>) -> Result<(), TemplateError> {
        self.engine.add_template(name, source)?;
        self.names.push(name.to_string());
        Ok(())
    }
}

impl Drop for TemplateScope<'_> {
    fn drop(&mut self) {
        for name in &self.names {
            self.engine.remove_template(name);
        }
    }
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
}
