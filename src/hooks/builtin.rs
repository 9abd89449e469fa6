use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::HookError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

use super::{AfterHook, BeforeHook};

/// Logs method and URL on the way out, status on the way back.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHook;

#[async_trait]
impl BeforeHook for LoggingHook {
    async fn before(&self, request: HttpRequest) -> Result<HttpRequest, HookError> {
        info!(method = %request.method, url = %request.url, "sending request");
        Ok(request)
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[async_trait]
impl AfterHook for LoggingHook {
    async fn after(&self, response: HttpResponse) -> Result<HttpResponse, HookError> {
        info!(status = response.status.as_u16(), "received response");
        Ok(response)
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Sets `Authorization: Bearer <token>`, replacing any existing value.
#[derive(Debug, Clone)]
pub struct AuthHook {
    token: String,
}

impl AuthHook {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl BeforeHook for AuthHook {
    async fn before(&self, mut request: HttpRequest) -> Result<HttpRequest, HookError> {
        request.set_header("Authorization", &format!("Bearer {}", self.token))?;
        Ok(request)
    }

    fn name(&self) -> &str {
        "auth"
    }
}

/// Renames top-level fields of JSON object bodies on POST and PUT.
///
/// Renamed keys keep their position. Bodies that are not JSON objects, or
/// that contain none of the mapped fields, are left byte-for-byte intact.
#[derive(Debug, Clone, Default)]
pub struct FieldTransformHook {
    mapping: HashMap<String, String>,
}

impl FieldTransformHook {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }

    fn transform(&self, body: &[u8]) -> Option<Vec<u8>> {
        let Ok(serde_json::Value::Object(fields)) = serde_json::from_slice(body) else {
            return None;
        };
        if !fields.keys().any(|key| self.mapping.contains_key(key)) {
            return None;
        }
        let renamed: serde_json::Map<String, serde_json::Value> = fields
            .into_iter()
            .map(|(key, value)| match self.mapping.get(&key) {
                Some(target) => (target.clone(), value),
                None => (key, value),
            })
            .collect();
        serde_json::to_vec(&renamed).ok()
    }
}

#[async_trait]
impl BeforeHook for FieldTransformHook {
    async fn before(&self, mut request: HttpRequest) -> Result<HttpRequest, HookError> {
        if !matches!(request.method, HttpMethod::Post | HttpMethod::Put) || request.body.is_empty() {
            return Ok(request);
        }
        if let Some(body) = self.transform(&request.body) {
            request.replace_body(body);
        }
        Ok(request)
    }

    fn name(&self) -> &str {
        "field-transform"
    }
}

type BeforeFn = dyn Fn(HttpRequest) -> Result<HttpRequest, HookError> + Send + Sync;
type AfterFn = dyn Fn(HttpResponse) -> Result<HttpResponse, HookError> + Send + Sync;

/// Host-supplied closures. A missing side passes its value through.
#[derive(Clone, Default)]
pub struct FunctionHook {
    name: String,
    before: Option<Arc<BeforeFn>>,
    after: Option<Arc<AfterFn>>,
}

impl FunctionHook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn on_before<F>(mut self, f: F) -> Self
    where
        F: Fn(HttpRequest) -> Result<HttpRequest, HookError> + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    pub fn on_after<F>(mut self, f: F) -> Self
    where
        F: Fn(HttpResponse) -> Result<HttpResponse, HookError> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for FunctionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHook")
            .field("name", &self.name)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

#[async_trait]
impl BeforeHook for FunctionHook {
    async fn before(&self, request: HttpRequest) -> Result<HttpRequest, HookError> {
        match &self.before {
            Some(f) => f(request),
            None => Ok(request),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl AfterHook for FunctionHook {
    async fn after(&self, response: HttpResponse) -> Result<HttpResponse, HookError> {
        match &self.after {
            Some(f) => f(response),
            None => Ok(response),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    fn post(body: &str) -> HttpRequest {
        HttpRequest::new(HttpMethod::Post, "http://localhost/users").with_body(body.to_string())
    }

    fn rename(from: &str, to: &str) -> FieldTransformHook {
        FieldTransformHook::new(HashMap::from([(from.to_string(), to.to_string())]))
    }

    #[tokio::test]
    async fn auth_sets_bearer_token() {
        let mut request = post("{}");
        request.set_header("Authorization", "Basic old").unwrap();
        let request = AuthHook::new("abc").before(request).await.unwrap();
        assert_eq!(request.header("Authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn field_transform_renames_in_place() {
        let hook = rename("user", "phone");
        let request = hook
            .before(post(r#"{"user":"X","password":"Y"}"#))
            .await
            .unwrap();
        assert_eq!(&request.body[..], br#"{"phone":"X","password":"Y"}"#);
    }

    #[tokio::test]
    async fn field_transform_leaves_unmatched_bodies_alone() {
        let hook = rename("user", "phone");
        let original = "{ \"name\" : \"X\" }";
        let request = hook.before(post(original)).await.unwrap();
        assert_eq!(&request.body[..], original.as_bytes());

        let request = hook.before(post("user=X")).await.unwrap();
        assert_eq!(&request.body[..], b"user=X");
    }

    #[tokio::test]
    async fn field_transform_skips_other_methods() {
        let hook = rename("user", "phone");
        for method in [HttpMethod::Get, HttpMethod::Patch] {
            let mut request = post(r#"{"user":"X","password":"Y"}"#);
            request.method = method;
            let request = hook.before(request).await.unwrap();
            assert_eq!(&request.body[..], br#"{"user":"X","password":"Y"}"#);
        }
    }

    #[tokio::test]
    async fn function_hook_runs_closures() {
        let hook = FunctionHook::new("tag")
            .on_before(|mut request| {
                request.set_header("X-Tag", "1")?;
                Ok(request)
            })
            .on_after(|mut response| {
                response.status = StatusCode::ACCEPTED;
                Ok(response)
            });

        let request = hook.before(post("{}")).await.unwrap();
        assert_eq!(request.header("X-Tag"), Some("1"));
        let response = hook
            .after(HttpResponse::new(StatusCode::OK, "ok"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert_eq!(BeforeHook::name(&hook), "tag");
    }

    #[tokio::test]
    async fn function_hook_without_closures_passes_through() {
        let hook = FunctionHook::new("noop");
        let response = hook
            .after(HttpResponse::new(StatusCode::NOT_FOUND, ""))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}
