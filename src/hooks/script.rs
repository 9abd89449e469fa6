use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::HookError;
use crate::http::{HttpRequest, HttpResponse};
use crate::script::{JsRuntime, ScriptRuntime};

use super::{AfterHook, BeforeHook};

const REQUEST_ENTRY_POINT: &str = "processRequest";
const RESPONSE_ENTRY_POINT: &str = "processResponse";

/// Where a script hook gets its source from.
#[derive(Debug, Clone)]
pub enum ScriptSource {
    Inline(String),
    /// Read each time the hook runs.
    File(PathBuf),
}

/// Hands the request or response to a script as a plain object and maps
/// the returned object back.
///
/// Request scripts define `processRequest({body, headers, method, url})`;
/// response scripts define `processResponse({body, status, headers})`.
#[derive(Clone)]
pub struct ScriptHook {
    source: ScriptSource,
    runtime: Arc<dyn ScriptRuntime>,
}

impl ScriptHook {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_runtime(ScriptSource::Inline(source.into()), Arc::new(JsRuntime::new()))
    }

    /// Fails when `path` does not exist.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, HookError> {
        let path = path.into();
        if !path.exists() {
            return Err(HookError::ScriptFile {
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                path,
            });
        }
        Ok(Self::with_runtime(
            ScriptSource::File(path),
            Arc::new(JsRuntime::new()),
        ))
    }

    pub fn with_runtime(source: ScriptSource, runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self { source, runtime }
    }

    /// Swap the interpreter the script runs on.
    pub fn runtime(mut self, runtime: Arc<dyn ScriptRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    async fn load(&self) -> Result<String, HookError> {
        match &self.source {
            ScriptSource::Inline(source) => Ok(source.clone()),
            ScriptSource::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| HookError::ScriptFile {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }

    /// Interpreters are synchronous, so the call runs on the blocking pool.
    async fn call(&self, entry_point: &'static str, input: Value) -> Result<Value, HookError> {
        let source = self.load().await?;
        let runtime = Arc::clone(&self.runtime);
        debug!(entry_point, "running script hook");
        tokio::task::spawn_blocking(move || runtime.run(&source, entry_point, input))
            .await
            .map_err(|_| HookError::Aborted)?
            .map_err(HookError::from)
    }
}

impl std::fmt::Debug for ScriptHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHook")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BeforeHook for ScriptHook {
    async fn before(&self, mut request: HttpRequest) -> Result<HttpRequest, HookError> {
        if request.body.is_empty() {
            return Ok(request);
        }
        let body: Value = serde_json::from_slice(&request.body)
            .map_err(|err| HookError::Body(format!("request body is not JSON: {err}")))?;
        if !body.is_object() {
            return Err(HookError::Body("request body is not a JSON object".to_string()));
        }

        let input = json!({
            "body": body,
            "headers": request.header_map(),
            "method": request.method.as_str(),
            "url": request.url,
        });
        let output = self.call(REQUEST_ENTRY_POINT, input).await?;
        let Value::Object(output) = output else {
            return Err(HookError::Body(format!(
                "{REQUEST_ENTRY_POINT} must return an object"
            )));
        };

        match output.get("body") {
            Some(body @ Value::Object(_)) => {
                let encoded = serde_json::to_vec(body)
                    .map_err(|err| HookError::Body(err.to_string()))?;
                request.replace_body(encoded);
            }
            Some(Value::Null) | None => {}
            Some(_) => {
                return Err(HookError::Body(format!(
                    "{REQUEST_ENTRY_POINT} returned a body that is not an object"
                )));
            }
        }
        apply_headers(&output, |name, value| request.set_header(name, value))?;
        Ok(request)
    }

    fn name(&self) -> &str {
        "script"
    }
}

#[async_trait]
impl AfterHook for ScriptHook {
    async fn after(&self, mut response: HttpResponse) -> Result<HttpResponse, HookError> {
        let body = serde_json::from_slice::<Value>(&response.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&response.body).into_owned()));
        let input = json!({
            "body": body,
            "status": response.status.as_u16(),
            "headers": response.header_map(),
        });
        let output = self.call(RESPONSE_ENTRY_POINT, input).await?;
        let Value::Object(output) = output else {
            return Err(HookError::Body(format!(
                "{RESPONSE_ENTRY_POINT} must return an object"
            )));
        };

        if let Some(status) = output.get("status") {
            response.status = coerce_status(status)?;
        }
        match output.get("body") {
            Some(Value::String(text)) => response.replace_body(Bytes::from(text.clone())),
            Some(Value::Null) | None => {}
            Some(body) => {
                let encoded = serde_json::to_vec(body)
                    .map_err(|err| HookError::Body(err.to_string()))?;
                response.replace_body(encoded);
            }
        }
        apply_headers(&output, |name, value| response.set_header(name, value))?;
        Ok(response)
    }

    fn name(&self) -> &str {
        "script"
    }
}

/// Copy string-valued entries of the returned `headers` object.
fn apply_headers<F>(output: &Map<String, Value>, mut set: F) -> Result<(), HookError>
where
    F: FnMut(&str, &str) -> Result<(), crate::error::InvalidHeader>,
{
    if let Some(Value::Object(headers)) = output.get("headers") {
        for (name, value) in headers {
            if let Some(value) = value.as_str() {
                set(name, value)?;
            }
        }
    }
    Ok(())
}

/// Scripts may hand back the status as any numeric type.
fn coerce_status(value: &Value) -> Result<StatusCode, HookError> {
    let code = value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        })
        .ok_or_else(|| HookError::Body(format!("status `{value}` is not a number")))?;
    u16::try_from(code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| HookError::Body(format!("status {code} is out of range")))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::script::ScriptError;
    use crate::http::HttpMethod;

    use super::*;

    fn post(body: &str) -> HttpRequest {
        HttpRequest::new(HttpMethod::Post, "http://localhost/login").with_body(body.to_string())
    }

    #[tokio::test]
    async fn request_script_rewrites_body_and_headers() {
        let hook = ScriptHook::new(
            r#"
            function processRequest(req) {
                req.body.password = "hashed:" + req.body.password;
                req.headers["X-Method"] = req.method;
                return req;
            }
            "#,
        );
        let request = hook.before(post(r#"{"password":"pw"}"#)).await.unwrap();
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body, json!({"password": "hashed:pw"}));
        assert_eq!(request.header("X-Method"), Some("POST"));
    }

    #[tokio::test]
    async fn request_script_skips_empty_body() {
        let hook = ScriptHook::new("function processRequest(req) { throw new Error('ran'); }");
        let request = hook.before(post("")).await.unwrap();
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn request_script_requires_json_object() {
        let hook = ScriptHook::new("function processRequest(req) { return req; }");
        let err = hook.before(post("[1,2]")).await.unwrap_err();
        assert!(matches!(err, HookError::Body(_)));
    }

    #[tokio::test]
    async fn missing_entry_point_fails() {
        let hook = ScriptHook::new("function other() {}");
        let err = hook.before(post("{}")).await.unwrap_err();
        assert!(matches!(
            err,
            HookError::Script(ScriptError::MissingEntryPoint(_))
        ));
    }

    #[tokio::test]
    async fn response_script_coerces_status() {
        let hook = ScriptHook::new(
            r#"
            function processResponse(res) {
                return { status: 201.0, body: { wrapped: res.body } };
            }
            "#,
        );
        let response = hook
            .after(HttpResponse::new(StatusCode::OK, r#"{"id":1}"#))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, json!({"wrapped": {"id": 1}}));
    }

    #[tokio::test]
    async fn response_script_sees_text_bodies_as_strings() {
        let hook = ScriptHook::new(
            "function processResponse(res) { return { body: res.body.toUpperCase() }; }",
        );
        let response = hook
            .after(HttpResponse::new(StatusCode::OK, "plain"))
            .await
            .unwrap();
        assert_eq!(response.text(), "PLAIN");
        assert_eq!(response.status, StatusCode::OK);
    }

    #[test]
    fn coerce_status_rejects_garbage() {
        assert_eq!(coerce_status(&json!(404)).unwrap(), StatusCode::NOT_FOUND);
        assert!(coerce_status(&json!("200")).is_err());
        assert!(coerce_status(&json!(99_999)).is_err());
    }

    #[tokio::test]
    async fn file_scripts_are_read_at_execution() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "function processRequest(req) {{ req.body.n = 1; return req; }}"
        )
        .unwrap();
        let hook = ScriptHook::from_file(file.path()).unwrap();
        let request = hook.before(post("{}")).await.unwrap();
        assert_eq!(&request.body[..], br#"{"n":1}"#);

        assert!(ScriptHook::from_file("/definitely/not/here.js").is_err());
    }
}
