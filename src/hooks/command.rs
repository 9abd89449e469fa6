use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::HookError;
use crate::http::{HttpRequest, HttpResponse};

use super::{AfterHook, BeforeHook};

/// Deadline applied to subprocesses and async hooks when none is given.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Pipes the body through a shell command.
///
/// The body is written to the command's stdin; non-empty stdout replaces
/// it. A non-zero exit or a run longer than the timeout fails the hook and
/// the child is killed.
#[derive(Debug, Clone)]
pub struct CommandHook {
    command: String,
    timeout: Duration,
}

impl CommandHook {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            DEFAULT_HOOK_TIMEOUT
        } else {
            timeout
        };
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    async fn pipe(&self, input: Bytes) -> Result<Option<Bytes>, HookError> {
        debug!(command = %self.command, "running command hook");
        let mut child = shell(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HookError::CommandSpawn {
                command: self.command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                // The command may exit without reading its input.
                let _ = stdin.write_all(&input).await;
            });
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|source| HookError::CommandSpawn {
                command: self.command.clone(),
                source,
            })?,
            Err(_) => {
                warn!(command = %self.command, timeout = ?self.timeout, "command hook timed out");
                return Err(HookError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            return Err(HookError::CommandFailed {
                command: self.command.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Bytes::from(output.stdout)))
        }
    }
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[async_trait]
impl BeforeHook for CommandHook {
    async fn before(&self, mut request: HttpRequest) -> Result<HttpRequest, HookError> {
        if let Some(body) = self.pipe(request.body.clone()).await? {
            request.replace_body(body);
        }
        Ok(request)
    }

    fn name(&self) -> &str {
        "command"
    }
}

#[async_trait]
impl AfterHook for CommandHook {
    async fn after(&self, mut response: HttpResponse) -> Result<HttpResponse, HookError> {
        if let Some(body) = self.pipe(response.body.clone()).await? {
            response.replace_body(body);
        }
        Ok(response)
    }

    fn name(&self) -> &str {
        "command"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use http::StatusCode;

    use crate::http::HttpMethod;

    use super::*;

    fn post(body: &str) -> HttpRequest {
        HttpRequest::new(HttpMethod::Post, "http://localhost").with_body(body.to_string())
    }

    #[tokio::test]
    async fn stdout_replaces_body() {
        let hook = CommandHook::new("tr a-z A-Z", Duration::from_secs(5));
        let request = hook.before(post("{\"k\":\"v\"}")).await.unwrap();
        assert_eq!(&request.body[..], b"{\"K\":\"V\"}");
    }

    #[tokio::test]
    async fn empty_stdout_keeps_body() {
        let hook = CommandHook::new("cat > /dev/null", Duration::from_secs(5));
        let response = hook
            .after(HttpResponse::new(StatusCode::OK, "kept"))
            .await
            .unwrap();
        assert_eq!(response.text(), "kept");
    }

    #[tokio::test]
    async fn non_zero_exit_fails() {
        let hook = CommandHook::new("echo oops >&2; exit 3", Duration::from_secs(5));
        let err = hook.before(post("{}")).await.unwrap_err();
        match err {
            HookError::CommandFailed { stderr, .. } => assert_eq!(stderr, "oops"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let hook = CommandHook::new("sleep 5", Duration::from_millis(200));
        let start = Instant::now();
        let err = hook.before(post("{}")).await.unwrap_err();
        assert!(matches!(err, HookError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn zero_timeout_uses_default() {
        let hook = CommandHook::new("true", Duration::ZERO);
        assert_eq!(hook.timeout, DEFAULT_HOOK_TIMEOUT);
    }
}
