use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::HookError;
use crate::http::{HttpRequest, HttpResponse};

use super::{AfterHook, BeforeHook};

/// A hook running on its own task, delivering its result over a channel.
///
/// On timeout the task is aborted. Cancellation takes effect at the hook's
/// next await point; command hooks kill their child on drop, while script
/// hooks executing on the blocking pool run to completion in the
/// background and their result is discarded.
pub struct HookTask<T> {
    result: oneshot::Receiver<Result<T, HookError>>,
    handle: JoinHandle<()>,
}

impl HookTask<HttpRequest> {
    pub fn spawn_before(hook: Arc<dyn BeforeHook>, request: HttpRequest) -> Self {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let _ = tx.send(hook.before(request).await);
        });
        Self { result: rx, handle }
    }
}

impl HookTask<HttpResponse> {
    pub fn spawn_after(hook: Arc<dyn AfterHook>, response: HttpResponse) -> Self {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let _ = tx.send(hook.after(response).await);
        });
        Self { result: rx, handle }
    }
}

impl<T> HookTask<T> {
    /// Wait for the hook's result for at most `timeout`.
    pub async fn wait(self, timeout: Duration) -> Result<T, HookError> {
        match tokio::time::timeout(timeout, self.result).await {
            Ok(Ok(result)) => result,
            // The task dropped its sender, i.e. it panicked.
            Ok(Err(_)) => Err(HookError::Aborted),
            Err(_) => {
                warn!(timeout = ?timeout, "async hook timed out, aborting");
                self.handle.abort();
                Err(HookError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use http::StatusCode;

    use crate::http::HttpMethod;

    use super::*;

    struct Sleepy(Duration);

    #[async_trait]
    impl BeforeHook for Sleepy {
        async fn before(&self, mut request: HttpRequest) -> Result<HttpRequest, HookError> {
            tokio::time::sleep(self.0).await;
            request.set_header("X-Slept", "yes")?;
            Ok(request)
        }
    }

    struct Panics;

    #[async_trait]
    impl AfterHook for Panics {
        async fn after(&self, _response: HttpResponse) -> Result<HttpResponse, HookError> {
            panic!("hook exploded");
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, "http://localhost")
    }

    #[tokio::test]
    async fn delivers_result_within_deadline() {
        let task = HookTask::spawn_before(Arc::new(Sleepy(Duration::from_millis(10))), request());
        let request = task.wait(Duration::from_secs(2)).await.unwrap();
        assert_eq!(request.header("X-Slept"), Some("yes"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_aborts() {
        let task = HookTask::spawn_before(Arc::new(Sleepy(Duration::from_secs(3))), request());
        let err = task.wait(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, HookError::Timeout(d) if d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn panicking_hook_is_aborted() {
        let task = HookTask::spawn_after(Arc::new(Panics), HttpResponse::new(StatusCode::OK, ""));
        let err = task.wait(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, HookError::Aborted));
    }
}
