use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};

use super::{AfterHook, BeforeHook, HookTask};

/// How a chain entry is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Awaited inline.
    Sync,
    /// Spawned on its own task and awaited for at most the given duration.
    Async(Duration),
}

struct Entry<H: ?Sized> {
    label: String,
    hook: Arc<H>,
    mode: ExecutionMode,
}

impl<H: ?Sized> Clone for Entry<H> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            hook: Arc::clone(&self.hook),
            mode: self.mode,
        }
    }
}

/// Ordered hooks. Each hook sees the output of the one before it and the
/// first failure stops the chain.
pub struct HookChain<H: ?Sized> {
    entries: Vec<Entry<H>>,
}

impl<H: ?Sized> HookChain<H> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, label: impl Into<String>, hook: Arc<H>, mode: ExecutionMode) {
        self.entries.push(Entry {
            label: label.into(),
            hook,
            mode,
        });
    }

    /// Append every entry of `other`, after the existing ones.
    pub fn extend(&mut self, other: &HookChain<H>) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H: ?Sized> Default for HookChain<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> Clone for HookChain<H> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl HookChain<dyn BeforeHook> {
    pub async fn run(&self, mut request: HttpRequest) -> Result<HttpRequest, Error> {
        for entry in &self.entries {
            debug!(hook = %entry.label, mode = ?entry.mode, "running before-request hook");
            let result = match entry.mode {
                ExecutionMode::Sync => entry.hook.before(request).await,
                ExecutionMode::Async(timeout) => {
                    HookTask::spawn_before(Arc::clone(&entry.hook), request)
                        .wait(timeout)
                        .await
                }
            };
            request = result.map_err(|source| Error::BeforeHook {
                hook: entry.label.clone(),
                source,
            })?;
        }
        Ok(request)
    }
}

impl HookChain<dyn AfterHook> {
    pub async fn run(&self, mut response: HttpResponse) -> Result<HttpResponse, Error> {
        for entry in &self.entries {
            debug!(hook = %entry.label, mode = ?entry.mode, "running after-response hook");
            let result = match entry.mode {
                ExecutionMode::Sync => entry.hook.after(response).await,
                ExecutionMode::Async(timeout) => {
                    HookTask::spawn_after(Arc::clone(&entry.hook), response)
                        .wait(timeout)
                        .await
                }
            };
            response = result.map_err(|source| Error::AfterHook {
                hook: entry.label.clone(),
                source,
            })?;
        }
        Ok(response)
    }
}
