//! # Hooks
//!
//! Before-request hooks receive the outgoing [`HttpRequest`] and return the
//! (possibly rewritten) request; after-response hooks do the same for the
//! [`HttpResponse`]. Hooks are composed into a [`HookChain`] where each
//! entry runs either inline or on its own task with a deadline.
//!
//! Built-in hooks are collected in the [`Hook`] enum, which is also what a
//! declarative [`HookDefinition`] materializes into.

mod builtin;
mod chain;
mod command;
mod definition;
mod script;
mod task;

use async_trait::async_trait;

use crate::error::HookError;
use crate::http::{HttpRequest, HttpResponse};

pub use builtin::{AuthHook, FieldTransformHook, FunctionHook, LoggingHook};
pub use chain::{ExecutionMode, HookChain};
pub use command::{CommandHook, DEFAULT_HOOK_TIMEOUT};
pub use definition::{HookDefinition, HookKind};
pub use script::{ScriptHook, ScriptSource};
pub use task::HookTask;

/// Runs before a request is sent.
#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn before(&self, request: HttpRequest) -> Result<HttpRequest, HookError>;

    /// Label used in logs and error messages.
    fn name(&self) -> &str {
        "hook"
    }
}

/// Runs after a response is received, or after a cached response is found.
#[async_trait]
pub trait AfterHook: Send + Sync {
    async fn after(&self, response: HttpResponse) -> Result<HttpResponse, HookError>;

    fn name(&self) -> &str {
        "hook"
    }
}

/// Every built-in hook behind one type.
///
/// Variants that only act on one side pass the other side through.
pub enum Hook {
    Logging(LoggingHook),
    Auth(AuthHook),
    FieldTransform(FieldTransformHook),
    Function(FunctionHook),
    Script(ScriptHook),
    Command(CommandHook),
}

#[async_trait]
impl BeforeHook for Hook {
    async fn before(&self, request: HttpRequest) -> Result<HttpRequest, HookError> {
        match self {
            Hook::Logging(hook) => hook.before(request).await,
            Hook::Auth(hook) => hook.before(request).await,
            Hook::FieldTransform(hook) => hook.before(request).await,
            Hook::Function(hook) => hook.before(request).await,
            Hook::Script(hook) => hook.before(request).await,
            Hook::Command(hook) => hook.before(request).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Hook::Logging(hook) => BeforeHook::name(hook),
            Hook::Auth(hook) => BeforeHook::name(hook),
            Hook::FieldTransform(hook) => BeforeHook::name(hook),
            Hook::Function(hook) => BeforeHook::name(hook),
            Hook::Script(hook) => BeforeHook::name(hook),
            Hook::Command(hook) => BeforeHook::name(hook),
        }
    }
}

#[async_trait]
impl AfterHook for Hook {
    async fn after(&self, response: HttpResponse) -> Result<HttpResponse, HookError> {
        match self {
            Hook::Logging(hook) => hook.after(response).await,
            Hook::Auth(_) | Hook::FieldTransform(_) => Ok(response),
            Hook::Function(hook) => hook.after(response).await,
            Hook::Script(hook) => hook.after(response).await,
            Hook::Command(hook) => hook.after(response).await,
        }
    }

    fn name(&self) -> &str {
        BeforeHook::name(self)
    }
}

impl From<LoggingHook> for Hook {
    fn from(hook: LoggingHook) -> Self {
        Hook::Logging(hook)
    }
}

impl From<AuthHook> for Hook {
    fn from(hook: AuthHook) -> Self {
        Hook::Auth(hook)
    }
}

impl From<FieldTransformHook> for Hook {
    fn from(hook: FieldTransformHook) -> Self {
        Hook::FieldTransform(hook)
    }
}

impl From<FunctionHook> for Hook {
    fn from(hook: FunctionHook) -> Self {
        Hook::Function(hook)
    }
}

impl From<ScriptHook> for Hook {
    fn from(hook: ScriptHook) -> Self {
        Hook::Script(hook)
    }
}

impl From<CommandHook> for Hook {
    fn from(hook: CommandHook) -> Self {
        Hook::Command(hook)
    }
}
