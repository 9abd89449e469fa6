use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HookError;
use crate::script::{JsRuntime, ScriptRuntime};

use super::{CommandHook, ExecutionMode, Hook, ScriptHook, ScriptSource};

/// Kinds of hook a definition may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Script,
    Command,
    Function,
}

impl HookKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "js" => Some(HookKind::Script),
            "command" => Some(HookKind::Command),
            "function" => Some(HookKind::Function),
            _ => None,
        }
    }
}

/// A hook as declared in a template document:
///
/// ```json
/// {"type": "js", "name": "sign", "script": "function processRequest(r) { return r; }",
///  "async": true, "timeout": 5}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(rename = "async", default)]
    pub is_async: bool,
    /// Seconds. Zero means the default.
    #[serde(default)]
    pub timeout: u64,
}

impl HookDefinition {
    pub fn timeout(&self) -> Duration {
        if self.timeout == 0 {
            super::DEFAULT_HOOK_TIMEOUT
        } else {
            Duration::from_secs(self.timeout)
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        if self.is_async {
            ExecutionMode::Async(self.timeout())
        } else {
            ExecutionMode::Sync
        }
    }

    /// Name for logs and errors, falling back to the type.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.kind
        } else {
            &self.name
        }
    }

    /// Materialize the hook with the default JavaScript runtime.
    pub fn build(&self) -> Result<Hook, HookError> {
        self.build_with_runtime(Arc::new(JsRuntime::new()))
    }

    /// `function` hooks only exist in code and always fail here.
    pub fn build_with_runtime(&self, runtime: Arc<dyn ScriptRuntime>) -> Result<Hook, HookError> {
        match HookKind::parse(&self.kind) {
            Some(HookKind::Script) => {
                let script = self.script.clone().ok_or_else(|| HookError::MissingField {
                    name: self.label().to_string(),
                    field: "script",
                })?;
                Ok(Hook::Script(ScriptHook::with_runtime(
                    ScriptSource::Inline(script),
                    runtime,
                )))
            }
            Some(HookKind::Command) => {
                let command = self.command.clone().ok_or_else(|| HookError::MissingField {
                    name: self.label().to_string(),
                    field: "command",
                })?;
                Ok(Hook::Command(CommandHook::new(command, self.timeout())))
            }
            Some(HookKind::Function) => Err(HookError::Unsupported(self.kind.clone())),
            None => Err(HookError::UnknownType(self.kind.clone())),
        }
    }
}
