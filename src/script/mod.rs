//! # Script Runtime
//!
//! Script hooks hand a JSON object to a named entry-point function and take
//! back whatever object it returns. [`ScriptRuntime`] is that seam;
//! [`JsRuntime`] implements it with an embedded JavaScript engine.
//!
//! Scripts see two host helpers besides the standard library:
//! `console.log(...)` and `rsaEncrypt(text, publicKeyPem)` (also bound as
//! `rsaEncryptGo`).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use boa_engine::{
    Context, JsArgs, JsNativeError, JsResult, JsString, JsValue, NativeFunction, Source,
    js_string,
};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

/// Errors raised while running a script entry point.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to evaluate script: {0}")]
    Evaluation(String),

    #[error("script does not define a `{0}` function")]
    MissingEntryPoint(String),

    #[error("`{entry_point}` threw: {message}")]
    Thrown { entry_point: String, message: String },

    #[error("cannot convert script value: {0}")]
    Conversion(String),
}

/// An embeddable interpreter able to call one function of a script.
pub trait ScriptRuntime: Send + Sync {
    /// Evaluate `source`, call the global function `entry_point` with
    /// `input` and return its result.
    fn run(
        &self,
        source: &str,
        entry_point: &str,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ScriptError>;
}

/// JavaScript runtime backed by boa. Each call gets a fresh context, so
/// scripts never share global state.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsRuntime;

const PRELUDE: &str = r#"
var console = {
    log: function () { __hostLog.apply(null, arguments); },
    info: function () { __hostLog.apply(null, arguments); },
    error: function () { __hostLog.apply(null, arguments); }
};
"#;

impl JsRuntime {
    pub fn new() -> Self {
        Self
    }

    fn context() -> Result<Context, ScriptError> {
        let mut context = Context::default();
        context
            .register_global_callable(js_string!("__hostLog"), 0, NativeFunction::from_fn_ptr(host_log))
            .map_err(|err| ScriptError::Evaluation(err.to_string()))?;
        // `rsaEncryptGo` is the name older hook scripts call.
        for name in [js_string!("rsaEncrypt"), js_string!("rsaEncryptGo")] {
            context
                .register_global_callable(name, 2, NativeFunction::from_fn_ptr(host_rsa_encrypt))
                .map_err(|err| ScriptError::Evaluation(err.to_string()))?;
        }
        context
            .eval(Source::from_bytes(PRELUDE))
            .map_err(|err| ScriptError::Evaluation(err.to_string()))?;
        Ok(context)
    }
}

impl ScriptRuntime for JsRuntime {
    fn run(
        &self,
        source: &str,
        entry_point: &str,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ScriptError> {
        let mut context = Self::context()?;
        context
            .eval(Source::from_bytes(source))
            .map_err(|err| ScriptError::Evaluation(err.to_string()))?;

        let function = context
            .global_object()
            .get(JsString::from(entry_point), &mut context)
            .map_err(|err| ScriptError::Evaluation(err.to_string()))?;
        let Some(function) = function.as_callable().cloned() else {
            return Err(ScriptError::MissingEntryPoint(entry_point.to_string()));
        };

        let argument = JsValue::from_json(&input, &mut context)
            .map_err(|err| ScriptError::Conversion(err.to_string()))?;
        let result = function
            .call(&JsValue::undefined(), &[argument], &mut context)
            .map_err(|err| ScriptError::Thrown {
                entry_point: entry_point.to_string(),
                message: err.to_string(),
            })?;
        if result.is_undefined() {
            return Ok(serde_json::Value::Null);
        }
        result
            .to_json(&mut context)
            .map_err(|err| ScriptError::Conversion(err.to_string()))
    }
}

fn host_log(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        let part = if arg.is_object() {
            arg.to_json(context)
                .map(|json| json.to_string())
                .unwrap_or_else(|_| String::from("[object]"))
        } else {
            arg.to_string(context)?.to_std_string_escaped()
        };
        parts.push(part);
    }
    tracing::info!(target: "script", "{}", parts.join(" "));
    Ok(JsValue::undefined())
}

fn host_rsa_encrypt(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let text = args.get_or_undefined(0).to_string(context)?.to_std_string_escaped();
    let pem = args.get_or_undefined(1).to_string(context)?.to_std_string_escaped();
    match rsa_encrypt(&text, &pem) {
        Ok(ciphertext) => Ok(JsValue::from(JsString::from(ciphertext.as_str()))),
        Err(message) => {
            let message = format!("rsaEncrypt: {message}");
            Err(JsNativeError::error().with_message(message).into())
        }
    }
}

/// Encrypt `text` with RSA-OAEP (SHA-256) and return base64 ciphertext.
/// Accepts SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM.
pub fn rsa_encrypt(text: &str, public_key_pem: &str) -> Result<String, String> {
    let key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_key_pem))
        .map_err(|err| format!("invalid public key: {err}"))?;
    let ciphertext = key
        .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), text.as_bytes())
        .map_err(|err| format!("encryption failed: {err}"))?;
    Ok(STANDARD.encode(ciphertext))
}
