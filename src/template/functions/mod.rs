//! Built-in template functions, grouped by concern.

mod collection;
mod convert;
mod crypto;
mod datetime;
mod logic;
mod math;
mod strings;

pub(crate) use crypto::sha256_hex;

use std::fmt::Write as _;

use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind, Output, State};

pub(crate) fn register_builtins(env: &mut Environment<'static>) {
    env.set_formatter(format_value);
    strings::register(env);
    datetime::register(env);
    math::register(env);
    convert::register(env);
    collection::register(env);
    logic::register(env);
    crypto::register(env);
}

/// Prints booleans and `none` as their JSON literals so they can be placed
/// directly into a JSON body; everything else uses the default formatter.
pub(crate) fn format_value(out: &mut Output, state: &State, value: &Value) -> Result<(), Error> {
    let literal = match value.kind() {
        ValueKind::Bool if value.is_true() => "true",
        ValueKind::Bool => "false",
        ValueKind::None => "null",
        _ => return minijinja::escape_formatter(out, state, value),
    };
    out.write_str(literal)
        .map_err(|_| Error::new(ErrorKind::WriteFailure, "failed to write template output"))
}

/// Whole floats render as integers so `add(1, 2)` prints `3`, not `3.0`.
pub(crate) fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

pub(crate) fn is_absent(value: &Value) -> bool {
    value.is_undefined() || value.is_none()
}
