use minijinja::value::{Rest, Value};
use minijinja::Environment;

use super::is_absent;

pub(super) fn register(env: &mut Environment<'static>) {
    env.add_function("ternary", |cond: Value, a: Value, b: Value| {
        if cond.is_true() { a } else { b }
    });
    env.add_function("defaultValue", |v: Value, fallback: Value| {
        if is_absent(&v) { fallback } else { v }
    });
    env.add_function("coalesce", |values: Rest<Value>| coalesce(&values));
    env.add_function("and", |a: Value, b: Value| a.is_true() && b.is_true());
    env.add_function("or", |a: Value, b: Value| a.is_true() || b.is_true());
    env.add_function("not", |a: Value| !a.is_true());
    env.add_function("eq", |a: Value, b: Value| a == b);
    env.add_function("ne", |a: Value, b: Value| a != b);
    env.add_function("lt", |a: f64, b: f64| a < b);
    env.add_function("le", |a: f64, b: f64| a <= b);
    env.add_function("gt", |a: f64, b: f64| a > b);
    env.add_function("ge", |a: f64, b: f64| a >= b);
    env.add_function("strEq", |a: String, b: String| a == b);
    env.add_function("strLt", |a: String, b: String| a < b);
}

/// First argument that is neither none, undefined nor the empty string.
pub(crate) fn coalesce(values: &[Value]) -> Value {
    values
        .iter()
        .find(|v| !is_absent(v) && v.as_str() != Some(""))
        .cloned()
        .unwrap_or(Value::from(()))
}
