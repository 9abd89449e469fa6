use minijinja::value::{Value, ValueKind};
use minijinja::Environment;

use super::number;

pub(super) fn register(env: &mut Environment<'static>) {
    env.add_function("toString", |v: Value| to_string(&v));
    env.add_function("toInt", |v: Value| to_int(&v));
    env.add_function("toFloat", |v: Value| number(to_float(&v)));
    env.add_function("toBool", |v: Value| to_bool(&v));
    env.add_function("jsonEncode", |v: Value| {
        serde_json::to_string(&v).unwrap_or_else(|_| "{}".to_string())
    });
    env.add_function("jsonDecode", |s: String| {
        serde_json::from_str::<serde_json::Value>(&s)
            .map(|v| Value::from_serialize(&v))
            .unwrap_or(Value::from(()))
    });
    env.add_function("prettifyJSON", |s: String| prettify_json(&s));
}

pub(crate) fn to_string(v: &Value) -> String {
    if v.is_undefined() || v.is_none() {
        String::new()
    } else {
        v.to_string()
    }
}

/// Integers pass through, floats truncate, strings yield their leading
/// integer. Anything else is zero.
pub(crate) fn to_int(v: &Value) -> i64 {
    match v.kind() {
        ValueKind::Bool => i64::from(v.is_true()),
        ValueKind::Number => i64::try_from(v.clone())
            .or_else(|_| f64::try_from(v.clone()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        ValueKind::String => leading_int(v.as_str().unwrap_or_default()),
        _ => 0,
    }
}

pub(crate) fn to_float(v: &Value) -> f64 {
    match v.kind() {
        ValueKind::Bool => f64::from(u8::from(v.is_true())),
        ValueKind::Number => f64::try_from(v.clone()).unwrap_or(0.0),
        ValueKind::String => leading_float(v.as_str().unwrap_or_default()),
        _ => 0.0,
    }
}

/// Strings are false when empty, `"0"` or `"false"`; numbers when zero.
pub(crate) fn to_bool(v: &Value) -> bool {
    match v.kind() {
        ValueKind::String => !matches!(v.as_str().unwrap_or_default().trim(), "" | "0" | "false"),
        ValueKind::Number => to_float(v) != 0.0,
        _ => v.is_true(),
    }
}

pub(crate) fn prettify_json(s: &str) -> String {
    serde_json::from_str::<serde_json::Value>(s)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| s.to_string())
}

fn leading_int(s: &str) -> i64 {
    let s = s.trim();
    let end = s
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    s[..end].parse().unwrap_or(0)
}

fn leading_float(s: &str) -> f64 {
    let s = s.trim();
    (1..=s.len())
        .rev()
        .filter(|&end| s.is_char_boundary(end))
        .find_map(|end| s[..end].parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_int_variants() {
        assert_eq!(to_int(&Value::from(42)), 42);
        assert_eq!(to_int(&Value::from(3.9)), 3);
        assert_eq!(to_int(&Value::from("17abc")), 17);
        assert_eq!(to_int(&Value::from("-5")), -5);
        assert_eq!(to_int(&Value::from("abc")), 0);
        assert_eq!(to_int(&Value::from(())), 0);
    }

    #[test]
    fn to_float_uses_longest_prefix() {
        assert_eq!(to_float(&Value::from("2.5kg")), 2.5);
        assert_eq!(to_float(&Value::from("x")), 0.0);
        assert_eq!(to_float(&Value::from(7)), 7.0);
    }

    #[test]
    fn to_bool_variants() {
        assert!(to_bool(&Value::from("yes")));
        assert!(!to_bool(&Value::from("false")));
        assert!(!to_bool(&Value::from("0")));
        assert!(!to_bool(&Value::from("")));
        assert!(to_bool(&Value::from(2)));
        assert!(!to_bool(&Value::from(0)));
        assert!(!to_bool(&Value::from(())));
    }

    #[test]
    fn to_string_of_none_is_empty() {
        assert_eq!(to_string(&Value::from(())), "");
        assert_eq!(to_string(&Value::from(12)), "12");
    }

    #[test]
    fn prettify_keeps_invalid_input() {
        assert_eq!(prettify_json("not json"), "not json");
        assert_eq!(prettify_json(r#"{"a":1}"#), "{\n  \"a\": 1\n}");
    }
}
