use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, Error};

use super::{invalid, number};

pub(super) fn register(env: &mut Environment<'static>) {
    env.add_function("first", |items: Vec<Value>| {
        items.into_iter().next().unwrap_or(Value::from(()))
    });
    env.add_function("last", |items: Vec<Value>| {
        items.into_iter().last().unwrap_or(Value::from(()))
    });
    env.add_function("slice", |items: Vec<Value>, start: i64, end: i64| {
        slice(&items, start, end)
    });
    env.add_function("append", |mut items: Vec<Value>, item: Value| {
        items.push(item);
        items
    });
    env.add_function("indexOf", |items: Vec<Value>, item: Value| index_of(&items, &item));
    env.add_function("reverse", |mut items: Vec<Value>| {
        items.reverse();
        items
    });
    env.add_function("keys", |map: Value| keys(&map));
    env.add_function("values", |map: Value| -> Result<Vec<Value>, Error> {
        keys(&map)?.iter().map(|key| map.get_item(key)).collect()
    });
    env.add_function("hasKey", |map: Value, key: String| has_key(&map, &key));
    env.add_function("sum", |items: Vec<Value>| sum(&items).map(number));
    env.add_function("avg", |items: Vec<Value>| -> Result<Value, Error> {
        if items.is_empty() {
            return Ok(Value::from(0));
        }
        Ok(number(sum(&items)? / items.len() as f64))
    });
}

/// Bounds are clamped to the list, so out-of-range indices never fail.
pub(crate) fn slice(items: &[Value], start: i64, end: i64) -> Vec<Value> {
    let len = items.len() as i64;
    let start = start.clamp(0, len) as usize;
    let end = end.clamp(0, len) as usize;
    if start >= end {
        return Vec::new();
    }
    items[start..end].to_vec()
}

pub(crate) fn index_of(items: &[Value], item: &Value) -> i64 {
    items
        .iter()
        .position(|candidate| candidate == item)
        .map_or(-1, |i| i as i64)
}

/// Map keys in sorted order.
pub(crate) fn keys(map: &Value) -> Result<Vec<Value>, Error> {
    if map.kind() != ValueKind::Map {
        return Err(invalid(format!("expected a map, got {}", map.kind())));
    }
    let mut keys: Vec<Value> = map.try_iter()?.collect();
    keys.sort();
    Ok(keys)
}

pub(crate) fn has_key(map: &Value, key: &str) -> bool {
    map.kind() == ValueKind::Map
        && map
            .get_attr(key)
            .map(|v| !v.is_undefined())
            .unwrap_or(false)
}

pub(crate) fn sum(items: &[Value]) -> Result<f64, Error> {
    items.iter().try_fold(0.0, |acc, item| {
        f64::try_from(item.clone())
            .map(|n| acc + n)
            .map_err(|_| invalid(format!("cannot sum non-numeric value `{item}`")))
    })
}
