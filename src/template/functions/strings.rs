use minijinja::Environment;
use minijinja::value::Value;
use regex::Regex;

use super::number;

pub(super) fn register(env: &mut Environment<'static>) {
    env.add_function("toUpper", |s: String| s.to_uppercase());
    env.add_function("toLower", |s: String| s.to_lowercase());
    env.add_function("title", |s: String| title(&s));
    env.add_function("trim", |s: String| s.trim().to_string());
    env.add_function("trimPrefix", |s: String, prefix: String| {
        s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_string()
    });
    env.add_function("trimSuffix", |s: String, suffix: String| {
        s.strip_suffix(suffix.as_str()).unwrap_or(&s).to_string()
    });
    env.add_function("replace", |s: String, old: String, new: String, n: i64| {
        replace(&s, &old, &new, n)
    });
    env.add_function("replaceAll", |s: String, old: String, new: String| {
        s.replace(&old, &new)
    });
    env.add_function("split", |s: String, sep: String| split(&s, &sep));
    env.add_function("join", |items: Vec<Value>, sep: String| join(&items, &sep));
    env.add_function("contains", |s: String, sub: String| s.contains(&sub));
    env.add_function("hasPrefix", |s: String, prefix: String| s.starts_with(&prefix));
    env.add_function("hasSuffix", |s: String, suffix: String| s.ends_with(&suffix));
    env.add_function("length", length);
    env.add_function("regexMatch", |pattern: String, s: String| regex_match(&pattern, &s));
    env.add_function("regexReplace", |pattern: String, repl: String, s: String| {
        regex_replace(&pattern, &repl, &s)
    });
    env.add_function("urlEncode", |s: String| url_encode(&s));
    env.add_function("urlDecode", |s: String| url_decode(&s));
    env.add_function("htmlEscape", |s: String| {
        html_escape::encode_quoted_attribute(&s).into_owned()
    });
    env.add_function("htmlUnescape", |s: String| {
        html_escape::decode_html_entities(&s).into_owned()
    });
    env.add_function("substr", |s: String, start: i64, len: i64| substr(&s, start, len));
    env.add_function("repeat", |s: String, count: i64| {
        s.repeat(usize::try_from(count).unwrap_or(0))
    });
}

/// Uppercase the first letter of every word.
pub(crate) fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    out
}

/// Replace the first `n` occurrences; a negative `n` replaces all.
pub(crate) fn replace(s: &str, old: &str, new: &str, n: i64) -> String {
    match usize::try_from(n) {
        Ok(count) => s.replacen(old, new, count),
        Err(_) => s.replace(old, new),
    }
}

pub(crate) fn split(s: &str, sep: &str) -> Vec<String> {
    if sep.is_empty() {
        return s.chars().map(String::from).collect();
    }
    s.split(sep).map(String::from).collect()
}

pub(crate) fn join(items: &[Value], sep: &str) -> String {
    items
        .iter()
        .map(|item| match item.as_str() {
            Some(s) => s.to_string(),
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(sep)
}

/// Byte length of a string, or element count of a list or map.
fn length(value: Value) -> Value {
    match value.as_str() {
        Some(s) => number(s.len() as f64),
        None => number(value.len().unwrap_or(0) as f64),
    }
}

/// An invalid pattern never matches.
pub(crate) fn regex_match(pattern: &str, s: &str) -> bool {
    Regex::new(pattern).map(|re| re.is_match(s)).unwrap_or(false)
}

/// An invalid pattern leaves the input unchanged.
pub(crate) fn regex_replace(pattern: &str, repl: &str, s: &str) -> String {
    match Regex::new(pattern) {
        Ok(re) => re.replace_all(s, repl).into_owned(),
        Err(_) => s.to_string(),
    }
}

/// Query-string escaping: spaces become `+`.
pub(crate) fn url_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Inverse of [`url_encode`]; undecodable input yields an empty string.
pub(crate) fn url_decode(s: &str) -> String {
    let plus_decoded = s.replace('+', " ");
    percent_encoding::percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_default()
}

/// Character-based substring, clamped to the input.
pub(crate) fn substr(s: &str, start: i64, len: i64) -> String {
    let start = usize::try_from(start).unwrap_or(0);
    let len = usize::try_from(len).unwrap_or(0);
    s.chars().skip(start).take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_capitalizes_words() {
        assert_eq!(title("hello wide-world"), "Hello Wide-World");
    }

    #[test]
    fn replace_honours_count() {
        assert_eq!(replace("aaa", "a", "b", 2), "bba");
        assert_eq!(replace("aaa", "a", "b", -1), "bbb");
    }

    #[test]
    fn join_and_split() {
        let items = vec![Value::from("a"), Value::from(1), Value::from("c")];
        assert_eq!(join(&items, ","), "a,1,c");
        assert_eq!(split("a,b,,c", ","), vec!["a", "b", "", "c"]);
    }

    #[test]
    fn regex_helpers_tolerate_bad_patterns() {
        assert!(regex_match(r"^\d+$", "123"));
        assert!(!regex_match("(", "anything"));
        assert_eq!(regex_replace(r"(\w+)@", "$1 at ", "joe@x"), "joe at x");
        assert_eq!(regex_replace("(", "x", "keep"), "keep");
    }

    #[test]
    fn url_round_trip() {
        assert_eq!(url_encode("a b&c=d"), "a+b%26c%3Dd");
        assert_eq!(url_decode("a+b%26c%3Dd"), "a b&c=d");
    }

    #[test]
    fn substr_clamps() {
        assert_eq!(substr("hello", 1, 3), "ell");
        assert_eq!(substr("hello", 3, 10), "lo");
        assert_eq!(substr("hello", 10, 2), "");
        assert_eq!(substr("hello", -2, 2), "he");
    }
}
