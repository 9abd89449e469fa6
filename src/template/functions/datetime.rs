//! Time values travel through templates as RFC 3339 strings. Functions that
//! take a time also accept an integer number of Unix seconds. Layouts use
//! `strftime` syntax.

use std::fmt::Write;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, Error};

use super::invalid;

pub(super) fn register(env: &mut Environment<'static>) {
    env.add_function("now", || Local::now().fixed_offset().to_rfc3339());
    env.add_function("formatTime", |t: Value, layout: String| {
        format_time(&to_datetime(&t)?, &layout)
    });
    env.add_function("formatDate", |t: Value| format_time(&to_datetime(&t)?, "%Y-%m-%d"));
    env.add_function("formatDateTime", |t: Value| {
        format_time(&to_datetime(&t)?, "%Y-%m-%d %H:%M:%S")
    });
    env.add_function("parseTime", |layout: String, value: String| {
        parse_time(&layout, &value).map(|t| t.to_rfc3339())
    });
    env.add_function("addDate", |t: Value, days: i64| {
        shift(&t, TimeDelta::try_days(days))
    });
    env.add_function("addHours", |t: Value, hours: i64| {
        shift(&t, TimeDelta::try_hours(hours))
    });
    env.add_function("addMinutes", |t: Value, minutes: i64| {
        shift(&t, TimeDelta::try_minutes(minutes))
    });
    env.add_function("since", |t: Value| -> Result<f64, Error> {
        Ok(seconds_between(&to_datetime(&t)?, &Utc::now().fixed_offset()))
    });
    env.add_function("until", |t: Value| -> Result<f64, Error> {
        Ok(seconds_between(&Utc::now().fixed_offset(), &to_datetime(&t)?))
    });
    env.add_function("isAfter", |a: Value, b: Value| -> Result<bool, Error> {
        Ok(to_datetime(&a)? > to_datetime(&b)?)
    });
    env.add_function("isBefore", |a: Value, b: Value| -> Result<bool, Error> {
        Ok(to_datetime(&a)? < to_datetime(&b)?)
    });
    env.add_function("year", |t: Value| -> Result<i64, Error> {
        Ok(i64::from(to_datetime(&t)?.year()))
    });
    env.add_function("month", |t: Value| format_time(&to_datetime(&t)?, "%B"));
    env.add_function("day", |t: Value| -> Result<i64, Error> {
        Ok(i64::from(to_datetime(&t)?.day()))
    });
    env.add_function("weekday", |t: Value| format_time(&to_datetime(&t)?, "%A"));
    env.add_function("unixTime", |t: Value| -> Result<i64, Error> {
        Ok(to_datetime(&t)?.timestamp())
    });
    env.add_function("fromUnixTime", |seconds: i64| {
        from_unix(seconds).map(|t| t.to_rfc3339())
    });
}

/// Interpret a template value as a point in time.
pub(crate) fn to_datetime(value: &Value) -> Result<DateTime<FixedOffset>, Error> {
    if let Some(s) = value.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .map_err(|err| invalid(format!("`{s}` is not an RFC 3339 time: {err}")));
    }
    if value.kind() != ValueKind::Number {
        return Err(invalid(format!("expected a time value, got {}", value.kind())));
    }
    match i64::try_from(value.clone()) {
        Ok(seconds) => from_unix(seconds),
        Err(_) => Err(invalid(format!("`{value}` is not a whole number of seconds"))),
    }
}

pub(crate) fn from_unix(seconds: i64) -> Result<DateTime<FixedOffset>, Error> {
    DateTime::from_timestamp(seconds, 0)
        .map(|t| t.fixed_offset())
        .ok_or_else(|| invalid(format!("unix time {seconds} is out of range")))
}

pub(crate) fn format_time(t: &DateTime<FixedOffset>, layout: &str) -> Result<String, Error> {
    let mut out = String::new();
    write!(out, "{}", t.format(layout))
        .map_err(|_| invalid(format!("invalid time layout `{layout}`")))?;
    Ok(out)
}

/// Parse with a zoned layout first, then a naive date-time, then a bare
/// date. Naive results are taken as UTC.
pub(crate) fn parse_time(layout: &str, value: &str) -> Result<DateTime<FixedOffset>, Error> {
    if let Ok(t) = DateTime::parse_from_str(value, layout) {
        return Ok(t);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, layout) {
        return Ok(naive.and_utc().fixed_offset());
    }
    NaiveDate::parse_from_str(value, layout)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| invalid(format!("cannot parse `{value}` with layout `{layout}`")))
}

fn shift(t: &Value, delta: Option<TimeDelta>) -> Result<String, Error> {
    let t = to_datetime(t)?;
    delta
        .and_then(|delta| t.checked_add_signed(delta))
        .map(|shifted| shifted.to_rfc3339())
        .ok_or_else(|| invalid("time shift out of range"))
}

fn seconds_between(from: &DateTime<FixedOffset>, to: &DateTime<FixedOffset>) -> f64 {
    let delta = to.signed_duration_since(*from);
    delta.num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format() {
        let t = parse_time("%Y-%m-%d", "2024-02-29").unwrap();
        assert_eq!(format_time(&t, "%d/%m/%Y").unwrap(), "29/02/2024");
        assert_eq!(t.to_rfc3339(), "2024-02-29T00:00:00+00:00");
    }

    #[test]
    fn parse_zoned_layout() {
        let t = parse_time("%Y-%m-%d %H:%M:%S %z", "2024-01-02 03:04:05 +0800").unwrap();
        assert_eq!(t.timestamp(), 1_704_135_845);
    }

    #[test]
    fn parse_rejects_mismatch() {
        assert!(parse_time("%Y-%m-%d", "yesterday").is_err());
    }

    #[test]
    fn invalid_layout_is_an_error() {
        let t = from_unix(0).unwrap();
        assert!(format_time(&t, "%Q").is_err());
    }

    #[test]
    fn to_datetime_accepts_strings_and_unix_seconds() {
        let from_string = to_datetime(&Value::from("1970-01-01T00:01:00Z")).unwrap();
        let from_int = to_datetime(&Value::from(60)).unwrap();
        assert_eq!(from_string, from_int);
        assert!(to_datetime(&Value::from(true)).is_err());
    }

    #[test]
    fn shifts_and_components() {
        let shifted = shift(&Value::from("2024-12-31T23:00:00Z"), TimeDelta::try_hours(2)).unwrap();
        let t = to_datetime(&Value::from(shifted)).unwrap();
        assert_eq!(t.year(), 2025);
        assert_eq!(t.day(), 1);
        assert_eq!(format_time(&t, "%B %A").unwrap(), "January Wednesday");
    }
}
