//! Request body coercion.
//!
//! Bodies are read as raw bytes so that a missing body, malformed JSON and a
//! body of the wrong shape can be told apart:
//!
//! | body                         | error                       |
//! |------------------------------|-----------------------------|
//! | empty, or JSON but no object | `RequestError::EmptyBody`   |
//! | not JSON                     | `RequestError::InvalidBody` |
//! | object missing a key         | `RequestError::InvalidBody` |

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::RequestError;

pub type JsonObject = Map<String, Value>;

pub fn parse_object(bytes: &[u8]) -> Result<JsonObject, RequestError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(RequestError::EmptyBody);
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(RequestError::EmptyBody),
        Err(_) => Err(RequestError::InvalidBody),
    }
}

fn field<'a>(object: &'a JsonObject, key: &str) -> Result<&'a Value, RequestError> {
    object.get(key).ok_or(RequestError::InvalidBody)
}

pub fn require_str(object: &JsonObject, key: &str) -> Result<String, RequestError> {
    field(object, key)?
        .as_str()
        .map(str::to_string)
        .ok_or(RequestError::InvalidBody)
}

/// Integer, float (truncated) or numeric string.
pub fn require_int(object: &JsonObject, key: &str) -> Result<i64, RequestError> {
    match field(object, key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .ok_or(RequestError::InvalidBody),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| RequestError::InvalidBody),
        _ => Err(RequestError::InvalidBody),
    }
}

pub fn require_bool(object: &JsonObject, key: &str) -> Result<bool, RequestError> {
    match field(object, key)? {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(RequestError::InvalidBody),
    }
}

pub fn require_string_list(object: &JsonObject, key: &str) -> Result<Vec<String>, RequestError> {
    match field(object, key)? {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or(RequestError::InvalidBody))
            .collect(),
        _ => Err(RequestError::InvalidBody),
    }
}

/// Record key given as a string or a bare number.
pub fn require_id(object: &JsonObject, key: &str) -> Result<String, RequestError> {
    match field(object, key)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(RequestError::InvalidBody),
    }
}

pub fn require_date(object: &JsonObject, key: &str) -> Result<DateTime<Utc>, RequestError> {
    let raw = field(object, key)?.as_str().ok_or(RequestError::InvalidBody)?;
    parse_date(raw).ok_or(RequestError::InvalidBody)
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d %B %Y", "%B %d, %Y", "%b %d %Y"];

/// Parse the date notations clients send. Values without an offset are UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // JavaScript `Date.prototype.toString()`:
    // "Tue Nov 10 2020 00:00:00 GMT+0700 (Western Indonesia Time)"
    let without_zone_name = raw.split(" (").next().unwrap_or(raw);
    if let Ok(dt) = DateTime::parse_from_str(without_zone_name, "%a %b %d %Y %H:%M:%S GMT%z") {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(o) => o,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_parse_object_classification() {
        assert_eq!(parse_object(b"").unwrap_err(), RequestError::EmptyBody);
        assert_eq!(parse_object(b"  \n").unwrap_err(), RequestError::EmptyBody);
        assert_eq!(parse_object(b"\"text\"").unwrap_err(), RequestError::EmptyBody);
        assert_eq!(parse_object(b"[1, 2]").unwrap_err(), RequestError::EmptyBody);
        assert_eq!(parse_object(b"{not json").unwrap_err(), RequestError::InvalidBody);
        assert!(parse_object(b"{}").unwrap().is_empty());
    }

    #[test]
    fn test_missing_key_is_invalid_body() {
        let body = object(json!({"name": "x"}));
        assert_eq!(require_str(&body, "publisher").unwrap_err(), RequestError::InvalidBody);
    }

    #[test]
    fn test_int_coercion() {
        let body = object(json!({"a": 60, "b": "42", "c": 9.9, "d": "cheap", "e": true}));
        assert_eq!(require_int(&body, "a").unwrap(), 60);
        assert_eq!(require_int(&body, "b").unwrap(), 42);
        assert_eq!(require_int(&body, "c").unwrap(), 9);
        assert!(require_int(&body, "d").is_err());
        assert!(require_int(&body, "e").is_err());
    }

    #[test]
    fn test_list_and_id_coercion() {
        let body = object(json!({
            "platform": ["PC", "PS5"],
            "genre": "RPG",
            "mixed": ["PC", 5],
            "vendor_id": 7,
            "game_id": "abc"
        }));
        assert_eq!(require_string_list(&body, "platform").unwrap(), vec!["PC", "PS5"]);
        assert!(require_string_list(&body, "genre").is_err());
        assert!(require_string_list(&body, "mixed").is_err());
        assert_eq!(require_id(&body, "vendor_id").unwrap(), "7");
        assert_eq!(require_id(&body, "game_id").unwrap(), "abc");
    }

    #[test]
    fn test_bool_coercion() {
        let body = object(json!({"a": true, "b": "false", "c": 1}));
        assert!(require_bool(&body, "a").unwrap());
        assert!(!require_bool(&body, "b").unwrap());
        assert!(require_bool(&body, "c").is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let midnight = Utc.with_ymd_and_hms(2020, 11, 10, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2020-11-10").unwrap(), midnight);
        assert_eq!(parse_date("2020-11-10T00:00:00Z").unwrap(), midnight);
        assert_eq!(parse_date("2020-11-10 00:00:00").unwrap(), midnight);
        assert_eq!(parse_date("Tue, 10 Nov 2020 00:00:00 +0000").unwrap(), midnight);
        assert_eq!(parse_date("November 10, 2020").unwrap(), midnight);
        assert_eq!(
            parse_date("Tue Nov 10 2020 07:00:00 GMT+0700 (Western Indonesia Time)").unwrap(),
            midnight
        );
    }

    #[test]
    fn test_unparseable_date() {
        assert!(parse_date("").is_none());
        assert!(parse_date("someday").is_none());
        assert!(parse_date("2020-13-45").is_none());
    }
}
