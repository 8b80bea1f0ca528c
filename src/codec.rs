//! Wire codecs for non-JSON-native value shapes.
//!
//! The remote API encodes 64-bit integers as decimal strings, durations as
//! seconds with an `s` suffix (`"3.5s"`), and calendar dates as partial
//! year/month/day objects. The serde helper modules here are meant for
//! `#[serde(with = "...")]` on resource types; absent values serialize to an
//! omitted field, never to `null` or a zero sentinel.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// `Option<i64>` as an optional decimal string (`1234` ⇄ `"1234"`).
pub mod int64_str {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<i64>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => ser.serialize_str(&v.to_string()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
        let raw: Option<String> = Option::deserialize(de)?;
        match raw {
            None => Ok(None),
            Some(s) => s
                .parse::<i64>()
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid int64 string {:?}: {}", s, e))),
        }
    }
}

/// `Option<Duration>` as an optional suffixed-seconds string (`3.5s`).
pub mod duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => ser.serialize_str(&encode_duration(*d)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        let raw: Option<String> = Option::deserialize(de)?;
        match raw {
            None => Ok(None),
            Some(s) => decode_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Render a duration in the wire form: fractional seconds with trailing
/// zeros trimmed, always suffixed with `s`.
pub fn encode_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let nanos = d.subsec_nanos();
    if nanos == 0 {
        return format!("{}s", secs);
    }
    let mut frac = format!("{:09}", nanos);
    while frac.ends_with('0') {
        frac.pop();
    }
    format!("{}.{}s", secs, frac)
}

/// Parse the wire form back into a `Duration`.
pub fn decode_duration(s: &str) -> Result<Duration, String> {
    let body = s
        .strip_suffix('s')
        .ok_or_else(|| format!("duration {:?} missing 's' suffix", s))?;
    let seconds: f64 = body
        .parse()
        .map_err(|e| format!("invalid duration {:?}: {}", s, e))?;
    if seconds < 0.0 {
        return Err(format!("negative duration {:?}", s));
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// A calendar date that may be partial: year-only, year+month, or a full
/// date. Absent components are omitted on the wire, matching the server's
/// convention of dropping zero-valued fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDate {
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u8>,
}

impl ApiDate {
    pub fn year(year: i32) -> Self {
        Self {
            year,
            month: None,
            day: None,
        }
    }

    pub fn year_month(year: i32, month: u8) -> Self {
        Self {
            year,
            month: Some(month),
            day: None,
        }
    }

    pub fn full(year: i32, month: u8, day: u8) -> Self {
        Self {
            year,
            month: Some(month),
            day: Some(day),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
    struct Wire {
        #[serde(
            default,
            with = "int64_str",
            skip_serializing_if = "Option::is_none"
        )]
        size_bytes: Option<i64>,
        #[serde(
            default,
            with = "duration_str",
            skip_serializing_if = "Option::is_none"
        )]
        ttl: Option<Duration>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expiration_date: Option<ApiDate>,
    }

    #[test]
    fn int64_round_trip() {
        let w = Wire {
            size_bytes: Some(9_007_199_254_740_993),
            ..Default::default()
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"size_bytes":"9007199254740993"}"#);
        let back: Wire = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn duration_round_trip() {
        for (d, wire) in [
            (Duration::from_secs(30), r#"{"ttl":"30s"}"#),
            (Duration::from_millis(3500), r#"{"ttl":"3.5s"}"#),
        ] {
            let w = Wire {
                ttl: Some(d),
                ..Default::default()
            };
            let json = serde_json::to_string(&w).unwrap();
            assert_eq!(json, wire);
            let back: Wire = serde_json::from_str(&json).unwrap();
            assert_eq!(back.ttl, Some(d));
        }
    }

    #[test]
    fn absent_fields_are_omitted() {
        let json = serde_json::to_string(&Wire::default()).unwrap();
        assert_eq!(json, "{}");
        let back: Wire = serde_json::from_str("{}").unwrap();
        assert_eq!(back, Wire::default());
    }

    #[test]
    fn partial_date_round_trip() {
        for (date, wire) in [
            (ApiDate::year(2024), r#"{"year":2024}"#),
            (ApiDate::year_month(2024, 6), r#"{"year":2024,"month":6}"#),
            (
                ApiDate::full(2024, 6, 15),
                r#"{"year":2024,"month":6,"day":15}"#,
            ),
        ] {
            let json = serde_json::to_string(&date).unwrap();
            assert_eq!(json, wire);
            let back: ApiDate = serde_json::from_str(&json).unwrap();
            assert_eq!(back, date);
        }
    }

    #[test]
    fn malformed_duration_rejected() {
        assert!(decode_duration("3.5").is_err());
        assert!(decode_duration("abcs").is_err());
        assert!(decode_duration("-1s").is_err());
    }
}
