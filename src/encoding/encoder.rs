//! Value → SQL literal encoder
//!
//! CrateDB does not accept bound parameters over its wire protocols, so every
//! value is inlined as a literal. The rules are:
//!
//! | Value       | Literal                                         |
//! |-------------|-------------------------------------------------|
//! | `Text`      | `'…'` with `'` doubled                          |
//! | `Number`    | minimal decimal rendering, `u64` as `i64` bits  |
//! | `Timestamp` | `'YYYY-MM-DDTHH:MM:SS[.fff]±HHMM'`              |
//! | `Object`    | `{"k" = v, …}` with keys sorted, `"` doubled    |
//!
//! Anything else is rejected with [`EncodeError::UnsupportedType`]. With a
//! key separator set, keys are sorted after `.` is replaced, and keys that
//! collide fail with [`EncodeError::DuplicateKey`].
//!
//! This builds executable SQL by concatenation. Untrusted text must be
//! validated upstream.

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike, Utc};
use std::borrow::Cow;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use super::value::{Number, Value};
use crate::error::{EncodeError, EncodeResult};

/// Zone used to render timestamps
///
/// One encoder renders every timestamp of a statement in the same zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZoneSetting {
    /// The system's local zone
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl FromStr for TimeZoneSetting {
    type Err = String;

    /// Accepts `local`, `utc`/`z`, or an offset such as `+05:30` / `-0800`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "local" => return Ok(TimeZoneSetting::Local),
            "utc" | "z" => return Ok(TimeZoneSetting::Utc),
            _ => {}
        }

        let (sign, rest) = match s.chars().next() {
            Some('+') => (1, &s[1..]),
            Some('-') => (-1, &s[1..]),
            _ => return Err(format!("invalid timezone '{}'", s)),
        };

        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid timezone offset '{}'", s));
        }

        let hours: i32 = digits[..2].parse().map_err(|e| format!("{}", e))?;
        let minutes: i32 = digits[2..].parse().map_err(|e| format!("{}", e))?;
        if minutes >= 60 {
            return Err(format!("invalid timezone offset '{}'", s));
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(TimeZoneSetting::Fixed)
            .ok_or_else(|| format!("timezone offset out of range '{}'", s))
    }
}

/// Stateless SQL literal encoder
///
/// Holds only immutable settings, so a single instance can be shared across
/// threads and reused for any number of statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoder {
    zone: TimeZoneSetting,
    key_separator: Option<String>,
}

impl Encoder {
    /// Encoder rendering timestamps in the local zone
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the timestamp zone
    pub fn with_zone(mut self, zone: TimeZoneSetting) -> Self {
        self.zone = zone;
        self
    }

    /// Builder: replace `.` in object keys with `separator`
    ///
    /// CrateDB treats dots in object keys as subscript paths.
    pub fn with_key_separator(mut self, separator: impl Into<String>) -> Self {
        self.key_separator = Some(separator.into());
        self
    }

    pub fn zone(&self) -> TimeZoneSetting {
        self.zone
    }

    pub fn key_separator(&self) -> Option<&str> {
        self.key_separator.as_deref()
    }

    /// Encode a value as a SQL literal
    pub fn encode(&self, value: &Value) -> EncodeResult<String> {
        let mut out = String::new();
        self.encode_into(value, &mut out)?;
        Ok(out)
    }

    /// Encode a value, appending the literal to `out`
    ///
    /// On error `out` may hold a partial literal; callers discard it.
    pub fn encode_into(&self, value: &Value, out: &mut String) -> EncodeResult<()> {
        match value {
            Value::Text(s) => push_quoted(out, s, '\''),
            Value::Number(n) => out.push_str(&encode_number(n)?),
            Value::Timestamp(ts) => {
                let text = self.format_timestamp(ts)?;
                push_quoted(out, &text, '\'');
            }
            Value::Object(map) => {
                out.push('{');
                for (i, (key, val)) in self.object_entries(map)?.into_iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    push_quoted(out, &key, '"');
                    out.push_str(" = ");
                    self.encode_into(val, out)?;
                }
                out.push('}');
            }
            Value::Bool(_) | Value::List(_) | Value::Null => {
                return Err(EncodeError::unsupported(value.type_name()));
            }
        }
        Ok(())
    }

    /// Object entries in output order, keyed by their rendered names
    ///
    /// Keys are sorted after the separator is applied; two keys that render
    /// the same are rejected.
    fn object_entries<'a>(
        &self,
        map: &'a BTreeMap<String, Value>,
    ) -> EncodeResult<BTreeMap<Cow<'a, str>, &'a Value>> {
        let sep = match &self.key_separator {
            Some(sep) => sep,
            None => return Ok(map.iter().map(|(k, v)| (Cow::Borrowed(k.as_str()), v)).collect()),
        };

        let mut entries = BTreeMap::new();
        for (key, val) in map {
            let key = if key.contains('.') {
                Cow::Owned(key.replace('.', sep))
            } else {
                Cow::Borrowed(key.as_str())
            };
            match entries.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(val);
                }
                Entry::Occupied(slot) => {
                    return Err(EncodeError::DuplicateKey(slot.key().to_string()));
                }
            }
        }
        Ok(entries)
    }

    /// Render a timestamp in this encoder's zone, unquoted
    ///
    /// Years outside `0..=9999` are rejected.
    pub fn format_timestamp(&self, ts: &DateTime<Utc>) -> EncodeResult<String> {
        match self.zone {
            TimeZoneSetting::Local => render_timestamp(&ts.with_timezone(&chrono::Local)),
            TimeZoneSetting::Utc => render_timestamp(ts),
            TimeZoneSetting::Fixed(offset) => render_timestamp(&ts.with_timezone(&offset)),
        }
    }
}

/// Encode a value with the default (local zone) encoder
pub fn encode(value: &Value) -> EncodeResult<String> {
    Encoder::default().encode(value)
}

/// Wrap `s` in `quote`, doubling every embedded `quote`
pub fn quote(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    push_quoted(&mut out, s, quote);
    out
}

fn push_quoted(out: &mut String, s: &str, quote: char) {
    out.push(quote);
    for c in s.chars() {
        if c == quote {
            out.push(quote);
        }
        out.push(c);
    }
    out.push(quote);
}

/// Render a number with its minimal decimal representation
pub fn encode_number(n: &Number) -> EncodeResult<String> {
    if n.is_non_finite() {
        return Err(EncodeError::NonFiniteNumber(format!("{:?}", n)));
    }

    Ok(match *n {
        Number::I32(v) => v.to_string(),
        Number::I64(v) => v.to_string(),
        Number::U32(v) => v.to_string(),
        // CrateDB's LONG is signed; keep the bit pattern
        Number::U64(v) => reinterpret_identity(v).to_string(),
        Number::F32(v) => v.to_string(),
        Number::F64(v) => v.to_string(),
    })
}

/// Reinterpret an unsigned 64-bit hash as the signed value with the same bits
///
/// Values of 2^63 and above come out negative.
pub fn reinterpret_identity(id: u64) -> i64 {
    id as i64
}

fn render_timestamp<Tz: TimeZone>(dt: &DateTime<Tz>) -> EncodeResult<String>
where
    Tz::Offset: Display,
{
    // %Y widens and signs years outside four digits
    if !(0..=9999).contains(&dt.year()) {
        return Err(EncodeError::TimestampOutOfRange(dt.to_rfc3339()));
    }

    let mut out = dt.format("%Y-%m-%dT%H:%M:%S").to_string();

    // Leap seconds report nanos >= 1e9
    let millis = (dt.nanosecond() % 1_000_000_000) / 1_000_000;
    if millis > 0 {
        let frac = format!("{:03}", millis);
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }

    out.push_str(&dt.format("%z").to_string());
    Ok(out)
}
