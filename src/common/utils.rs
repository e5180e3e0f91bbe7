//! Utility functions for ensemble-supervisor

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::time::Duration;

/// Characters that cannot appear inside a single ZooKeeper node name
const NODE_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Encode an arbitrary identity (e.g. an Exhibitor URL) as one path segment
pub fn encode_node_name(identity: &str) -> String {
    utf8_percent_encode(identity, NODE_ENCODE_SET).to_string()
}

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h"). A bare number is seconds.
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else if s.ends_with(|c: char| c.is_ascii_alphabetic()) {
        s.split_at(s.len() - 1)
    } else {
        (s, "s")
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let scale = match unit {
        "ms" => return Ok(Duration::from_millis(num)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    num.checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(|| crate::Error::InvalidConfig(format!("duration out of range: {}", s)))
}

/// Render a duration in the same notation `parse_duration` accepts
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        format!("{}ms", ms)
    } else {
        format!("{}s", d.as_secs())
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Text(String),
    Secs(u64),
}

impl DurationRepr {
    fn into_duration(self) -> crate::Result<Duration> {
        match self {
            DurationRepr::Text(s) => parse_duration(&s),
            DurationRepr::Secs(n) => Ok(Duration::from_secs(n)),
        }
    }
}

/// Serde adapter for `Duration` fields written as "30s" or plain seconds
pub mod serde_duration {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        DurationRepr::deserialize(d)?
            .into_duration()
            .map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional `Duration` fields
pub mod serde_opt_duration {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<DurationRepr>::deserialize(d)?
            .map(DurationRepr::into_duration)
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
