//! Canonical timestamp handling.
//!
//! In memory every timestamp is a `DateTime<Utc>`. The task backend speaks
//! zone-less wall-clock strings (`2025-01-01T10:00:00.000`); these are written
//! and read as UTC. Decoding also accepts full RFC 3339 so older snapshots and
//! zone-aware servers keep working.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Format used when sending timestamps to the backend.
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"];

pub fn to_wire(at: &DateTime<Utc>) -> String {
    at.format(WIRE_FORMAT).to_string()
}

/// Parse an RFC 3339 or zone-less timestamp; zone-less values are taken as UTC.
pub fn parse(input: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let input = input.trim();
    match DateTime::parse_from_rfc3339(input) {
        Ok(at) => Ok(at.with_timezone(&Utc)),
        Err(rfc_err) => NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
            .map(|naive| naive.and_utc())
            .ok_or(rfc_err),
    }
}

/// `#[serde(with = "…")]` adapter for required wire timestamps.
pub mod wire {
    use chrono::{DateTime, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&super::to_wire(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        super::parse(&raw).map_err(|e| D::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }
}

/// `#[serde(with = "…")]` adapter for nullable wire timestamps.
pub mod wire_option {
    use chrono::{DateTime, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &Option<DateTime<Utc>>, ser: S) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => ser.serialize_some(&super::to_wire(at)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(de)? {
            Some(raw) if !raw.trim().is_empty() => super::parse(&raw)
                .map(Some)
                .map_err(|e| D::Error::custom(format!("invalid timestamp {raw:?}: {e}"))),
            _ => Ok(None),
        }
    }
}
