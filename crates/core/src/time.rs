//! Timestamp helpers.
//!
//! Every timestamp that crosses the wire (action `createdAt`, snapshot and log
//! blob `time`) is an ISO-8601 UTC string with millisecond precision, e.g.
//! `2025-09-22T08:45:01.964Z`.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::errors::{Error, Result};

/// Current time truncated to the millisecond precision used on the wire.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Oldest possible watermark.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

pub fn to_iso(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC 3339 timestamp with any offset into UTC.
pub fn parse_iso(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::invalid_timestamp(value))
}

/// Serde adapter for `DateTime<Utc>` fields in wire format.
pub mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        time: &DateTime<Utc>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_iso(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_iso(&raw).map_err(serde::de::Error::custom)
    }

    /// Same as the parent module for optional fields. Pair with `#[serde(default)]`.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            time: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            match time {
                Some(time) => serializer.serialize_str(&super::super::to_iso(time)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|value| super::super::parse_iso(&value))
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }
}
