//! Time and duration serialization helpers
//!
//! Event timestamps are stored as RFC 3339 strings carrying every
//! sub-second digit and the original UTC offset. Durations are stored as a
//! signed count of nanoseconds.

use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};

/// The Unix epoch at offset `+00:00`, used when a record has no time
pub fn epoch() -> DateTime<FixedOffset> {
    DateTime::<Utc>::default().into()
}

/// Format a timestamp the way it is persisted
///
/// `AutoSi` picks 0, 3, 6 or 9 fractional digits, so nanoseconds survive.
pub fn format_rfc3339(t: &DateTime<FixedOffset>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Check if a duration is zero (for skip_serializing_if)
pub fn is_zero_duration(d: &Duration) -> bool {
    *d == Duration::zero()
}

/// Serde adapter for `DateTime<FixedOffset>` as RFC 3339 text
pub mod rfc3339 {
    use chrono::{DateTime, FixedOffset};
    use serde::de::{self, Deserialize, Deserializer};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(t: &DateTime<FixedOffset>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_rfc3339(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<FixedOffset>, D::Error> {
        let text = <std::borrow::Cow<'de, str>>::deserialize(d)?;
        DateTime::parse_from_rfc3339(&text)
            .map_err(|e| de::Error::custom(format!("invalid time {:?}: {}", text, e)))
    }
}

/// Serde adapter for `chrono::Duration` as integer nanoseconds
pub mod nanos {
    use chrono::Duration;
    use serde::de::{Deserialize, Deserializer};
    use serde::ser::{Error, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let nanos = d
            .num_nanoseconds()
            .ok_or_else(|| S::Error::custom("duration does not fit in i64 nanoseconds"))?;
        s.serialize_i64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        i64::deserialize(d).map(Duration::nanoseconds)
    }
}
