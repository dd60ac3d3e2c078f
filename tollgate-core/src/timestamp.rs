//! Unix timestamp newtype used for channel `created_at`/`closed_at` fields.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Seconds since the Unix epoch.
///
/// Serialized as an integer on the wire. HTTP-facing DTOs that want
/// RFC 3339 strings convert at the boundary with [`Timestamp::to_rfc3339`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Wraps a raw Unix-epoch second count.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Builds a timestamp from the current wall-clock time.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set before the Unix epoch.
    #[must_use]
    pub fn now() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs();
        Self(secs)
    }

    /// Raw Unix-epoch second count.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// A minimal RFC 3339 rendering (`YYYY-MM-DDTHH:MM:SSZ`), good enough
    /// for display in HTTP responses without pulling in a date library for
    /// a single conversion.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        civil_from_unix(self.0)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Converts Unix seconds to a UTC civil `YYYY-MM-DDTHH:MM:SSZ` string using
/// Howard Hinnant's `civil_from_days` algorithm, avoiding a chrono dependency
/// for what is otherwise a read-only display field.
fn civil_from_unix(unix: u64) -> String {
    let days = i64::try_from(unix / 86400).unwrap_or(i64::MAX);
    let secs_of_day = unix % 86400;
    let (h, m, s) = (secs_of_day / 3600, (secs_of_day % 3600) / 60, secs_of_day % 60);

    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m_num = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m_num <= 2 { y + 1 } else { y };

    format!("{y:04}-{m_num:02}-{d:02}T{h:02}:{m:02}:{s:02}Z")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_renders_as_1970() {
        assert_eq!(Timestamp::from_secs(0).to_rfc3339(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn roundtrips_through_as_secs() {
        let t = Timestamp::from_secs(1_700_000_000);
        assert_eq!(Timestamp::from_secs(t.as_secs()), t);
    }
}
