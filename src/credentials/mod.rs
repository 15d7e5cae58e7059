//! OAuth2 client credentials persisted in the configuration file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialSnapshot                 │
//! │  - caller-owned copy of the six fields   │
//! │  - load / save / apply_token             │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!     (batched write)      (consistent read)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore (one per process)  │
//! │  - RwLock around the attribute document  │
//! │  - explicit save to the resolved path    │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       apiclient.config (XML)             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use apiclient_config::{CredentialSnapshot, CredentialStore, SystemClock, TokenResult};
//!
//! # fn main() -> apiclient_config::ConfigResult<()> {
//! let store = CredentialStore::global()?;
//! let mut settings = CredentialSnapshot::load_from_store(&store)?;
//!
//! let token = TokenResult {
//!     access_token: Some("new-access".to_string()),
//!     refresh_token: Some("new-refresh".to_string()),
//!     expires_in: Some(1800),
//! };
//! settings.apply_token(&store, Some(&token), &SystemClock)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! Access is serialized within one process only. Two processes saving the
//! same file concurrently overwrite each other; the last writer wins.

use crate::error::{ConfigError, ConfigResult};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Utc};
use std::ops::RangeInclusive;

mod snapshot;
mod storage;

pub use snapshot::{CredentialSnapshot, TokenResult};
pub use storage::{CredentialStore, StoreCell, StoreReader, StoreWriter};

/// The six attributes the store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    ClientId,
    ClientSecret,
    RedirectUri,
    AccessToken,
    RefreshToken,
    ExpirationDateTime,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 6] = [
        CredentialKey::ClientId,
        CredentialKey::ClientSecret,
        CredentialKey::RedirectUri,
        CredentialKey::AccessToken,
        CredentialKey::RefreshToken,
        CredentialKey::ExpirationDateTime,
    ];

    /// Attribute name used in the configuration file.
    pub fn attribute(self) -> &'static str {
        match self {
            CredentialKey::ClientId => "ApiClient.ClientId",
            CredentialKey::ClientSecret => "ApiClient.ClientSecret",
            CredentialKey::RedirectUri => "ApiClient.RedirectUri",
            CredentialKey::AccessToken => "ApiClient.AccessToken",
            CredentialKey::RefreshToken => "ApiClient.RefreshToken",
            CredentialKey::ExpirationDateTime => "ApiClient.ExpirationDateTime",
        }
    }
}

/// Expiration reported when none is stored.
pub fn min_expiration() -> DateTime<FixedOffset> {
    DateTime::<Utc>::MIN_UTC.into()
}

/// Fractional-second digits kept by the round-trip format (100ns ticks).
pub const FRACTION_DIGITS: u16 = 7;

/// Years the round-trip format can write and read back.
pub const STORABLE_YEARS: RangeInclusive<i32> = 0..=9999;

/// True when `instant` formats to a value [`parse_round_trip`] accepts.
pub fn is_storable(instant: &DateTime<FixedOffset>) -> bool {
    *instant == min_expiration() || STORABLE_YEARS.contains(&instant.year())
}

/// Formats an instant as `2024-03-01T09:15:00.1234567+01:00` (or `Z` for UTC).
///
/// The minimum instant encodes as an empty string so it reads back as
/// [`min_expiration`]. Instants outside [`STORABLE_YEARS`] are rejected.
pub fn format_round_trip(instant: &DateTime<FixedOffset>) -> ConfigResult<String> {
    if *instant == min_expiration() {
        return Ok(String::new());
    }
    if !is_storable(instant) {
        return Err(ConfigError::UnstorableExpiration {
            instant: instant.to_string(),
        });
    }

    let ticks = instant.timestamp_subsec_nanos().min(999_999_999) / 100;
    let offset = if instant.offset().local_minus_utc() == 0 {
        "Z".to_string()
    } else {
        instant.format("%:z").to_string()
    };
    Ok(format!(
        "{}.{:07}{}",
        instant.format("%Y-%m-%dT%H:%M:%S"),
        ticks,
        offset
    ))
}

/// Parses a round-trip timestamp. Empty input is the minimum instant.
///
/// Values without an offset are read as UTC.
pub fn parse_round_trip(value: &str) -> ConfigResult<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(min_expiration());
    }

    DateTime::parse_from_rfc3339(value).or_else(|source| {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc().into())
            .map_err(|_| ConfigError::InvalidExpiration {
                value: value.to_string(),
                source,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_attribute_names_are_namespaced() {
        for key in CredentialKey::ALL {
            assert!(key.attribute().starts_with("ApiClient."));
        }
        assert_eq!(
            CredentialKey::ExpirationDateTime.attribute(),
            "ApiClient.ExpirationDateTime"
        );
    }

    #[test]
    fn test_format_utc_uses_z_and_seven_digits() {
        let instant: DateTime<FixedOffset> = Utc
            .with_ymd_and_hms(2024, 3, 1, 9, 15, 0)
            .unwrap()
            .with_nanosecond(123_456_700)
            .unwrap()
            .into();
        assert_eq!(format_round_trip(&instant).unwrap(), "2024-03-01T09:15:00.1234567Z");
    }

    #[test]
    fn test_format_keeps_local_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let instant = offset.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap();
        assert_eq!(
            format_round_trip(&instant).unwrap(),
            "2024-03-01T09:15:00.0000000+02:00"
        );
    }

    #[test]
    fn test_round_trip_utc_and_offset() {
        let utc: DateTime<FixedOffset> = Utc
            .with_ymd_and_hms(2023, 12, 31, 23, 59, 59)
            .unwrap()
            .with_nanosecond(999_999_900)
            .unwrap()
            .into();
        let offset = FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap();
        let local = offset
            .with_ymd_and_hms(2024, 7, 4, 12, 0, 1)
            .unwrap()
            .with_nanosecond(500_000_000)
            .unwrap();

        for instant in [utc, local] {
            let parsed = parse_round_trip(&format_round_trip(&instant).unwrap()).unwrap();
            assert_eq!(parsed, instant);
            assert_eq!(parsed.offset(), instant.offset());
        }
    }

    #[test]
    fn test_format_truncates_below_ticks() {
        let instant: DateTime<FixedOffset> = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap()
            .into();
        let parsed = parse_round_trip(&format_round_trip(&instant).unwrap()).unwrap();
        assert_eq!(parsed.timestamp_subsec_nanos(), 123_456_700);
    }

    #[test]
    fn test_years_beyond_four_digits_are_rejected() {
        let far: DateTime<FixedOffset> = Utc
            .with_ymd_and_hms(11530, 8, 16, 5, 20, 0)
            .unwrap()
            .into();
        assert!(!is_storable(&far));
        assert!(matches!(
            format_round_trip(&far),
            Err(ConfigError::UnstorableExpiration { .. })
        ));

        let last: DateTime<FixedOffset> = Utc
            .with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
            .unwrap()
            .into();
        let parsed = parse_round_trip(&format_round_trip(&last).unwrap()).unwrap();
        assert_eq!(parsed, last);
    }

    #[test]
    fn test_empty_parses_to_minimum() {
        assert_eq!(parse_round_trip("").unwrap(), min_expiration());
        assert_eq!(parse_round_trip("  ").unwrap(), min_expiration());
        assert_eq!(format_round_trip(&min_expiration()).unwrap(), "");
    }

    #[test]
    fn test_value_without_offset_is_utc() {
        let parsed = parse_round_trip("2024-02-29T10:00:00.5000000").unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        assert_eq!(parsed.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_corrupted_value_is_an_error() {
        let err = parse_round_trip("next tuesday").unwrap_err();
        match err {
            ConfigError::InvalidExpiration { value, .. } => assert_eq!(value, "next tuesday"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
