//! Caller-side copy of the stored credentials.

use super::storage::CredentialStore;
use super::{format_round_trip, is_storable, min_expiration, CredentialKey, FRACTION_DIGITS};
use crate::clock::Clock;
use crate::error::{ConfigError, ConfigResult};
use chrono::{DateTime, FixedOffset, SubsecRound, TimeDelta};
use serde::Deserialize;
use std::fmt;
use tracing::info;

/// Result of an OAuth2 token exchange or refresh.
///
/// Field names follow the standard token response body, so the body can be
/// deserialized directly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TokenResult {
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// The six credential fields, staged in memory between a load and a save.
///
/// Mutating a snapshot never touches the store; [`save`](Self::save) writes
/// every field, so fields the caller did not change are rewritten with the
/// values loaded earlier. Two snapshots saved one after another therefore
/// resolve as last writer wins across all fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialSnapshot {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Stored with 100ns precision; finer digits are dropped on save.
    pub expiration_date_time: DateTime<FixedOffset>,
}

impl Default for CredentialSnapshot {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
            expiration_date_time: min_expiration(),
        }
    }
}

impl CredentialSnapshot {
    /// Reads all six attributes in one consistent view of the store.
    pub fn load_from_store(store: &CredentialStore) -> ConfigResult<Self> {
        store.read(|reader| -> ConfigResult<Self> {
            Ok(Self {
                client_id: reader.value(CredentialKey::ClientId),
                client_secret: reader.value(CredentialKey::ClientSecret),
                redirect_uri: reader.value(CredentialKey::RedirectUri),
                access_token: reader.value(CredentialKey::AccessToken),
                refresh_token: reader.value(CredentialKey::RefreshToken),
                expiration_date_time: reader.expiration_date_time()?,
            })
        })
    }

    /// Writes all six fields and saves the store as one batch.
    pub fn save(&self, store: &CredentialStore) -> ConfigResult<()> {
        let expiration = format_round_trip(&self.expiration_date_time)?;
        store.update_and_save(|writer| {
            writer.set_value(CredentialKey::ClientId, &self.client_id);
            writer.set_value(CredentialKey::ClientSecret, &self.client_secret);
            writer.set_value(CredentialKey::RedirectUri, &self.redirect_uri);
            writer.set_value(CredentialKey::AccessToken, &self.access_token);
            writer.set_value(CredentialKey::RefreshToken, &self.refresh_token);
            writer.set_value(CredentialKey::ExpirationDateTime, &expiration);
        })
    }

    /// Records a new token pair and its expiration, then saves.
    ///
    /// A missing token (or missing fields) clears the corresponding values and
    /// expires the credentials at `clock.now()`. A lifetime that lands outside
    /// the storable years is rejected before anything is written. The snapshot
    /// only changes if the save succeeds.
    pub fn apply_token(
        &mut self,
        store: &CredentialStore,
        token: Option<&TokenResult>,
        clock: &dyn Clock,
    ) -> ConfigResult<()> {
        let expires_in = token.and_then(|t| t.expires_in).unwrap_or(0);
        let expiration = TimeDelta::try_seconds(expires_in)
            .and_then(|lifetime| clock.now().checked_add_signed(lifetime))
            .filter(is_storable)
            .ok_or(ConfigError::ExpirationOutOfRange { expires_in })?;

        let updated = Self {
            access_token: token
                .and_then(|t| t.access_token.clone())
                .unwrap_or_default(),
            refresh_token: token
                .and_then(|t| t.refresh_token.clone())
                .unwrap_or_default(),
            expiration_date_time: expiration.trunc_subsecs(FRACTION_DIGITS),
            ..self.clone()
        };

        updated.save(store)?;
        *self = updated;

        info!(
            expires_at = %self.expiration_date_time,
            has_refresh_token = !self.refresh_token.is_empty(),
            "Stored refreshed access token"
        );
        Ok(())
    }

    /// True once `now` has reached the stored expiration.
    pub fn is_expired_at(&self, now: &DateTime<FixedOffset>) -> bool {
        *now >= self.expiration_date_time
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "********"
    }
}

impl fmt::Display for CredentialSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "   ------------ [ CredentialSnapshot ] -------------")?;
        writeln!(f, "     ClientId            : {}", self.client_id)?;
        writeln!(f, "     ClientSecret        : {}", mask(&self.client_secret))?;
        writeln!(f, "     RedirectUri         : {}", self.redirect_uri)?;
        writeln!(f, "     AccessToken         : {}", mask(&self.access_token))?;
        writeln!(f, "     RefreshToken        : {}", mask(&self.refresh_token))?;
        writeln!(
            f,
            "     ExpirationDateTime  : {}",
            format_round_trip(&self.expiration_date_time)
                .unwrap_or_else(|_| self.expiration_date_time.to_string())
        )?;
        writeln!(f, "   -------------------------------------------------")
    }
}
