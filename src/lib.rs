// Error taxonomy shared by every component
pub mod error;

// Configuration file location (env override + directory heuristic)
pub mod config;

// Attribute document collaborator (XML config file)
pub mod document;

// Credential store singleton and caller-side snapshots
pub mod credentials;

// Time source for expiration arithmetic
pub mod clock;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{resolve_config_path, ConfigLocator, CONFIG_FILE_NAME, CONFIG_PATH_ENV};
pub use credentials::{
    CredentialKey, CredentialSnapshot, CredentialStore, StoreCell, TokenResult,
};
pub use error::{ConfigError, ConfigResult};
