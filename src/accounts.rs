//! Loads the account config file.
//!
//! The file is INI-style, one `[section]` per AWS account:
//!
//! ```ini
//! [production]
//! region = eu-west-1
//! aws_access_key_id = AKIA...
//! aws_secret_access_key = ...
//! ```
//!
//! Section names are lowercased while parsing and must not contain a `.`,
//! which would otherwise nest the section.
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use config::{Config, File, FileFormat};
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;

/// Static credentials taken from the config file.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

/// One account section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    /// Section name, used to name output files.
    pub name: String,
    pub region: String,

    /// `None` means the default AWS credential chain.
    pub credentials: Option<StaticCredentials>,

    /// Named profile for the default credential chain.
    pub profile: Option<String>,

    /// Endpoint override for every service client.
    pub endpoint_url: Option<String>,
}

/// Parsed config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsConfig {
    /// Accounts, ordered by section name.
    pub accounts: Vec<AccountConfig>,
}

/// Section as it appears on disk, before validation.
#[derive(Debug, Default, Deserialize)]
struct RawSection {
    region: Option<String>,
    aws_access_key_id: Option<String>,
    aws_secret_access_key: Option<String>,
    aws_session_token: Option<String>,
    profile: Option<String>,
    endpoint_url: Option<String>,
}

impl StatsConfig {
    /// Read and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound(path.to_owned()),
            _ => ConfigError::Read {
                path: path.to_owned(),
                source: e,
            },
        })?;
        let config = Self::parse(&contents, path)?;
        debug!(path=?path, accounts=config.accounts.len(), "loaded config");
        Ok(config)
    }

    /// Parse config file `contents`; `path` is only used for error messages.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        if let Some(name) = section_names(contents).find(|name| name.contains('.')) {
            return Err(ConfigError::DottedSection(name.to_owned()));
        }

        let malformed = |source| ConfigError::Malformed {
            path: PathBuf::from(path),
            source,
        };

        let sections: BTreeMap<String, RawSection> = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Ini))
            .build()
            .map_err(malformed)?
            .try_deserialize()
            .map_err(malformed)?;

        if sections.is_empty() {
            return Err(ConfigError::Empty(path.to_owned()));
        }

        let accounts = sections
            .into_iter()
            .map(|(name, raw)| raw.validate(name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { accounts })
    }
}

impl RawSection {
    fn validate(self, name: String) -> Result<AccountConfig, ConfigError> {
        let region = non_empty(self.region).ok_or_else(|| ConfigError::MissingKey {
            section: name.clone(),
            key: "region",
        })?;

        let credentials = match (
            non_empty(self.aws_access_key_id),
            non_empty(self.aws_secret_access_key),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
                access_key_id,
                secret_access_key,
                session_token: non_empty(self.aws_session_token),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialCredentials(name)),
        };

        Ok(AccountConfig {
            name,
            region,
            credentials,
            profile: non_empty(self.profile),
            endpoint_url: non_empty(self.endpoint_url),
        })
    }
}

/// Names of the `[section]` headers in `contents`.
fn section_names(contents: &str) -> impl Iterator<Item = &str> {
    contents.lines().filter_map(|line| {
        line.trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .map(str::trim)
    })
}

/// Blank values count as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
