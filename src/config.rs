// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Coordinator and participant settings, loadable from TOML.
//!
//! ```toml
//! expected_participants = 4
//! default_group = 42
//! wait_timeout_secs = 300
//! record_dir = "records"
//! ```

use crate::{
    errors::{InternalError, Result},
    parameters::{
        DEFAULT_EXPECTED_PARTICIPANTS, DEFAULT_GROUP, DEFAULT_SESSION_TIMEOUT,
        DEFAULT_WAIT_TIMEOUT,
    },
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

fn parse_toml<T: DeserializeOwned>(s: &str) -> Result<T> {
    toml::from_str(s).map_err(|e| InternalError::Config(e.to_string()))
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| InternalError::Config(format!("{}: {e}", path.display())))?;
    parse_toml(&contents)
}

/// Settings of the coordinating service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Number of contributions that complete a result or signing session.
    pub expected_participants: usize,
    /// Group used by callers that do not name one.
    pub default_group: u64,
    /// Deadline for each blocking call.
    pub wait_timeout_secs: u64,
    /// Where aggregate records are written. Records are only kept in memory
    /// when unset.
    pub record_dir: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            expected_participants: DEFAULT_EXPECTED_PARTICIPANTS,
            default_group: DEFAULT_GROUP,
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT.as_secs(),
            record_dir: None,
        }
    }
}

impl CoordinatorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = parse_toml(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = read_toml(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Participants are paired, so a session needs a positive even count.
    pub fn validate(&self) -> Result<()> {
        if self.expected_participants == 0 || self.expected_participants % 2 != 0 {
            return Err(InternalError::Config(format!(
                "expected_participants must be a positive even number, got {}",
                self.expected_participants
            )));
        }
        if self.wait_timeout_secs == 0 {
            return Err(InternalError::Config(
                "wait_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// [`CoordinatorConfig::wait_timeout_secs`] as a [`Duration`].
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Settings of a single participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParticipantSettings {
    /// The group this participant submits to.
    pub group: u64,
    /// Deadline for the share exchange with the paired peer.
    pub session_timeout_secs: u64,
    /// Deadline handed to each coordinator call.
    pub submit_timeout_secs: u64,
    /// Where the signing keypair is stored. A fresh keypair is drawn for
    /// every run when unset.
    pub keypair_path: Option<PathBuf>,
}

impl Default for ParticipantSettings {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT.as_secs(),
            submit_timeout_secs: DEFAULT_WAIT_TIMEOUT.as_secs(),
            keypair_path: None,
        }
    }
}

impl ParticipantSettings {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: Self = parse_toml(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings: Self = read_toml(path.as_ref())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject zero timeouts.
    pub fn validate(&self) -> Result<()> {
        if self.session_timeout_secs == 0 || self.submit_timeout_secs == 0 {
            return Err(InternalError::Config(
                "participant timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// [`ParticipantSettings::session_timeout_secs`] as a [`Duration`].
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// [`ParticipantSettings::submit_timeout_secs`] as a [`Duration`].
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() -> Result<()> {
        let config = CoordinatorConfig::from_toml_str("")?;
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.expected_participants, 4);
        assert_eq!(config.default_group, 42);
        assert_eq!(config.wait_timeout(), Duration::from_secs(300));

        let settings = ParticipantSettings::from_toml_str("")?;
        assert_eq!(settings.session_timeout(), Duration::from_secs(600));
        assert_eq!(settings.submit_timeout(), Duration::from_secs(300));
        assert_eq!(settings.keypair_path, None);
        Ok(())
    }

    #[test]
    fn test_partial_documents() -> Result<()> {
        let config = CoordinatorConfig::from_toml_str(
            "expected_participants = 6\nrecord_dir = \"/tmp/records\"\n",
        )?;
        assert_eq!(config.expected_participants, 6);
        assert_eq!(config.record_dir, Some(PathBuf::from("/tmp/records")));
        assert_eq!(config.default_group, DEFAULT_GROUP);

        let settings = ParticipantSettings::from_toml_str("group = 7")?;
        assert_eq!(settings.group, 7);
        Ok(())
    }

    #[test]
    fn test_invalid_counts_are_rejected() {
        for bad in ["expected_participants = 0", "expected_participants = 3"] {
            assert!(matches!(
                CoordinatorConfig::from_toml_str(bad),
                Err(InternalError::Config(_))
            ));
        }
        assert!(matches!(
            CoordinatorConfig::from_toml_str("unknown_key = 1"),
            Err(InternalError::Config(_))
        ));
        assert!(matches!(
            ParticipantSettings::from_toml_str("session_timeout_secs = 0"),
            Err(InternalError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "wait_timeout_secs = 5")?;
        let config = CoordinatorConfig::load(file.path())?;
        assert_eq!(config.wait_timeout(), Duration::from_secs(5));

        assert!(matches!(
            CoordinatorConfig::load(file.path().with_extension("missing")),
            Err(InternalError::Config(_))
        ));
        Ok(())
    }
}
