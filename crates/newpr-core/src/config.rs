//! Engine configuration (`.newpr/config.toml`).
//!
//! Defines the typed configuration consumed by every pipeline stage.
//! Missing fields use sensible defaults; a missing file is not an error.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::model::GroupId;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
///
/// Parsed from `.newpr/config.toml`. Missing file → all defaults (no
/// error).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Coupling rule table overrides.
    #[serde(default)]
    pub coupling: CouplingConfig,

    /// Classifier fallback behaviour.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Per-run resource settings.
    #[serde(default)]
    pub run: RunConfig,
}

// ---------------------------------------------------------------------------
// CouplingConfig
// ---------------------------------------------------------------------------

/// Coupling rule table overrides (§4.2's fixed rule list, made
/// extensible).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CouplingConfig {
    /// Dependency-manifest file paired with its lockfile family
    /// (default: `"package.json"` with the standard lockfile names).
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Lockfiles coupled to `manifest_file`.
    #[serde(default = "default_lockfiles")]
    pub lockfiles: Vec<String>,

    /// Singleton path for the global attributes file.
    #[serde(default = "default_attributes_file")]
    pub attributes_file: String,

    /// Filename prefix recognised as the top-level config family (matches
    /// `<prefix>.json` and `<prefix>.*.json`, e.g. `tsconfig.json`,
    /// `tsconfig.build.json`).
    #[serde(default = "default_config_family_prefix")]
    pub config_family_prefix: String,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            manifest_file: default_manifest_file(),
            lockfiles: default_lockfiles(),
            attributes_file: default_attributes_file(),
            config_family_prefix: default_config_family_prefix(),
        }
    }
}

fn default_manifest_file() -> String {
    "package.json".to_owned()
}

fn default_lockfiles() -> Vec<String> {
    vec![
        "package-lock.json".to_owned(),
        "yarn.lock".to_owned(),
        "pnpm-lock.yaml".to_owned(),
    ]
}

fn default_attributes_file() -> String {
    ".gitattributes".to_owned()
}

fn default_config_family_prefix() -> String {
    "tsconfig".to_owned()
}

// ---------------------------------------------------------------------------
// ClassifierConfig
// ---------------------------------------------------------------------------

/// Classifier fallback behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Group id assigned to paths the classifier leaves unclassified,
    /// or that its output cannot be parsed at all even after repair.
    #[serde(default = "default_fallback_group")]
    pub fallback_group: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fallback_group: default_fallback_group(),
        }
    }
}

fn default_fallback_group() -> String {
    "misc".to_owned()
}

impl ClassifierConfig {
    /// The fallback group id, parsed as a [`GroupId`].
    ///
    /// # Errors
    /// Returns an error if `fallback_group` fails [`GroupId`] validation.
    pub fn fallback_group_id(&self) -> Result<GroupId, crate::model::ValidationError> {
        GroupId::new(self.fallback_group.clone())
    }
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Per-run resource settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// How many commits (in C1) or groups (in C4/C5) to process between
    /// cancellation checks.
    #[serde(default = "default_cancel_poll_granularity")]
    pub cancel_poll_granularity: u32,

    /// Root directory under which each run creates its own scratch
    /// subdirectory, named by run ID. Defaults to the process temp
    /// directory.
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cancel_poll_granularity: default_cancel_poll_granularity(),
            scratch_root: default_scratch_root(),
        }
    }
}

const fn default_cancel_poll_granularity() -> u32 {
    1
}

fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("newpr")
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading an engine configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded, if known.
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Load configuration from a TOML file, layering over defaults.
    ///
    /// If the file does not exist, returns all defaults (not an error).
    ///
    /// # Errors
    /// Returns a [`ConfigError`] on I/O errors (other than not-found) or
    /// parse errors, with line-level detail when the TOML parser can
    /// locate the offending span.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start].chars().filter(|&c| c == '\n').count() + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }

    /// Load configuration using the layered convention: built-in
    /// defaults, then `<repo_root>/.newpr/config.toml` if present.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the repo-local file exists but fails
    /// to parse.
    pub fn load_layered(repo_root: &Path) -> Result<Self, ConfigError> {
        Self::load(&repo_root.join(".newpr").join("config.toml"))
    }
}
