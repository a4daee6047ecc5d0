use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Rewrite,
    #[default]
    ResolveInPlace,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "rewrite" => Ok(Mode::Rewrite),
            "resolve-in-place" => Ok(Mode::ResolveInPlace),
            other => Err(format!(
                "unknown mode '{}', expected 'rewrite' or 'resolve-in-place'",
                other
            )),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Rewrite => "rewrite",
            Mode::ResolveInPlace => "resolve-in-place",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Options {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub mode: Mode,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            mode: Mode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PreflightEntry {
    pub selector: String,
    pub declarations: String,
    #[serde(default)]
    pub global: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub utilities: IndexMap<String, String>,
    #[serde(default)]
    pub preflight: Vec<PreflightEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("built-in {table} table is malformed: {source}")]
    Builtin {
        table: &'static str,
        source: toml::de::Error,
    },
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn default_prefix() -> String {
    "windi-".to_string()
}
