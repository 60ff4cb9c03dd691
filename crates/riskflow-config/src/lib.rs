use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RISKFLOW_DIR_NAME: &str = ".riskflow";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_API_KEY_ENV: &str = "RISKFLOW_API_KEY";
pub const DEFAULT_SHEET_NAME: &str = "Checklist";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ACCEPT_THRESHOLD: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendProviderKind {
    #[default]
    Http,
    Memory,
}

impl BackendProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Memory => "memory",
        }
    }
}

impl std::str::FromStr for BackendProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "http" => Ok(Self::Http),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "invalid backend provider '{other}', expected one of: http, memory"
            )),
        }
    }
}

/// Size of the impact × likelihood matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MatrixSize {
    #[serde(rename = "3x3")]
    ThreeByThree,
    #[default]
    #[serde(rename = "5x5")]
    FiveByFive,
}

impl MatrixSize {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThreeByThree => "3x3",
            Self::FiveByFive => "5x5",
        }
    }

    pub fn max_level(self) -> u8 {
        match self {
            Self::ThreeByThree => 3,
            Self::FiveByFive => 5,
        }
    }
}

impl std::str::FromStr for MatrixSize {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "3x3" => Ok(Self::ThreeByThree),
            "5x5" => Ok(Self::FiveByFive),
            other => Err(format!(
                "invalid matrix size '{other}', expected one of: 3x3, 5x5"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RiskflowConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: BackendProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_sheet")]
    pub sheet: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: BackendProviderKind::Http,
            endpoint: None,
            api_key_env: default_api_key_env(),
            sheet: default_sheet(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixConfig {
    #[serde(default)]
    pub size: MatrixSize,
    /// Scores at or below this value are acceptable without treatment.
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: u32,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            size: MatrixSize::FiveByFive,
            accept_threshold: DEFAULT_ACCEPT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn riskflow_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(RISKFLOW_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    riskflow_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<RiskflowConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(RiskflowConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: RiskflowConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<RiskflowConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(riskflow_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = RiskflowConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &RiskflowConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.backend.provider == BackendProviderKind::Http && config.backend.endpoint.is_none() {
        warnings.push(ConfigWarning {
            code: "backend_endpoint_missing",
            message: "backend.provider is \"http\" but backend.endpoint is not set".to_owned(),
        });
    }

    let max_level = u32::from(config.matrix.size.max_level());
    let max_score = max_level * max_level;
    if config.matrix.accept_threshold == 0 || config.matrix.accept_threshold > max_score {
        warnings.push(ConfigWarning {
            code: "accept_threshold_out_of_range",
            message: format!(
                "matrix.accept_threshold = {} is outside 1..={max_score} for a {} matrix",
                config.matrix.accept_threshold,
                config.matrix.size.as_str()
            ),
        });
    }

    if config.backend.timeout_secs == 0 {
        warnings.push(ConfigWarning {
            code: "backend_timeout_zero",
            message: "backend.timeout_secs is 0; requests will time out immediately".to_owned(),
        });
    }

    warnings
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_owned()
}

fn default_sheet() -> String {
    DEFAULT_SHEET_NAME.to_owned()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_accept_threshold() -> u32 {
    DEFAULT_ACCEPT_THRESHOLD
}

fn default_true() -> bool {
    true
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_config(mut config: RiskflowConfig) -> RiskflowConfig {
    config.backend.endpoint = normalize_optional(config.backend.endpoint.take());

    let api_key_env = config.backend.api_key_env.trim();
    if api_key_env.is_empty() {
        config.backend.api_key_env = default_api_key_env();
    } else {
        config.backend.api_key_env = api_key_env.to_owned();
    }

    let sheet = config.backend.sheet.trim();
    if sheet.is_empty() {
        config.backend.sheet = default_sheet();
    } else {
        config.backend.sheet = sheet.to_owned();
    }

    config
}
