use std::path::PathBuf;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

/// Default backend address, matching the development server.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Which send transport the dispatcher uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Incremental token frames folded into the pending message.
    #[default]
    Streaming,
    /// One request, one complete answer.
    Buffered,
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("failed to load configuration: {source}"))]
    ExtractConfig {
        stage: &'static str,
        source: figment::Error,
    },
}

/// Runtime configuration, layered: built-in defaults, then the user's
/// TOML file, then `DOCCHAT_*` environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    pub base_url: String,
    pub transport: TransportMode,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            transport: TransportMode::default(),
        }
    }
}

impl ChatConfig {
    /// `~/.config/docchat/config.toml` (platform equivalent).
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("docchat").join("config.toml"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_config_path())
    }

    /// Loads with an explicit (optional, may be absent on disk) TOML path.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed("DOCCHAT_"))
            .extract()
            .context(ExtractConfigSnafu {
                stage: "extract-config",
            })
    }
}
