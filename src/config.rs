use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    pub wizard: WizardConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the REST backend the wizard persists into
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend (e.g., "http://127.0.0.1:7010")
    pub base_url: String,
    /// Per-request timeout in milliseconds (default: 15000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_timeout_ms() -> u64 {
    15_000 // 15 seconds
}

fn default_token_env() -> String {
    "ESCROW_STEPPER_TOKEN".to_string()
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Read the bearer token from the configured environment variable
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.is_empty())
    }
}

/// Behaviour of the step wizard itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    /// How long a banner notice stays visible before it auto-dismisses (default: 5000)
    #[serde(default = "default_notice_ttl_ms")]
    pub notice_ttl_ms: u64,
    /// Banner text used when a save fails without a server-supplied message
    #[serde(default = "default_fallback_error")]
    pub fallback_error: String,
}

fn default_notice_ttl_ms() -> u64 {
    5_000 // 5 seconds
}

fn default_fallback_error() -> String {
    "Unable to save step. Please try again.".to_string()
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            notice_ttl_ms: default_notice_ttl_ms(),
            fallback_error: default_fallback_error(),
        }
    }
}

/// In-memory sandbox backend used for local development
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_port")]
    pub port: u16,
}

fn default_sandbox_port() -> u16 {
    7010
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            port: default_sandbox_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding user-defined flow definitions
    pub flows: String,
    /// Directory for logs and other local state
    pub state: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to write logs to a file under the state directory instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

impl Config {
    /// Path to the project-local config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".escrow-stepper/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the tool works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        // User config in ~/.config/escrow-stepper/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("escrow-stepper").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with ESCROW_STEPPER prefix
        builder = builder.add_source(
            config::Environment::with_prefix("ESCROW_STEPPER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .escrow-stepper/config.toml
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::project_config_path())
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(config_path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    /// Get absolute path to the user flows directory
    pub fn flows_path(&self) -> PathBuf {
        absolutize(&self.paths.flows)
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        absolutize(&self.paths.state)
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }
}

fn absolutize(path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: format!("http://127.0.0.1:{}", default_sandbox_port()),
                timeout_ms: default_timeout_ms(),
                token_env: default_token_env(),
            },
            wizard: WizardConfig::default(),
            sandbox: SandboxConfig::default(),
            paths: PathsConfig {
                flows: ".escrow-stepper/flows".to_string(), // Relative to cwd
                state: ".escrow-stepper".to_string(),
            },
            logging: LoggingConfig::default(),
        }
    }
}
