//! Configuration types for docbatch

use crate::error::{Error, Result};
use crate::resilience::{
    DEFAULT_CONSECUTIVE_ERROR_THRESHOLD, DEFAULT_RATE_LIMIT_BACKOFF, DEFAULT_RATE_LIMIT_MARKERS,
    DEFAULT_RATE_LIMIT_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Main configuration for the [`Orchestrator`](crate::Orchestrator)
///
/// Every field has a default, so `Config::default()` works out of the box with
/// `InputFiles/` and `OutputFiles/` relative to the working directory.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Directory scanned for input documents (default: "InputFiles")
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Directory receiving one markdown artifact per input (default: "OutputFiles")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File name of the consolidated document inside `output_dir` (default: "Consolidated.md")
    #[serde(default = "default_consolidated_file")]
    pub consolidated_file: String,

    /// Input extensions picked up by a batch start, compared case-insensitively
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,

    /// Backoff and circuit-breaker policy
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Conversion service connection settings
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            consolidated_file: default_consolidated_file(),
            supported_extensions: default_supported_extensions(),
            resilience: ResilienceConfig::default(),
            conversion: ConversionConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Build a config from defaults overridden by environment variables
    ///
    /// Recognized variables: `INPUT_DIR`, `OUTPUT_DIR`, `CONSOLIDATED_FILE`,
    /// `CONVERSION_API_URL`, `CONVERSION_API_KEY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("INPUT_DIR") {
            config.input_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(name) = std::env::var("CONSOLIDATED_FILE") {
            config.consolidated_file = name;
        }
        if let Ok(url) = std::env::var("CONVERSION_API_URL") {
            config.conversion.base_url = url;
        }
        if let Ok(key) = std::env::var("CONVERSION_API_KEY")
            && !key.is_empty()
        {
            config.conversion.api_key = Some(key);
        }
        config
    }

    /// Full path of the consolidated document
    pub fn consolidated_path(&self) -> PathBuf {
        self.output_dir.join(&self.consolidated_file)
    }

    /// Whether `filename` carries one of the supported input extensions
    pub fn is_supported(&self, filename: &str) -> bool {
        let Some((_, ext)) = filename.rsplit_once('.') else {
            return false;
        };
        self.supported_extensions
            .iter()
            .any(|supported| supported.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// Reject settings the processor cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.resilience.rate_limit_threshold == 0 {
            return Err(Error::Config {
                message: "rate_limit_threshold must be at least 1".to_string(),
                key: Some("rate_limit_threshold".to_string()),
            });
        }
        if self.resilience.consecutive_error_threshold == 0 {
            return Err(Error::Config {
                message: "consecutive_error_threshold must be at least 1".to_string(),
                key: Some("consecutive_error_threshold".to_string()),
            });
        }
        if self.consolidated_file.is_empty()
            || self.consolidated_file.contains(['/', '\\'])
        {
            return Err(Error::Config {
                message: format!(
                    "consolidated_file must be a plain file name, got '{}'",
                    self.consolidated_file
                ),
                key: Some("consolidated_file".to_string()),
            });
        }
        if self.supported_extensions.is_empty() {
            return Err(Error::Config {
                message: "at least one supported extension is required".to_string(),
                key: Some("supported_extensions".to_string()),
            });
        }
        Ok(())
    }
}

/// Backoff and circuit-breaker configuration
///
/// The two failure counters are independent: `rate_limit_threshold` counts
/// rate-limited failures, `consecutive_error_threshold` counts failures of any
/// class. Both reset after a successful conversion.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ResilienceConfig {
    /// Rate-limited failures that abort the batch (default: 3)
    #[serde(default = "default_rate_limit_threshold")]
    pub rate_limit_threshold: u32,

    /// Consecutive failures of any class that abort the batch (default: 5)
    #[serde(default = "default_consecutive_error_threshold")]
    pub consecutive_error_threshold: u32,

    /// Whether a rate-limited failure also advances the consecutive-error counter (default: true)
    #[serde(default = "default_true")]
    pub rate_limits_count_toward_error_threshold: bool,

    /// Pause after a rate-limited failure (default: 30 seconds)
    #[serde(default = "default_rate_limit_backoff", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub rate_limit_backoff: Duration,

    /// Add up to 100% random jitter to the rate-limit backoff (default: false)
    #[serde(default)]
    pub backoff_jitter: bool,

    /// Pause between two files (default: 100 milliseconds)
    #[serde(default = "default_inter_file_delay", with = "millis_serde")]
    #[schema(value_type = u64)]
    pub inter_file_delay: Duration,

    /// Case-insensitive substrings marking an error as rate limited
    #[serde(default = "default_rate_limit_markers")]
    pub rate_limit_markers: Vec<String>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            rate_limit_threshold: default_rate_limit_threshold(),
            consecutive_error_threshold: default_consecutive_error_threshold(),
            rate_limits_count_toward_error_threshold: true,
            rate_limit_backoff: default_rate_limit_backoff(),
            backoff_jitter: false,
            inter_file_delay: default_inter_file_delay(),
            rate_limit_markers: default_rate_limit_markers(),
        }
    }
}

/// Conversion service connection settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversionConfig {
    /// Base URL of the parsing service (default: "http://localhost:8000/api/parsing")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Result flavour requested from the service (default: "markdown")
    #[serde(default = "default_result_type")]
    pub result_type: String,

    /// Interval between job status polls (default: 1000 milliseconds)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    #[schema(value_type = u64)]
    pub poll_interval: Duration,

    /// Upper bound for a single file's conversion (default: 600 seconds)
    #[serde(default = "default_conversion_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub timeout: Duration,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            result_type: default_result_type(),
            poll_interval: default_poll_interval(),
            timeout: default_conversion_timeout(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address the API server binds to (default: 127.0.0.1:5000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable the CORS layer (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins, "*" allows any (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("InputFiles")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("OutputFiles")
}

fn default_consolidated_file() -> String {
    "Consolidated.md".to_string()
}

fn default_supported_extensions() -> Vec<String> {
    ["pdf", "docx", "doc", "txt", "pptx", "xlsx", "epub"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_rate_limit_threshold() -> u32 {
    DEFAULT_RATE_LIMIT_THRESHOLD
}

fn default_consecutive_error_threshold() -> u32 {
    DEFAULT_CONSECUTIVE_ERROR_THRESHOLD
}

fn default_rate_limit_backoff() -> Duration {
    DEFAULT_RATE_LIMIT_BACKOFF
}

fn default_inter_file_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_rate_limit_markers() -> Vec<String> {
    DEFAULT_RATE_LIMIT_MARKERS
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_base_url() -> String {
    "http://localhost:8000/api/parsing".to_string()
}

fn default_result_type() -> String {
    "markdown".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_conversion_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
