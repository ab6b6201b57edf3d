use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::log::info;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Shown to the user whenever a generated reply can't be produced.
pub const DEFAULT_FALLBACK_REPLY: &str = "大腦還在暖身中，請再試一次！";

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[cfg(feature = "sentry")]
    pub sentry: Option<SentryConfig>,

    #[serde(default)]
    pub http: HTTPConfig,

    #[serde(default)]
    pub line: LineConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub persona: PersonaConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}
impl AppConfig {
    /// An explicitly given path must exist, the default `config.toml` is optional.
    pub fn load(config_filepath: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_filepath {
            Some(path) => path,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !path.exists() {
                    info!("No {DEFAULT_CONFIG_PATH} found, using built-in defaults");
                    return Ok(AppConfig::default());
                }
                path
            }
        };

        let config_content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;

        Self::parse(&config_content)
            .with_context(|| format!("Failed to load config file: {config_path:?}"))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: AppConfig =
            toml::from_str(content).context("Failed to parse TOML config")?;

        config.persona.resolve_system_instruction()?;
        Ok(config)
    }
}

/// Credentials for both upstream APIs, always taken from the environment.
pub struct Secrets {
    pub channel_access_token: String,
    pub channel_secret: String,
    pub gemini_api_key: String,
}
impl Secrets {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            channel_access_token: require_env("LINE_CHANNEL_ACCESS_TOKEN")?,
            channel_secret: require_env("LINE_CHANNEL_SECRET")?,
            gemini_api_key: require_env("GEMINI_API_KEY")?,
        })
    }
}

fn require_env(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("Missing required {name} environment variable!"),
    }
}

#[cfg(feature = "sentry")]
#[derive(Debug, Deserialize)]
pub struct SentryConfig {
    pub dsn: String,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub server_name: Option<String>,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_true")]
    pub send_default_pii: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HTTPConfig {
    #[serde(default = "default_http_address")]
    pub address: SocketAddr,

    /// Mounts the `/sys/*` routes, which require RELAY_HTTP_AUTH_TOKEN.
    #[serde(default)]
    pub admin_enabled: bool,

    #[serde(default)]
    pub tls: Option<TLSConfig>,
}
impl Default for HTTPConfig {
    fn default() -> Self {
        Self {
            address: default_http_address(),
            admin_enabled: false,
            tls: None,
        }
    }
}

#[cfg_attr(
    not(any(feature = "tls-rustls", feature = "tls-native")),
    allow(dead_code)
)]
#[derive(Debug, Clone, Deserialize)]
pub struct TLSConfig {
    #[serde(deserialize_with = "deserialize_existing_file")]
    pub certificate_path: PathBuf,

    #[serde(deserialize_with = "deserialize_existing_file")]
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineConfig {
    #[serde(default = "default_line_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_line_request_timeout")]
    pub request_timeout_secs: u64,
}
impl Default for LineConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_line_api_base_url(),
            request_timeout_secs: default_line_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_gemini_request_timeout")]
    pub request_timeout_secs: u64,
}
impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_gemini_api_base_url(),
            request_timeout_secs: default_gemini_request_timeout(),
        }
    }
}

/// How the bot talks. Read once at startup and never changed afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub system_instruction: Option<String>,

    /// Alternative to `system_instruction` for longer prompts.
    #[serde(deserialize_with = "deserialize_optional_existing_file")]
    #[serde(default)]
    pub system_instruction_path: Option<PathBuf>,

    #[serde(default)]
    pub generation: GenerationParams,

    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}
impl PersonaConfig {
    fn resolve_system_instruction(&mut self) -> Result<()> {
        let Some(path) = self.system_instruction_path.as_ref() else {
            return Ok(());
        };
        if self.system_instruction.is_some() {
            bail!("Only one of persona.system_instruction and persona.system_instruction_path may be set!");
        }

        let instruction = fs::read_to_string(path)
            .with_context(|| format!("Failed to read persona system instruction: {path:?}"))?;
        self.system_instruction = Some(instruction.trim().to_string());
        Ok(())
    }
}
impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_instruction: None,
            system_instruction_path: None,
            generation: GenerationParams::default(),
            fallback_reply: default_fallback_reply(),
        }
    }
}

/// Unset values are left to the provider's defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerationParams {
    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub top_p: Option<f32>,

    #[serde(default)]
    pub top_k: Option<u32>,

    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Upper bound on a single completion call, after which the fallback reply is sent.
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_secs: u64,

    /// Events from one webhook call handled at the same time.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}
impl RelayConfig {
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }
}
impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            completion_timeout_secs: default_completion_timeout(),
            concurrency_limit: default_concurrency_limit(),
        }
    }
}

fn default_http_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 3000)
}
fn default_line_api_base_url() -> String {
    "https://api.line.me".to_string()
}
fn default_line_request_timeout() -> u64 {
    10
}
fn default_gemini_api_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_gemini_request_timeout() -> u64 {
    30
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_fallback_reply() -> String {
    DEFAULT_FALLBACK_REPLY.to_string()
}
fn default_completion_timeout() -> u64 {
    25
}
fn default_concurrency_limit() -> usize {
    10
}

#[cfg(feature = "sentry")]
fn default_true() -> bool {
    true
}

fn deserialize_existing_file<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let path = PathBuf::deserialize(deserializer)?;
    if !path.exists() {
        return Err(serde::de::Error::custom(format!(
            "File does not exist: {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(serde::de::Error::custom(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }
    Ok(path)
}

fn deserialize_optional_existing_file<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let path_opt = Option::<String>::deserialize(deserializer)?;
    match path_opt {
        Some(path_str) => {
            let path_deserializer = serde::de::value::StringDeserializer::new(path_str);
            Ok(Some(deserialize_existing_file(path_deserializer)?))
        }
        None => Ok(None),
    }
}
