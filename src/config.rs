use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const API_URL_ENV: &str = "HR_CHAT_API_URL";
const ACCESS_CODE_ENV: &str = "HR_CHAT_ACCESS_CODE";

fn default_api_url() -> String {
    "http://localhost:8000/ask".to_string()
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Sent as `X-Access-Code` with every request.
    #[serde(default)]
    pub access_code: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            api_url: default_api_url(),
            access_code: String::new(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 1100,
            height: 720,
            min_width: 640,
            min_height: 400,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            dir: default_export_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendConfig::default(),
            window: WindowConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Config {
    /// Reads `config.toml`, then applies environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(ACCESS_CODE_ENV).ok(),
        );
        config
    }

    fn load_file() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(
                        path = %config_path.display(),
                        error = %e,
                        "Error parsing config.toml, using defaults"
                    ),
                },
                Err(e) => tracing::warn!(
                    path = %config_path.display(),
                    error = %e,
                    "Error reading config.toml, using defaults"
                ),
            }
        } else if let Some(parent) = config_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        Config::default()
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_overrides(&mut self, api_url: Option<String>, access_code: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.backend.api_url = url;
        }
        if let Some(code) = access_code {
            self.backend.access_code = code;
        }
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/hr-chat")
        } else {
            PathBuf::from(".")
        }
    }
}
