use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use super::ConfigError;

/// Configuration values read from the process environment.
///
/// Every field is optional; defaults are applied during merging.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,

    pub gemini_api_key: Option<String>,
    pub gemini_live_url: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_voice: Option<String>,
    pub gemini_response_modality: Option<String>,
    pub system_instruction: Option<String>,
    pub upstream_connect_timeout_seconds: Option<u64>,

    pub cors_allowed_origins: Option<String>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl EnvConfig {
    /// Read all supported variables.
    ///
    /// Blank values are treated as unset.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_string("HOST"),
            port: env_parse("PORT")?,
            tls_cert_path: env_string("TLS_CERT_PATH").map(PathBuf::from),
            tls_key_path: env_string("TLS_KEY_PATH").map(PathBuf::from),
            static_dir: env_string("STATIC_DIR").map(PathBuf::from),

            gemini_api_key: env_string("GEMINI_API_KEY"),
            gemini_live_url: env_string("GEMINI_LIVE_URL"),
            gemini_model: env_string("GEMINI_MODEL"),
            gemini_voice: env_string("GEMINI_VOICE"),
            gemini_response_modality: env_string("GEMINI_RESPONSE_MODALITY"),
            system_instruction: env_string("SYSTEM_INSTRUCTION"),
            upstream_connect_timeout_seconds: env_parse("UPSTREAM_CONNECT_TIMEOUT_SECS")?,

            cors_allowed_origins: env_string("CORS_ALLOWED_ORIGINS"),
            max_websocket_connections: env_parse("MAX_WEBSOCKET_CONNECTIONS")?,
            max_connections_per_ip: env_parse("MAX_CONNECTIONS_PER_IP")?,
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    env_string(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_blank_values_are_unset() {
        unsafe {
            env::set_var("GEMINI_MODEL", "   ");
        }
        assert!(env_string("GEMINI_MODEL").is_none());
        unsafe {
            env::remove_var("GEMINI_MODEL");
        }
    }

    #[test]
    #[serial]
    fn test_parse_error_names_key() {
        unsafe {
            env::set_var("MAX_CONNECTIONS_PER_IP", "lots");
        }
        match env_parse::<u32>("MAX_CONNECTIONS_PER_IP") {
            Err(ConfigError::InvalidValue { key, message }) => {
                assert_eq!(key, "MAX_CONNECTIONS_PER_IP");
                assert!(message.contains("lots"));
            }
            _ => panic!("Expected InvalidValue"),
        }
        unsafe {
            env::remove_var("MAX_CONNECTIONS_PER_IP");
        }
    }

    #[test]
    #[serial]
    fn test_values_are_trimmed() {
        unsafe {
            env::set_var("PORT", " 8123 ");
        }
        assert_eq!(env_parse::<u16>("PORT").unwrap(), Some(8123));
        unsafe {
            env::remove_var("PORT");
        }
    }
}
