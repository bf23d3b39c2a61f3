use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const DEFAULT_CREDENTIAL_SERVICE: &str = "daytarget.gemini";
pub const DEFAULT_AI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 10_000;

/// Where the Gemini API key lives between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialBackend {
    /// The workspace SQLite database, under `@ai_api_key`.
    #[default]
    Database,
    /// The OS keyring, under `credentialService`.
    Keyring,
}

impl CredentialBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Keyring => "keyring",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub app_name: String,
    pub timezone: Tz,
    pub ai_endpoint: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub credential_backend: CredentialBackend,
    pub credential_service: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "Target".to_string(),
            timezone: Tz::UTC,
            ai_endpoint: DEFAULT_AI_ENDPOINT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            credential_backend: CredentialBackend::Database,
            credential_service: DEFAULT_CREDENTIAL_SERVICE.to_string(),
        }
    }
}

fn default_app_json() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": "Target",
        "timezone": "UTC",
        "aiEndpoint": DEFAULT_AI_ENDPOINT,
        "temperature": DEFAULT_TEMPERATURE,
        "maxOutputTokens": DEFAULT_MAX_OUTPUT_TOKENS,
        "credentialBackend": CredentialBackend::Database.as_str(),
        "credentialService": DEFAULT_CREDENTIAL_SERVICE
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_json())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let app = read_config(&path)?;
    parse_app_config(&app, &path)
}

fn parse_app_config(app: &serde_json::Value, path: &Path) -> Result<AppConfig, InfraError> {
    let defaults = AppConfig::default();

    let timezone = match optional_str(app, "timezone") {
        Some(name) => name.parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!(
                "invalid timezone '{name}' in {}: {error}",
                path.display()
            ))
        })?,
        None => defaults.timezone,
    };

    let temperature = app
        .get("temperature")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(defaults.temperature);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(InfraError::InvalidConfig(format!(
            "temperature must be within 0..=2 in {}",
            path.display()
        )));
    }

    let max_output_tokens = app
        .get("maxOutputTokens")
        .and_then(serde_json::Value::as_u64)
        .map(|value| value.clamp(1, u32::MAX as u64) as u32)
        .unwrap_or(defaults.max_output_tokens);

    let credential_backend = match optional_str(app, "credentialBackend").as_deref() {
        None => defaults.credential_backend,
        Some("database") => CredentialBackend::Database,
        Some("keyring") => CredentialBackend::Keyring,
        Some(other) => {
            return Err(InfraError::InvalidConfig(format!(
                "credentialBackend must be \"database\" or \"keyring\", got '{other}' in {}",
                path.display()
            )));
        }
    };

    Ok(AppConfig {
        app_name: optional_str(app, "appName").unwrap_or(defaults.app_name),
        timezone,
        ai_endpoint: optional_str(app, "aiEndpoint").unwrap_or(defaults.ai_endpoint),
        temperature,
        max_output_tokens,
        credential_backend,
        credential_service: optional_str(app, "credentialService")
            .unwrap_or(defaults.credential_service),
    })
}

fn optional_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempDir {
        path: PathBuf,
    }

    impl TempDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "daytarget-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp dir");
            Self { path }
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn default_config_is_written_and_loaded() {
        let dir = TempDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        let config = load_app_config(&dir.path).expect("load config");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn existing_config_is_not_overwritten() {
        let dir = TempDir::new();
        fs::write(
            dir.path.join(APP_JSON),
            r#"{"schema":1,"timezone":"Asia/Tokyo","maxOutputTokens":2048}"#,
        )
        .expect("write config");
        ensure_default_configs(&dir.path).expect("ensure defaults");

        let config = load_app_config(&dir.path).expect("load config");
        assert_eq!(config.timezone, chrono_tz::Asia::Tokyo);
        assert_eq!(config.max_output_tokens, 2048);
        assert_eq!(config.ai_endpoint, DEFAULT_AI_ENDPOINT);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = TempDir::new();
        fs::write(dir.path.join(APP_JSON), r#"{"schema":2}"#).expect("write config");
        match load_app_config(&dir.path) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("schema")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn credential_backend_defaults_to_database_and_accepts_keyring() {
        let dir = TempDir::new();
        fs::write(dir.path.join(APP_JSON), r#"{"schema":1}"#).expect("write config");
        let config = load_app_config(&dir.path).expect("load config");
        assert_eq!(config.credential_backend, CredentialBackend::Database);

        fs::write(
            dir.path.join(APP_JSON),
            r#"{"schema":1,"credentialBackend":"keyring","credentialService":"team.gemini"}"#,
        )
        .expect("write config");
        let config = load_app_config(&dir.path).expect("load config");
        assert_eq!(config.credential_backend, CredentialBackend::Keyring);
        assert_eq!(config.credential_service, "team.gemini");
    }

    #[test]
    fn unknown_credential_backend_is_rejected() {
        let dir = TempDir::new();
        fs::write(
            dir.path.join(APP_JSON),
            r#"{"schema":1,"credentialBackend":"vault"}"#,
        )
        .expect("write config");
        match load_app_config(&dir.path) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("vault")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let dir = TempDir::new();
        fs::write(
            dir.path.join(APP_JSON),
            r#"{"schema":1,"timezone":"Mars/Olympus"}"#,
        )
        .expect("write config");
        assert!(load_app_config(&dir.path).is_err());
    }
}
