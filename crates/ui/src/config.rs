use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ferrer_platform::SupabaseConfig;
use figment::{
    Figment, Provider,
    providers::{Env, Format, Json, Serialized},
};
use gpui::*;
use gpui_component::{Theme, ThemeMode, ThemeRegistry};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ResultExt, Snafu, ensure};

use crate::routes::DEFAULT_ORIGIN;

pub const CONFIG_DIRECTORY_NAME: &str = "ferrer";
pub const CONFIG_FILE_NAME: &str = "settings.json";
pub const AUTH_DATABASE_FILE_NAME: &str = "auth.sqlite";
pub const ENV_PREFIX: &str = "FERRER_";
pub const DEFAULT_MESSAGES_TABLE: &str = "messages";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub supabase_url: String,
    #[serde(default)]
    pub supabase_anon_key: String,
    #[serde(default = "default_messages_table")]
    pub messages_table: String,
    /// Scheme and host the auth redirect points back to.
    #[serde(default = "default_origin")]
    pub app_origin: String,
    #[serde(default)]
    pub storage_key: String,
    #[serde(default = "default_persist_session")]
    pub persist_session: bool,
    #[serde(default)]
    pub auth_database_path: Option<PathBuf>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(
        default = "default_theme_mode",
        serialize_with = "serialize_theme_mode",
        deserialize_with = "deserialize_theme_mode"
    )]
    pub theme_mode: ThemeMode,
    #[serde(default)]
    pub theme_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            messages_table: default_messages_table(),
            app_origin: default_origin(),
            storage_key: String::new(),
            persist_session: default_persist_session(),
            auth_database_path: None,
            request_timeout_secs: default_request_timeout_secs(),
            theme_mode: default_theme_mode(),
            theme_name: String::new(),
        }
    }
}

impl AppConfig {
    pub fn normalized(mut self) -> Self {
        self.supabase_url = self.supabase_url.trim().to_string();
        self.supabase_anon_key = self.supabase_anon_key.trim().to_string();
        self.messages_table = if self.messages_table.trim().is_empty() {
            default_messages_table()
        } else {
            self.messages_table.trim().to_string()
        };
        self.app_origin = if self.app_origin.trim().is_empty() {
            default_origin()
        } else {
            self.app_origin.trim().trim_end_matches('/').to_string()
        };
        self.storage_key = self.storage_key.trim().to_string();
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        self.theme_name = self.theme_name.trim().to_string();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn to_supabase_config(&self) -> Result<SupabaseConfig, ConfigError> {
        ensure!(
            !self.supabase_url.trim().is_empty(),
            MissingValueSnafu {
                stage: "config-supabase-url",
                field: "supabase_url",
            }
        );
        ensure!(
            !self.supabase_anon_key.trim().is_empty(),
            MissingValueSnafu {
                stage: "config-supabase-anon-key",
                field: "supabase_anon_key",
            }
        );

        Ok(
            SupabaseConfig::new(&self.supabase_url, &self.supabase_anon_key)
                .with_messages_table(&self.messages_table)
                .with_storage_key(&self.storage_key)
                .with_request_timeout(self.request_timeout()),
        )
    }

    pub fn auth_database_path(&self) -> PathBuf {
        self.auth_database_path
            .clone()
            .unwrap_or_else(|| ConfigStore::default_config_dir().join(AUTH_DATABASE_FILE_NAME))
    }

    pub fn apply_theme(&self, window: Option<&mut Window>, cx: &mut App) {
        if let Some(theme_config) = ThemeRegistry::global(cx)
            .themes()
            .get(&SharedString::from(self.theme_name.clone()))
            .cloned()
        {
            let mode = theme_config.mode;
            let theme = Theme::global_mut(cx);
            if mode.is_dark() {
                theme.dark_theme = theme_config;
            } else {
                theme.light_theme = theme_config;
            }
            Theme::change(mode, window, cx);
            return;
        }

        Theme::change(self.theme_mode, window, cx);
    }
}

/// Layered configuration: defaults, then the JSON file, then `FERRER_*` variables.
pub struct ConfigStore {
    config: Arc<AppConfig>,
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(CONFIG_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".ferrer"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let config = Self::extract_or_default(&config_path, Env::prefixed(ENV_PREFIX));
        Self {
            config: Arc::new(config),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn extract_or_default(path: &Path, overrides: impl Provider) -> AppConfig {
        match Self::extract(path, overrides) {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "failed to load config, using defaults");
                AppConfig::default()
            }
        }
    }

    fn extract(path: &Path, overrides: impl Provider) -> Result<AppConfig, ConfigError> {
        if !path.exists() {
            tracing::info!(path = ?path, "config file not found, using defaults and environment");
        }

        let config = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Json::file(path))
            .merge(overrides)
            .extract::<AppConfig>()
            .map_err(Box::new)
            .context(ExtractSnafu {
                stage: "extract-app-config",
            })?;
        Ok(config.normalized())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("missing `{field}` in configuration on `{stage}`"))]
    MissingValue {
        stage: &'static str,
        field: &'static str,
    },
    #[snafu(display("failed to extract configuration on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        source: Box<figment::Error>,
    },
}

fn default_messages_table() -> String {
    DEFAULT_MESSAGES_TABLE.to_string()
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_persist_session() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_theme_mode() -> ThemeMode {
    ThemeMode::Light
}

fn serialize_theme_mode<S>(value: &ThemeMode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.name())
}

fn deserialize_theme_mode<'de, D>(deserializer: D) -> Result<ThemeMode, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(parse_theme_mode(&value))
}

fn parse_theme_mode(value: &str) -> ThemeMode {
    if value.trim().eq_ignore_ascii_case("dark") {
        ThemeMode::Dark
    } else {
        ThemeMode::Light
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_json(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::extract(
            &dir.path().join(CONFIG_FILE_NAME),
            Serialized::globals(serde_json::json!({})),
        )
        .unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.app_origin, "ferrer://app");
        assert_eq!(config.messages_table, "messages");
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn file_values_are_layered_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(
            dir.path(),
            r#"{"supabase_url": " https://abc.supabase.co ", "supabase_anon_key": "anon", "theme_mode": "dark"}"#,
        );

        let config =
            ConfigStore::extract(&path, Serialized::globals(serde_json::json!({}))).unwrap();

        assert_eq!(config.supabase_url, "https://abc.supabase.co");
        assert_eq!(config.supabase_anon_key, "anon");
        assert_eq!(config.theme_mode, ThemeMode::Dark);
        assert!(config.persist_session);
    }

    #[test]
    fn overrides_win_over_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(
            dir.path(),
            r#"{"supabase_url": "https://file.supabase.co", "messages_table": "messages"}"#,
        );

        let config = ConfigStore::extract(
            &path,
            Serialized::globals(serde_json::json!({
                "supabase_url": "https://env.supabase.co",
                "messages_table": "chat_messages",
            })),
        )
        .unwrap();

        assert_eq!(config.supabase_url, "https://env.supabase.co");
        assert_eq!(config.messages_table, "chat_messages");
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(dir.path(), "{ not json");

        assert!(ConfigStore::extract(&path, Serialized::globals(serde_json::json!({}))).is_err());
        assert_eq!(
            ConfigStore::extract_or_default(&path, Serialized::globals(serde_json::json!({}))),
            AppConfig::default()
        );
    }

    #[test]
    fn supabase_config_requires_url_and_key() {
        let missing_url = AppConfig::default().to_supabase_config().unwrap_err();
        assert!(matches!(
            missing_url,
            ConfigError::MissingValue {
                field: "supabase_url",
                ..
            }
        ));

        let missing_key = AppConfig {
            supabase_url: "https://abc.supabase.co".to_string(),
            ..AppConfig::default()
        }
        .to_supabase_config()
        .unwrap_err();
        assert!(matches!(
            missing_key,
            ConfigError::MissingValue {
                field: "supabase_anon_key",
                ..
            }
        ));
    }

    #[test]
    fn supabase_config_carries_table_and_timeout() {
        let config = AppConfig {
            supabase_url: "https://abc.supabase.co".to_string(),
            supabase_anon_key: "anon".to_string(),
            messages_table: "chat".to_string(),
            request_timeout_secs: 5,
            ..AppConfig::default()
        }
        .to_supabase_config()
        .unwrap();

        assert_eq!(config.url, "https://abc.supabase.co");
        assert_eq!(config.messages_table, "chat");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn normalization_fills_blank_values() {
        let config = AppConfig {
            messages_table: "  ".to_string(),
            app_origin: "ferrer://app/".to_string(),
            request_timeout_secs: 0,
            ..AppConfig::default()
        }
        .normalized();

        assert_eq!(config.messages_table, "messages");
        assert_eq!(config.app_origin, "ferrer://app");
        assert_eq!(config.request_timeout_secs, 15);
    }
}
