use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::providers::SamplingParams;
use crate::stitch::StitchMode;

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// New comments and keys from the template are kept while the user's
/// values win.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;
    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

/// Recursively merges items from source table into target table.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}

pub mod paths {
    //! Path resolution for tokenwheel configuration.
    //!
    //! TOKENWHEEL_HOME resolution order:
    //! 1. TOKENWHEEL_HOME environment variable (if set)
    //! 2. ~/.config/tokenwheel (default)

    use std::path::PathBuf;

    /// Returns the tokenwheel home directory.
    ///
    /// Falls back to `./.tokenwheel` when no home directory is known.
    pub fn tokenwheel_home() -> PathBuf {
        if let Ok(home) = std::env::var("TOKENWHEEL_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".tokenwheel"),
            |h| h.join(".config").join("tokenwheel"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        tokenwheel_home().join("config.toml")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gemini model id
    pub model: String,

    /// Maximum tokens per generation
    pub max_tokens: u32,

    pub temperature: f32,

    pub top_p: f32,

    pub top_k: u32,

    /// Candidates returned per position
    pub candidates: u32,

    /// Token joining strategy for the whole session
    pub stitching: StitchMode,

    /// Optional inline system instruction
    pub system_prompt: Option<String>,

    /// Optional path to a file containing the system instruction
    pub system_prompt_file: Option<String>,

    /// Timeout for each provider call in seconds (0 disables)
    pub request_timeout_secs: u32,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Self::DEFAULT_MODEL.to_string(),
            max_tokens: SamplingParams::DEFAULT_MAX_TOKENS,
            temperature: SamplingParams::DEFAULT_TEMPERATURE,
            top_p: SamplingParams::DEFAULT_TOP_P,
            top_k: SamplingParams::DEFAULT_TOP_K,
            candidates: SamplingParams::DEFAULT_CANDIDATES,
            stitching: StitchMode::default(),
            system_prompt: None,
            system_prompt_file: None,
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            providers: ProvidersConfig::default(),
        }
    }
}

impl Config {
    pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
    const DEFAULT_REQUEST_TIMEOUT_SECS: u32 = 30;

    /// Keys accepted by `save_value_to`.
    pub const SETTABLE_KEYS: &[&str] = &[
        "model",
        "max_tokens",
        "temperature",
        "top_p",
        "top_k",
        "candidates",
        "stitching",
        "system_prompt",
        "system_prompt_file",
        "request_timeout_secs",
        "providers.gemini.api_key",
        "providers.gemini.base_url",
    ];

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Sampling parameters for provider calls, clamped to accepted ranges.
    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            candidates: self.candidates,
        }
        .clamped()
    }

    /// Returns the effective system prompt, preferring the file if both are set.
    pub fn effective_system_prompt(&self) -> Result<Option<String>> {
        if let Some(path_str) = &self.system_prompt_file {
            let path = Path::new(path_str);
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt file: {path_str}"))?;
            let trimmed = content.trim();
            return Ok((!trimmed.is_empty()).then(|| trimmed.to_string()));
        }

        let trimmed = self.system_prompt.as_deref().unwrap_or("").trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.request_timeout_secs)))
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Saves a single key to a specific config file path.
    ///
    /// Creates the file from the template if it doesn't exist, otherwise
    /// merges user values into the latest template. Comments are preserved
    /// using toml_edit. Dotted keys address nested tables
    /// (`providers.gemini.base_url`).
    pub fn save_value_to(path: &Path, key: &str, raw: &str) -> Result<()> {
        use toml_edit::DocumentMut;

        if !Self::SETTABLE_KEYS.contains(&key) {
            bail!(
                "Unknown config key '{key}'. Known keys: {}",
                Self::SETTABLE_KEYS.join(", ")
            );
        }

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        let mut segments: Vec<&str> = key.split('.').collect();
        let leaf = segments.pop().unwrap_or(key);
        let mut table = doc.as_table_mut();
        for segment in segments {
            let entry = table
                .entry(segment)
                .or_insert_with(|| toml_edit::Item::Table(toml_edit::Table::new()));
            table = entry
                .as_table_mut()
                .with_context(|| format!("Config key '{segment}' is not a table"))?;
        }
        table[leaf] = toml_edit::value(parse_scalar(raw));

        let updated = doc.to_string();
        toml::from_str::<Config>(&updated)
            .with_context(|| format!("Invalid value '{raw}' for '{key}'"))?;

        Self::write_config(path, &updated)
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

/// Interprets a command-line value as a TOML scalar.
fn parse_scalar(raw: &str) -> toml_edit::Value {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return n.into();
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return f.into();
    }
    match trimmed {
        "true" => true.into(),
        "false" => false.into(),
        _ => raw.into(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub gemini: ProviderConfig,
}

/// Provider configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Optional API key (overrides environment variable).
    pub api_key: Option<String>,
    /// Optional API base URL (for proxies).
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Returns the effective API key if set and non-empty.
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns the effective base URL if set and non-empty.
    pub fn effective_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.stitching, StitchMode::Concat);
        assert_eq!(config.sampling_params(), SamplingParams::default());
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: Config = toml::from_str(default_config_template()).unwrap();
        let defaults = Config::default();
        assert_eq!(config.model, defaults.model);
        assert_eq!(config.sampling_params(), defaults.sampling_params());
        assert_eq!(config.request_timeout_secs, defaults.request_timeout_secs);
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "stitching = \"smart\"\ncandidates = 5\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.stitching, StitchMode::Smart);
        assert_eq!(config.candidates, 5);
        assert_eq!(config.max_tokens, 32);
    }

    #[test]
    fn test_unknown_stitching_mode_is_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "stitching = \"fancy\"\n").unwrap();
        assert!(Config::load_from(&config_path).is_err());
    }

    #[test]
    fn test_sampling_params_are_clamped() {
        let config = Config {
            candidates: 64,
            ..Default::default()
        };
        assert_eq!(config.sampling_params().candidates, 20);
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("gemini-2.0-flash"));
        assert!(contents.contains("# system_prompt ="));
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "").unwrap();
        assert!(Config::init(&config_path).is_err());
    }

    #[test]
    fn test_system_prompt_file_wins_over_inline() {
        let dir = tempdir().unwrap();
        let prompt_file = dir.path().join("prompt.txt");
        fs::write(&prompt_file, "file prompt\n").unwrap();

        let config = Config {
            system_prompt_file: Some(prompt_file.to_str().unwrap().to_string()),
            system_prompt: Some("inline prompt".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.effective_system_prompt().unwrap(),
            Some("file prompt".to_string())
        );
    }

    #[test]
    fn test_blank_system_prompt_is_none() {
        let config = Config {
            system_prompt: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.effective_system_prompt().unwrap(), None);
    }

    #[test]
    fn test_request_timeout_zero_disables() {
        let config = Config {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.request_timeout(), None);
        assert_eq!(
            Config::default().request_timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_gemini_base_url_loaded_from_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[providers.gemini]\nbase_url = \"https://proxy.example.com\"\napi_key = \"  \"\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(
            config.providers.gemini.effective_base_url(),
            Some("https://proxy.example.com")
        );
        assert_eq!(config.providers.gemini.effective_api_key(), None);
    }

    #[test]
    fn test_save_value_creates_file_with_template() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        Config::save_value_to(&config_path, "model", "gemini-1.5-flash").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.model, "gemini-1.5-flash");
        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("# Tokenwheel Configuration"));
    }

    #[test]
    fn test_save_value_preserves_other_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "model = \"custom\"\ntop_k = 7\n").unwrap();

        Config::save_value_to(&config_path, "temperature", "0.3").unwrap();
        Config::save_value_to(&config_path, "stitching", "smart").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.model, "custom");
        assert_eq!(config.top_k, 7);
        assert!((config.temperature - 0.3).abs() < 1e-6);
        assert_eq!(config.stitching, StitchMode::Smart);
    }

    #[test]
    fn test_save_value_nested_key() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        Config::save_value_to(
            &config_path,
            "providers.gemini.base_url",
            "http://localhost:9999",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(
            config.providers.gemini.effective_base_url(),
            Some("http://localhost:9999")
        );
    }

    #[test]
    fn test_save_value_rejects_unknown_key_and_bad_type() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        assert!(Config::save_value_to(&config_path, "colour", "blue").is_err());
        assert!(Config::save_value_to(&config_path, "top_k", "many").is_err());
        assert!(!config_path.exists());
    }
}
