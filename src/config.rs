//! Configuration management for newscast-rs.
//!
//! Loads config from YAML files in standard locations. Credentials may be
//! left empty in the file and filled from the environment by the binary;
//! library code only ever sees the values passed in here.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PodcastError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub api_key: String,
    pub host: String,
    pub country: String,
    pub page_size: u32,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            host: "https://newsapi.org".into(),
            country: "us".into(),
            page_size: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    pub api_key: String,
    /// OpenAI-compatible base URL (Groq by default).
    pub host: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Articles converted in parallel.
    pub concurrency: usize,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            host: "https://api.groq.com/openai/v1".into(),
            model: "llama-3.1-8b-instant".into(),
            max_tokens: 400,
            temperature: 0.7,
            timeout_secs: 60,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub speaker_a: String,
    pub speaker_b: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            speaker_a: "nova".into(),
            speaker_b: "onyx".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub api_key: String,
    /// OpenAI-compatible base URL exposing `/audio/speech`.
    pub host: String,
    /// Engine tier, e.g. `tts-1` or `tts-1-hd`.
    pub model: String,
    pub format: String,
    pub voices: VoiceConfig,
    pub timeout_secs: u64,
    /// Lines synthesized in parallel.
    pub concurrency: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            host: "https://api.openai.com/v1".into(),
            model: "tts-1".into(),
            format: "mp3".into(),
            voices: VoiceConfig::default(),
            timeout_secs: 60,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// `local` or `http`.
    pub backend: String,
    pub output_dir: PathBuf,
    /// Object-store endpoint for the `http` backend; objects are PUT to `{upload_url}/{name}`.
    pub upload_url: String,
    pub token: String,
    pub category: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            backend: "local".into(),
            output_dir: PathBuf::from("podcasts"),
            upload_url: String::new(),
            token: String::new(),
            category: "general".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Defaults to `~/.newscast-history` when empty.
    pub dir: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub news: NewsConfig,
    pub dialogue: DialogueConfig,
    pub speech: SpeechConfig,
    pub retry: RetryPolicy,
    pub publish: PublishConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./newscast.yaml
    /// 2. ~/.config/newscast/config.yaml
    /// 3. /etc/newscast/config.yaml
    ///
    /// An explicit path that cannot be read or parsed is an error; with no
    /// file anywhere the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("newscast.yaml")),
                dirs::home_dir().map(|h| h.join(".config/newscast/config.yaml")),
                Some(PathBuf::from("/etc/newscast/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            PodcastError::Config(format!("failed to read {}: {e}", config_path.display()))
        })?;
        let config = Self::from_yaml(&contents).map_err(|e| match e {
            PodcastError::Config(msg) => {
                PodcastError::Config(format!("{}: {msg}", config_path.display()))
            }
            other => other,
        })?;
        info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self =
            serde_yml::from_str(contents).map_err(|e| PodcastError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Fill empty credentials from `NEWS_KEY`, `GROQ_KEY`, `TTS_KEY` and
    /// `PUBLISH_TOKEN`. Values already set in the file win.
    pub fn apply_env(&mut self, env: &HashMap<String, String>) {
        let fill = |slot: &mut String, key: &str| {
            if slot.is_empty() {
                if let Some(value) = env.get(key).filter(|v| !v.is_empty()) {
                    *slot = value.clone();
                }
            }
        };
        fill(&mut self.news.api_key, "NEWS_KEY");
        fill(&mut self.dialogue.api_key, "GROQ_KEY");
        fill(&mut self.speech.api_key, "TTS_KEY");
        fill(&mut self.publish.token, "PUBLISH_TOKEN");
    }

    fn validate(&self) -> Result<()> {
        if self.dialogue.concurrency == 0 {
            return Err(PodcastError::Config(
                "dialogue.concurrency must be at least 1".into(),
            ));
        }
        if self.speech.concurrency == 0 {
            return Err(PodcastError::Config(
                "speech.concurrency must be at least 1".into(),
            ));
        }
        if !matches!(self.publish.backend.as_str(), "local" | "http") {
            return Err(PodcastError::Config(format!(
                "unknown publish.backend '{}' (expected local or http)",
                self.publish.backend
            )));
        }
        if self.publish.backend == "http" && self.publish.upload_url.is_empty() {
            return Err(PodcastError::Config(
                "publish.upload_url is required for the http backend".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_daily_news_setup() {
        let config = Config::default();
        assert_eq!(config.news.country, "us");
        assert_eq!(config.news.page_size, 10);
        assert_eq!(config.dialogue.model, "llama-3.1-8b-instant");
        assert_eq!(config.dialogue.max_tokens, 400);
        assert_eq!(config.speech.format, "mp3");
        assert_eq!(config.publish.category, "general");
        assert!(config.history.enabled);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
speech:
  voices:
    speaker_b: echo
  concurrency: 8
retry:
  max_attempts: 2
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.speech.voices.speaker_a, "nova");
        assert_eq!(config.speech.voices.speaker_b, "echo");
        assert_eq!(config.speech.concurrency, 8);
        assert_eq!(config.speech.model, "tts-1");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_delay_ms, 500);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = Config::from_yaml("speech:\n  concurrency: 0\n").unwrap_err();
        assert!(err.to_string().contains("speech.concurrency"));
    }

    #[test]
    fn http_publisher_requires_url() {
        let err = Config::from_yaml("publish:\n  backend: http\n").unwrap_err();
        assert!(err.to_string().contains("upload_url"));
        let err = Config::from_yaml("publish:\n  backend: ftp\n").unwrap_err();
        assert!(err.to_string().contains("unknown publish.backend"));
    }

    #[test]
    fn env_fills_only_empty_credentials() {
        let mut config = Config::from_yaml("dialogue:\n  api_key: from-file\n").unwrap();
        let env: HashMap<String, String> = [
            ("GROQ_KEY", "from-env"),
            ("TTS_KEY", "tts-secret"),
            ("NEWS_KEY", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        config.apply_env(&env);
        assert_eq!(config.dialogue.api_key, "from-file");
        assert_eq!(config.speech.api_key, "tts-secret");
        assert!(config.news.api_key.is_empty());
    }

    #[test]
    fn load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newscast.yaml");
        std::fs::write(&path, "publish:\n  category: tech\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.publish.category, "tech");
    }

    #[test]
    fn load_fails_on_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, PodcastError::Config(_)));
    }
}
