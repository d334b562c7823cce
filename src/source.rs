//! Article sources.
//!
//! The pipeline takes whatever list a source returns as the episode's
//! running order; no filtering or truncation happens downstream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::NewsConfig;
use crate::error::BackendError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
}

impl Article {
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
        }
    }
}

#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Article>, BackendError>;
}

// --- NewsAPI top headlines ---

#[derive(Deserialize)]
struct HeadlinesResponse {
    #[serde(default)]
    articles: Vec<HeadlineEntry>,
}

#[derive(Deserialize)]
struct HeadlineEntry {
    title: Option<String>,
    description: Option<String>,
}

impl HeadlineEntry {
    fn into_article(self) -> Option<Article> {
        let title = self.title?.trim().to_string();
        if title.is_empty() {
            return None;
        }
        let description = self.description.unwrap_or_default();
        let summary = format!("{title} - {}", description.trim());
        Some(Article { title, summary })
    }
}

pub struct NewsApiSource {
    config: NewsConfig,
    client: Client,
}

impl NewsApiSource {
    pub fn new(config: NewsConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("newscast-rs/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ArticleSource for NewsApiSource {
    async fn fetch(&self) -> Result<Vec<Article>, BackendError> {
        if self.config.api_key.is_empty() {
            return Err(BackendError::MissingCredentials("news source"));
        }

        let url = format!("{}/v2/top-headlines", self.config.host.trim_end_matches('/'));
        let page_size = self.config.page_size.to_string();
        debug!("Fetching top headlines for '{}'", self.config.country);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("country", self.config.country.as_str()),
                ("pageSize", page_size.as_str()),
            ])
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }

        let data: HeadlinesResponse = resp.json().await?;
        let articles: Vec<Article> = data
            .articles
            .into_iter()
            .filter_map(HeadlineEntry::into_article)
            .collect();
        info!("Fetched {} articles", articles.len());
        Ok(articles)
    }
}

// --- JSON file (offline runs) ---

/// Reads a JSON array of `{title, summary}` objects.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ArticleSource for FileSource {
    async fn fetch(&self) -> Result<Vec<Article>, BackendError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| BackendError::Transport {
                message: format!("failed to read {}: {e}", self.path.display()),
                transient: false,
            })?;
        let articles: Vec<Article> = serde_json::from_str(&contents).map_err(|e| {
            BackendError::InvalidResponse(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        info!("Loaded {} articles from {}", articles.len(), self.path.display());
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headline_summary_joins_title_and_description() {
        let entry = HeadlineEntry {
            title: Some("Rates hold".into()),
            description: Some("The central bank kept rates steady.".into()),
        };
        let article = entry.into_article().unwrap();
        assert_eq!(article.title, "Rates hold");
        assert_eq!(article.summary, "Rates hold - The central bank kept rates steady.");
    }

    #[test]
    fn headline_without_description_keeps_title() {
        let entry = HeadlineEntry {
            title: Some("Storm warning".into()),
            description: None,
        };
        assert_eq!(entry.into_article().unwrap().summary, "Storm warning - ");
    }

    #[test]
    fn headline_without_title_is_dropped() {
        let entry = HeadlineEntry {
            title: None,
            description: Some("orphan".into()),
        };
        assert!(entry.into_article().is_none());
    }

    #[test]
    fn headlines_response_parses_newsapi_shape() {
        let json = r#"{"status":"ok","totalResults":2,"articles":[
            {"title":"A","description":"descA","url":"https://a"},
            {"title":"B","description":null,"content":"..."}
        ]}"#;
        let data: HeadlinesResponse = serde_json::from_str(json).unwrap();
        let articles: Vec<Article> = data
            .articles
            .into_iter()
            .filter_map(HeadlineEntry::into_article)
            .collect();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].summary, "A - descA");
    }

    #[tokio::test]
    async fn news_source_requires_api_key() {
        let source = NewsApiSource::new(NewsConfig::default()).unwrap();
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, BackendError::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn file_source_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        std::fs::write(
            &path,
            r#"[{"title":"A","summary":"A - descA"},{"title":"B","summary":"B - descB"}]"#,
        )
        .unwrap();
        let articles = FileSource::new(&path).fetch().await.unwrap();
        assert_eq!(
            articles,
            vec![Article::new("A", "A - descA"), Article::new("B", "B - descB")]
        );
    }

    #[tokio::test]
    async fn file_source_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        std::fs::write(&path, "not json").unwrap();
        let err = FileSource::new(&path).fetch().await.unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[tokio::test]
    async fn file_source_missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSource::new(&dir.path().join("missing.json"))
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport { transient: false, .. }));
        assert!(err.to_string().contains("failed to read"));
        assert!(!err.is_retryable());
    }
}
