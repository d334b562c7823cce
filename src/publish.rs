//! Episode publishing: local directory or HTTP object store.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::config::PublishConfig;
use crate::error::BackendError;

/// Where a published episode ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub location: String,
    /// Retrieval URL, when the backend hands one out.
    pub url: Option<String>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, name: &str, audio: &[u8]) -> Result<Publication, BackendError>;
}

/// Reject names that would escape the target directory or bucket prefix.
fn check_name(name: &str) -> Result<(), BackendError> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
        return Err(BackendError::InvalidResponse(format!(
            "invalid episode name '{name}'"
        )));
    }
    Ok(())
}

pub struct LocalPublisher {
    dir: PathBuf,
}

impl LocalPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    async fn publish(&self, name: &str, audio: &[u8]) -> Result<Publication, BackendError> {
        check_name(name)?;
        let io_err = |e: std::io::Error| BackendError::Transport {
            message: e.to_string(),
            transient: false,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        let path = self.dir.join(name);
        // Renamed into place once complete.
        let tmp = self.dir.join(format!(".{name}.partial"));
        tokio::fs::write(&tmp, audio).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;

        info!("Saved episode to {} ({} bytes)", path.display(), audio.len());
        Ok(Publication {
            location: path.display().to_string(),
            url: None,
        })
    }
}

/// PUTs the episode to `{upload_url}/{name}` with an optional bearer token.
pub struct HttpPublisher {
    upload_url: String,
    token: String,
    content_type: String,
    client: Client,
}

impl HttpPublisher {
    pub fn new(config: &PublishConfig, content_type: impl Into<String>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            upload_url: config.upload_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            content_type: content_type.into(),
            client,
        })
    }

    pub fn object_url(&self, name: &str) -> String {
        format!("{}/{name}", self.upload_url)
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, name: &str, audio: &[u8]) -> Result<Publication, BackendError> {
        check_name(name)?;
        let url = self.object_url(name);

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, &self.content_type)
            .body(audio.to_vec());
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }

        info!("Uploaded episode to {url} ({} bytes)", audio.len());
        Ok(Publication {
            location: url.clone(),
            url: Some(url),
        })
    }
}

/// MIME type for an audio format name.
pub fn content_type_for(format: &str) -> &'static str {
    match format {
        "mp3" => "audio/mpeg",
        "opus" => "audio/ogg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "pcm" => "audio/L16",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_publisher_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(dir.path().join("podcasts"));
        let publication = publisher
            .publish("general_podcast_2024-05-01.mp3", b"ID3audio")
            .await
            .unwrap();

        let path = dir.path().join("podcasts/general_podcast_2024-05-01.mp3");
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3audio");
        assert_eq!(publication.location, path.display().to_string());
        assert!(publication.url.is_none());
        assert!(!dir
            .path()
            .join("podcasts/.general_podcast_2024-05-01.mp3.partial")
            .exists());
    }

    #[tokio::test]
    async fn names_with_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(dir.path());
        for name in ["", "../escape.mp3", "a/b.mp3", ".hidden"] {
            assert!(publisher.publish(name, b"x").await.is_err(), "{name}");
        }
    }

    #[test]
    fn http_object_url_joins_name() {
        let config = PublishConfig {
            backend: "http".into(),
            upload_url: "https://storage.example.com/bucket/".into(),
            ..PublishConfig::default()
        };
        let publisher = HttpPublisher::new(&config, "audio/mpeg").unwrap();
        assert_eq!(
            publisher.object_url("general_podcast_2024-05-01.mp3"),
            "https://storage.example.com/bucket/general_podcast_2024-05-01.mp3"
        );
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("mp3"), "audio/mpeg");
        assert_eq!(content_type_for("wav"), "audio/wav");
        assert_eq!(content_type_for("weird"), "application/octet-stream");
    }
}
