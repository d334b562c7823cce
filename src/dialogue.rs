//! Dialogue generation: article summary → two-host script.
//!
//! Sends each article to an OpenAI-compatible `/chat/completions` endpoint
//! (Groq by default) with a fixed instruction describing the `Alice:`/`Bob:`
//! line format. The reply is returned as-is; the segmenter tolerates
//! whatever shape comes back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::DialogueConfig;
use crate::error::{BackendError, PodcastError, Result, Stage};
use crate::retry::{with_retry, RetryError, RetryPolicy};
use crate::source::Article;

const DIALOGUE_PROMPT: &str = "Turn this article into a short podcast-style conversation between two hosts, Alice and Bob without any intro and outro. Keep it engaging but concise, and sounding natural. Keep it within 1000 characters and make a new line for each speaker with the prefix 'Bob:' or 'Alice:'. Ensure there's a newline between each speaker :\n\n{article}";

/// Raw script returned for one article.
pub type DialogueScript = String;

pub fn build_prompt(article: &Article) -> String {
    DIALOGUE_PROMPT.replace("{article}", &article.summary)
}

#[async_trait]
pub trait DialogueGenerator: Send + Sync {
    async fn generate(&self, article: &Article) -> std::result::Result<DialogueScript, BackendError>;
}

// --- OpenAI-compatible chat completions ---

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_choice(response: ChatResponse) -> std::result::Result<String, BackendError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| BackendError::InvalidResponse("no response generated".into()))
}

pub struct ChatDialogueGenerator {
    config: DialogueConfig,
    client: Client,
}

impl ChatDialogueGenerator {
    pub fn new(config: DialogueConfig) -> std::result::Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl DialogueGenerator for ChatDialogueGenerator {
    async fn generate(&self, article: &Article) -> std::result::Result<DialogueScript, BackendError> {
        if self.config.api_key.is_empty() {
            return Err(BackendError::MissingCredentials("dialogue backend"));
        }

        let prompt = build_prompt(article);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            stream: false,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = format!("{}/chat/completions", self.config.host.trim_end_matches('/'));
        debug!("Requesting dialogue for '{}' from {}", article.title, self.config.model);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }

        let data: ChatResponse = resp.json().await?;
        first_choice(data)
    }
}

/// Generate one dialogue per article, at most `concurrency` at a time.
///
/// Results come back in article order regardless of completion order. The
/// first article that fails (after retries) ends the stage; dropping the
/// stream cancels every request still in flight.
pub async fn generate_dialogues(
    generator: Arc<dyn DialogueGenerator>,
    articles: &[Article],
    concurrency: usize,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<DialogueScript>> {
    let t_start = Instant::now();

    let dialogues: Vec<DialogueScript> = stream::iter(articles.iter().enumerate())
        .map(|(index, article)| {
            let generator = generator.clone();
            async move {
                let label = format!("dialogue[{index}]");
                with_retry(policy, cancel, &label, || generator.generate(article))
                    .await
                    .map_err(|e| match e {
                        RetryError::Failed { error, .. } => PodcastError::DialogueGeneration {
                            article: index,
                            source: error,
                        },
                        RetryError::Cancelled => PodcastError::Cancelled(Stage::Dialogue),
                    })
            }
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    info!(
        "Generated {} dialogues ({:.0}ms)",
        dialogues.len(),
        t_start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(dialogues)
}
