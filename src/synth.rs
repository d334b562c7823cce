//! Audio synthesis: speaker lines → one ordered audio byte stream.
//!
//! Lines are sent to the speech backend concurrently (bounded by
//! `concurrency`), but their bytes reach the sink strictly in the order the
//! lines were read. Finished segments wait in a `ReorderBuffer` until every
//! earlier line has been flushed.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SpeechConfig, VoiceConfig};
use crate::error::{BackendError, PodcastError, Result, Stage};
use crate::retry::{with_retry, RetryError, RetryPolicy};
use crate::segment::{Speaker, SpeakerLine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    pub format: String,
}

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> std::result::Result<Vec<u8>, BackendError>;
}

// --- OpenAI-compatible /audio/speech ---

#[derive(Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

pub struct OpenAiSpeech {
    config: SpeechConfig,
    client: Client,
}

impl OpenAiSpeech {
    pub fn new(config: SpeechConfig) -> std::result::Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl SpeechBackend for OpenAiSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> std::result::Result<Vec<u8>, BackendError> {
        if self.config.api_key.is_empty() {
            return Err(BackendError::MissingCredentials("speech backend"));
        }

        let url = format!("{}/audio/speech", self.config.host.trim_end_matches('/'));
        let body = SpeechBody {
            model: &self.config.model,
            input: &request.text,
            voice: &request.voice_id,
            response_format: &request.format,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

/// Voice identity per speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceMap {
    speaker_a: String,
    speaker_b: String,
}

impl VoiceMap {
    pub fn new(speaker_a: impl Into<String>, speaker_b: impl Into<String>) -> Self {
        Self {
            speaker_a: speaker_a.into(),
            speaker_b: speaker_b.into(),
        }
    }

    pub fn voice_for(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::SpeakerA => &self.speaker_a,
            Speaker::SpeakerB => &self.speaker_b,
        }
    }
}

impl From<&VoiceConfig> for VoiceMap {
    fn from(config: &VoiceConfig) -> Self {
        Self::new(config.speaker_a.clone(), config.speaker_b.clone())
    }
}

/// Rendered audio for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub sequence_index: usize,
    pub bytes: Vec<u8>,
}

/// Holds finished segments until all earlier dispatched lines are flushed.
///
/// `expect` records dispatch order; `pop_ready` only ever releases the
/// oldest outstanding index.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    order: VecDeque<usize>,
    ready: BTreeMap<usize, Vec<u8>>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(&mut self, sequence_index: usize) {
        self.order.push_back(sequence_index);
    }

    pub fn insert(&mut self, segment: AudioSegment) {
        self.ready.insert(segment.sequence_index, segment.bytes);
    }

    pub fn pop_ready(&mut self) -> Option<AudioSegment> {
        let next = *self.order.front()?;
        let bytes = self.ready.remove(&next)?;
        self.order.pop_front();
        Some(AudioSegment {
            sequence_index: next,
            bytes,
        })
    }

    /// Oldest dispatched index not yet released.
    pub fn next_expected(&self) -> Option<usize> {
        self.order.front().copied()
    }

    /// Segments finished but still waiting on an earlier line.
    pub fn buffered(&self) -> usize {
        self.ready.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisReport {
    pub lines_written: usize,
    pub lines_skipped: usize,
    pub bytes_written: u64,
}

pub struct AudioSynthesizer {
    backend: Arc<dyn SpeechBackend>,
    voices: VoiceMap,
    format: String,
    concurrency: usize,
    policy: RetryPolicy,
}

impl AudioSynthesizer {
    pub fn new(backend: Arc<dyn SpeechBackend>, voices: VoiceMap, format: impl Into<String>) -> Self {
        Self {
            backend,
            voices,
            format: format.into(),
            concurrency: 1,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Synthesize `lines` and append the audio to `sink` in line order.
    ///
    /// At most `concurrency` lines are outstanding at once, counting both
    /// requests in flight and finished segments still waiting on an earlier
    /// line. When a line fails after retries, dispatch stops, every line
    /// before the lowest failing index is still written, and that index is
    /// the one reported. Nothing from the failing line onwards reaches the
    /// sink.
    pub async fn synthesize<I, W>(
        &self,
        lines: I,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<SynthesisReport>
    where
        I: IntoIterator<Item = SpeakerLine>,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let t_start = Instant::now();
        let mut lines = lines.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut reorder = ReorderBuffer::new();
        let mut report = SynthesisReport::default();
        let mut exhausted = false;
        let mut failure: Option<(usize, PodcastError)> = None;

        loop {
            while failure.is_none()
                && !exhausted
                && in_flight.len() + reorder.buffered() < self.concurrency
            {
                let Some(line) = lines.next() else {
                    exhausted = true;
                    break;
                };
                let text = line.text.trim();
                if text.is_empty() {
                    debug!("Skipping empty line #{}", line.sequence_index);
                    report.lines_skipped += 1;
                    continue;
                }
                let request = SpeechRequest {
                    text: text.to_string(),
                    voice_id: self.voices.voice_for(line.speaker).to_string(),
                    format: self.format.clone(),
                };
                reorder.expect(line.sequence_index);
                in_flight.push(self.synthesize_line(line.sequence_index, request, cancel));
            }

            let Some((sequence_index, result)) = in_flight.next().await else {
                break;
            };
            match result {
                Ok(bytes) => reorder.insert(AudioSegment {
                    sequence_index,
                    bytes,
                }),
                Err(e) => {
                    if failure.as_ref().map_or(true, |(first, _)| sequence_index < *first) {
                        failure = Some((sequence_index, e));
                    }
                }
            }

            // A failed line is never inserted, so nothing at or after it is released.
            while let Some(segment) = reorder.pop_ready() {
                sink.write_all(&segment.bytes)
                    .await
                    .map_err(PodcastError::Output)?;
                report.lines_written += 1;
                report.bytes_written += segment.bytes.len() as u64;
                debug!(
                    "Wrote line #{} ({} bytes, {} waiting)",
                    segment.sequence_index,
                    segment.bytes.len(),
                    reorder.buffered()
                );
            }

            if let Some((first, _)) = &failure {
                if reorder.next_expected() == Some(*first) {
                    break;
                }
            }
        }

        sink.flush().await.map_err(PodcastError::Output)?;

        if let Some((line, error)) = failure {
            warn!(
                "Synthesis stopped at line #{line} after writing {} lines",
                report.lines_written
            );
            return Err(error);
        }

        info!(
            "Synthesized {} lines, skipped {}, {} bytes ({:.0}ms)",
            report.lines_written,
            report.lines_skipped,
            report.bytes_written,
            t_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(report)
    }

    async fn synthesize_line(
        &self,
        sequence_index: usize,
        request: SpeechRequest,
        cancel: &CancellationToken,
    ) -> (usize, Result<Vec<u8>>) {
        let label = format!("speech[{sequence_index}]");
        let result = with_retry(&self.policy, cancel, &label, || self.backend.synthesize(&request))
            .await
            .map_err(|e| match e {
                RetryError::Failed { error, .. } => PodcastError::Synthesis {
                    line: sequence_index,
                    source: error,
                },
                RetryError::Cancelled => PodcastError::Cancelled(Stage::Synthesis),
            });
        (sequence_index, result)
    }
}
