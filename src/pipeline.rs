//! Episode orchestration.
//!
//! articles → dialogues → assembled script → speaker lines → audio → publisher
//!
//! One `produce_episode` call is one isolated run: all per-run state lives on
//! the stack of that call, and the backend clients are shared read-only.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dialogue::{generate_dialogues, DialogueGenerator};
use crate::error::{PodcastError, Result, Stage};
use crate::history::{RunHistory, RunRecord};
use crate::publish::{Publication, Publisher};
use crate::retry::RetryPolicy;
use crate::script::{assemble, AssembledScript};
use crate::segment::segment;
use crate::source::{Article, ArticleSource};
use crate::synth::{AudioSynthesizer, SpeechBackend, VoiceMap};

/// The finished artifact of one run.
#[derive(Debug, Clone)]
pub struct PodcastEpisode {
    /// `YYYY-MM-DD`
    pub date: String,
    pub name: String,
    pub audio: Vec<u8>,
    pub publication: Publication,
    pub stats: RunStats,
}

#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub article_count: usize,
    pub line_count: usize,
    pub skipped_lines: usize,
    pub dialogue_ms: i64,
    pub synthesis_ms: i64,
    pub publish_ms: i64,
    pub total_ms: i64,
}

/// `{category}_podcast_{YYYY-MM-DD}.{format}`
pub fn episode_name(category: &str, date: NaiveDate, format: &str) -> String {
    format!("{category}_podcast_{}.{format}", date.format("%Y-%m-%d"))
}

fn elapsed_ms(since: Instant) -> i64 {
    since.elapsed().as_millis() as i64
}

pub struct PodcastPipeline {
    generator: Arc<dyn DialogueGenerator>,
    synthesizer: AudioSynthesizer,
    publisher: Arc<dyn Publisher>,
    dialogue_concurrency: usize,
    retry: RetryPolicy,
    category: String,
    format: String,
    date: Option<NaiveDate>,
    history: Option<RunHistory>,
}

impl PodcastPipeline {
    pub fn new(
        config: &Config,
        generator: Arc<dyn DialogueGenerator>,
        speech: Arc<dyn SpeechBackend>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let synthesizer = AudioSynthesizer::new(
            speech,
            VoiceMap::from(&config.speech.voices),
            config.speech.format.clone(),
        )
        .with_concurrency(config.speech.concurrency)
        .with_retry_policy(config.retry.clone());

        Self {
            generator,
            synthesizer,
            publisher,
            dialogue_concurrency: config.dialogue.concurrency,
            retry: config.retry.clone(),
            category: config.publish.category.clone(),
            format: config.speech.format.clone(),
            date: None,
            history: None,
        }
    }

    /// Fix the episode date instead of using today's.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_history(mut self, history: RunHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Run dialogue generation and assembly only.
    pub async fn build_script(
        &self,
        articles: &[Article],
        cancel: &CancellationToken,
    ) -> Result<AssembledScript> {
        let dialogues = generate_dialogues(
            self.generator.clone(),
            articles,
            self.dialogue_concurrency,
            &self.retry,
            cancel,
        )
        .await?;
        let sections: Vec<_> = articles.iter().cloned().zip(dialogues).collect();
        Ok(assemble(&sections))
    }

    /// Fetch articles from `source`, then produce and publish the episode.
    ///
    /// A fetch failure is recorded in the run history like any other stage.
    pub async fn produce_episode_from(
        &self,
        source: &dyn ArticleSource,
        cancel: &CancellationToken,
    ) -> Result<PodcastEpisode> {
        let t_start = Instant::now();
        let fetched = tokio::select! {
            _ = cancel.cancelled() => Err(PodcastError::Cancelled(Stage::Source)),
            fetched = source.fetch() => fetched.map_err(PodcastError::SourceFetch),
        };

        match fetched {
            Ok(articles) => self.produce_episode(&articles, cancel).await,
            Err(e) => {
                let name = episode_name(&self.category, self.episode_date(), &self.format);
                let stats = RunStats {
                    total_ms: elapsed_ms(t_start),
                    ..RunStats::default()
                };
                error!("Run failed during {}: {e}", Stage::Source);
                self.record(&name, &stats, Err(&e));
                Err(e)
            }
        }
    }

    fn episode_date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Produce and publish one episode. Nothing is published on failure.
    pub async fn produce_episode(
        &self,
        articles: &[Article],
        cancel: &CancellationToken,
    ) -> Result<PodcastEpisode> {
        let t_start = Instant::now();
        let date = self.episode_date();
        let name = episode_name(&self.category, date, &self.format);
        let mut stats = RunStats {
            article_count: articles.len(),
            ..RunStats::default()
        };
        info!("Producing {name} from {} articles", articles.len());

        // Child token: a failure here cancels this run's in-flight calls only.
        let run_cancel = cancel.child_token();
        let result = self.run(articles, &name, &mut stats, &run_cancel).await;
        stats.total_ms = elapsed_ms(t_start);
        if result.is_err() {
            run_cancel.cancel();
        }

        self.record(
            &name,
            &stats,
            result
                .as_ref()
                .map(|(audio, publication)| (audio.len() as u64, publication)),
        );

        let (audio, publication) = match result {
            Ok(done) => done,
            Err(e) => {
                match e.stage() {
                    Some(stage) => error!("Run failed during {stage}: {e}"),
                    None => error!("Run failed: {e}"),
                }
                return Err(e);
            }
        };

        info!(
            "Episode {name} ready: {} lines, {} bytes ({}ms)",
            stats.line_count,
            audio.len(),
            stats.total_ms
        );

        Ok(PodcastEpisode {
            date: date.format("%Y-%m-%d").to_string(),
            name,
            audio,
            publication,
            stats,
        })
    }

    async fn run(
        &self,
        articles: &[Article],
        name: &str,
        stats: &mut RunStats,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, Publication)> {
        let t_dialogue = Instant::now();
        let script = self.build_script(articles, cancel).await?;
        stats.dialogue_ms = elapsed_ms(t_dialogue);

        let t_synth = Instant::now();
        let mut audio = Vec::new();
        let report = self
            .synthesizer
            .synthesize(segment(script.as_str()), &mut audio, cancel)
            .await?;
        stats.line_count = report.lines_written;
        stats.skipped_lines = report.lines_skipped;
        stats.synthesis_ms = elapsed_ms(t_synth);

        if audio.is_empty() {
            warn!("Episode {name} has no audio");
        }
        if cancel.is_cancelled() {
            return Err(PodcastError::Cancelled(Stage::Publish));
        }

        let t_publish = Instant::now();
        let publication = self
            .publisher
            .publish(name, &audio)
            .await
            .map_err(|source| PodcastError::Publish {
                name: name.to_string(),
                source,
            })?;
        stats.publish_ms = elapsed_ms(t_publish);

        Ok((audio, publication))
    }

    fn record(
        &self,
        name: &str,
        stats: &RunStats,
        outcome: std::result::Result<(u64, &Publication), &PodcastError>,
    ) {
        let Some(history) = &self.history else {
            return;
        };
        let (audio_bytes, location, failed_stage, error) = match outcome {
            Ok((audio_bytes, publication)) => {
                (audio_bytes, Some(publication.location.clone()), None, None)
            }
            Err(e) => (0, None, e.stage().map(|s| s.to_string()), Some(e.to_string())),
        };
        history.save(&RunRecord {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            episode: name.to_string(),
            article_count: stats.article_count,
            line_count: stats.line_count,
            skipped_lines: stats.skipped_lines,
            audio_bytes,
            dialogue_latency_ms: stats.dialogue_ms,
            synthesis_latency_ms: stats.synthesis_ms,
            publish_latency_ms: stats.publish_ms,
            total_latency_ms: stats.total_ms,
            location,
            failed_stage,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_name_uses_category_date_and_format() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            episode_name("general", date, "mp3"),
            "general_podcast_2024-05-01.mp3"
        );
        assert_eq!(
            episode_name("technology", date, "opus"),
            "technology_podcast_2024-05-01.opus"
        );
    }
}
