//! newscast: turn a batch of news articles into a two-host podcast episode.
//!
//! Articles go through an LLM to become `Alice:`/`Bob:` dialogue, the
//! dialogues are stitched into one script with transition narration, the
//! script is split into speaker lines, and every line is rendered by a TTS
//! backend into a single ordered audio stream.

pub mod config;
pub mod dialogue;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod publish;
pub mod retry;
pub mod script;
pub mod segment;
pub mod source;
pub mod synth;

pub use config::Config;
pub use dialogue::{ChatDialogueGenerator, DialogueGenerator, DialogueScript};
pub use error::{BackendError, PodcastError, Result, Stage};
pub use pipeline::{PodcastEpisode, PodcastPipeline};
pub use publish::{HttpPublisher, LocalPublisher, Publication, Publisher};
pub use script::{assemble, AssembledScript};
pub use segment::{segment, Speaker, SpeakerLine};
pub use source::{Article, ArticleSource, FileSource, NewsApiSource};
pub use synth::{AudioSynthesizer, OpenAiSpeech, SpeechBackend, SpeechRequest, VoiceMap};
