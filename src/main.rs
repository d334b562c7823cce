//! newscast-rs: daily two-host news podcast generator.

use clap::{Parser, Subcommand};
use newscast::config::Config;
use newscast::history::{default_history_dir, RunHistory};
use newscast::publish::content_type_for;
use newscast::{
    ArticleSource, ChatDialogueGenerator, FileSource, HttpPublisher, LocalPublisher,
    NewsApiSource, OpenAiSpeech, PodcastError, PodcastPipeline, Publisher,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "newscast-rs", about = "Daily two-host news podcast generator")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch articles, produce an episode and publish it (default)
    Run {
        /// Read articles from a JSON file instead of the news API
        #[arg(long)]
        articles: Option<PathBuf>,
    },
    /// Print the assembled script without synthesizing audio
    Script {
        #[arg(long)]
        articles: Option<PathBuf>,
    },
    /// Print the run report for a date (YYYY-MM-DD or "today")
    Report {
        #[arg(default_value = "today")]
        date: String,
    },
}

fn article_source(
    config: &Config,
    path: Option<PathBuf>,
) -> Result<Box<dyn ArticleSource>, PodcastError> {
    let source: Box<dyn ArticleSource> = match path {
        Some(path) => Box::new(FileSource::new(&path)),
        None => Box::new(
            NewsApiSource::new(config.news.clone()).map_err(PodcastError::SourceFetch)?,
        ),
    };
    Ok(source)
}

fn publisher(config: &Config) -> Result<Arc<dyn Publisher>, PodcastError> {
    if config.publish.backend == "http" {
        let content_type = content_type_for(&config.speech.format);
        let publisher = HttpPublisher::new(&config.publish, content_type)
            .map_err(|e| PodcastError::Config(e.to_string()))?;
        Ok(Arc::new(publisher))
    } else {
        Ok(Arc::new(LocalPublisher::new(config.publish.output_dir.clone())))
    }
}

fn pipeline(config: &Config) -> Result<PodcastPipeline, PodcastError> {
    let generator = ChatDialogueGenerator::new(config.dialogue.clone())
        .map_err(|e| PodcastError::Config(e.to_string()))?;
    let speech = OpenAiSpeech::new(config.speech.clone())
        .map_err(|e| PodcastError::Config(e.to_string()))?;
    let mut pipeline = PodcastPipeline::new(
        config,
        Arc::new(generator),
        Arc::new(speech),
        publisher(config)?,
    );
    if config.history.enabled {
        pipeline = pipeline.with_history(RunHistory::new(history_dir(config)));
    }
    Ok(pipeline)
}

fn history_dir(config: &Config) -> PathBuf {
    config.history.dir.clone().unwrap_or_else(default_history_dir)
}

/// Cancel the token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            token.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(args.config.as_deref())?;
    let env: HashMap<String, String> = std::env::vars().collect();
    config.apply_env(&env);

    match args.command.unwrap_or(Command::Run { articles: None }) {
        Command::Report { date } => {
            println!("{}", RunHistory::new(history_dir(&config)).generate_report(&date));
        }
        Command::Script { articles } => {
            let cancel = cancel_on_ctrl_c();
            let articles = article_source(&config, articles)?
                .fetch()
                .await
                .map_err(PodcastError::SourceFetch)?;
            let script = pipeline(&config)?.build_script(&articles, &cancel).await?;
            println!("{script}");
        }
        Command::Run { articles } => {
            let cancel = cancel_on_ctrl_c();
            let source = article_source(&config, articles)?;
            let episode = pipeline(&config)?
                .produce_episode_from(source.as_ref(), &cancel)
                .await?;
            match &episode.publication.url {
                Some(url) => info!("Podcast saved: {} ({url})", episode.name),
                None => info!("Podcast saved: {}", episode.publication.location),
            }
        }
    }

    Ok(())
}
