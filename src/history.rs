//! Run history and reporting.
//!
//! Every run, successful or not, appends one record to a daily JSONL file
//! (`<dir>/YYYY-MM-DD.jsonl`). `generate_report` turns a day into Markdown.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Default directory for history JSONL files.
pub fn default_history_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".newscast-history")
}

fn resolve_date(date: &str) -> String {
    if date == "today" {
        Local::now().format("%Y-%m-%d").to_string()
    } else {
        date.to_string()
    }
}

fn history_file(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("{}.jsonl", resolve_date(date)))
}

/// One pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: String,
    pub episode: String,
    pub article_count: usize,
    pub line_count: usize,
    pub skipped_lines: usize,
    pub audio_bytes: u64,
    pub dialogue_latency_ms: i64,
    pub synthesis_latency_ms: i64,
    pub publish_latency_ms: i64,
    pub total_latency_ms: i64,
    pub location: Option<String>,
    pub failed_stage: Option<String>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub struct RunHistory {
    dir: PathBuf,
}

impl RunHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Append a record to the file for the record's own date. Failures are
    /// logged; history never fails a run.
    pub fn save(&self, record: &RunRecord) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            error!("Failed to create history dir: {e}");
            return;
        }

        let date = record
            .timestamp
            .get(..10)
            .map(str::to_string)
            .unwrap_or_else(|| resolve_date("today"));
        let path = history_file(&self.dir, &date);
        match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => match serde_json::to_string(record) {
                Ok(json) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        error!("Failed to write history record: {e}");
                    } else {
                        debug!("Saved run record to {}", path.display());
                    }
                }
                Err(e) => error!("Failed to serialize record: {e}"),
            },
            Err(e) => error!("Failed to open history file: {e}"),
        }
    }

    pub fn load(&self, date: &str) -> Vec<RunRecord> {
        let path = history_file(&self.dir, date);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        std::io::BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<RunRecord>(&line) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!("Skipping malformed history line: {e}");
                    None
                }
            })
            .collect()
    }

    /// Dates with history, newest first.
    pub fn list_dates(&self) -> Vec<String> {
        let mut dates: Vec<String> = fs::read_dir(&self.dir)
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let name = entry.ok()?.file_name().to_string_lossy().to_string();
                name.strip_suffix(".jsonl").map(str::to_string)
            })
            .collect();
        dates.sort_by(|a, b| b.cmp(a));
        dates
    }

    /// Markdown report for one date.
    pub fn generate_report(&self, date: &str) -> String {
        let display_date = resolve_date(date);
        let records = self.load(date);

        if records.is_empty() {
            return format!("# Newscast Report - {display_date}\n\nNo runs recorded.");
        }

        let succeeded: Vec<&RunRecord> = records.iter().filter(|r| r.succeeded()).collect();
        let failed = records.len() - succeeded.len();
        let avg = |f: fn(&RunRecord) -> i64| -> f64 {
            if succeeded.is_empty() {
                0.0
            } else {
                succeeded.iter().map(|r| f(r) as f64).sum::<f64>() / succeeded.len() as f64
            }
        };
        let total_bytes: u64 = succeeded.iter().map(|r| r.audio_bytes).sum();

        let mut lines = vec![
            format!("# Newscast Report - {display_date}"),
            String::new(),
            "## Summary".to_string(),
            format!("- **Runs**: {}", records.len()),
            format!("- **Succeeded**: {}", succeeded.len()),
            format!("- **Failed**: {failed}"),
            format!("- **Audio produced**: {}", format_bytes(total_bytes)),
            String::new(),
            "## Latency Averages".to_string(),
            format!("- Dialogue: {:.0}ms", avg(|r| r.dialogue_latency_ms)),
            format!("- Synthesis: {:.0}ms", avg(|r| r.synthesis_latency_ms)),
            format!("- Publish: {:.0}ms", avg(|r| r.publish_latency_ms)),
            format!("- Total: {:.0}ms", avg(|r| r.total_latency_ms)),
            String::new(),
            "## Runs".to_string(),
            String::new(),
            "| Time | Episode | Articles | Lines | Result |".to_string(),
            "|------|---------|----------|-------|--------|".to_string(),
        ];

        for r in &records {
            let time_str = r.timestamp.get(11..19).unwrap_or(&r.timestamp);
            let result = match (&r.failed_stage, &r.error) {
                (_, None) => "ok".to_string(),
                (Some(stage), Some(e)) => format!("{stage}: {}", truncate(e, 40)),
                (None, Some(e)) => truncate(e, 40),
            };
            lines.push(format!(
                "| {time_str} | {} | {} | {} | {result} |",
                r.episode, r.article_count, r.line_count
            ));
        }

        lines.join("\n")
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: &str, episode: &str, error: Option<&str>) -> RunRecord {
        RunRecord {
            timestamp: timestamp.into(),
            episode: episode.into(),
            article_count: 3,
            line_count: 12,
            audio_bytes: 2048,
            dialogue_latency_ms: 1000,
            synthesis_latency_ms: 3000,
            total_latency_ms: 4200,
            failed_stage: error.map(|_| "synthesis".to_string()),
            error: error.map(str::to_string),
            ..RunRecord::default()
        }
    }

    #[test]
    fn save_then_load_by_record_date() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path());
        let first = record("2024-05-01T06:00:00.000", "general_podcast_2024-05-01.mp3", None);
        let second = record("2024-05-01T07:30:00.000", "general_podcast_2024-05-01.mp3", Some("boom"));
        history.save(&first);
        history.save(&second);

        assert_eq!(history.load("2024-05-01"), vec![first, second]);
        assert!(history.load("2024-05-02").is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path());
        history.save(&record("2024-05-01T06:00:00.000", "ep.mp3", None));
        let path = dir.path().join("2024-05-01.jsonl");
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        assert_eq!(history.load("2024-05-01").len(), 1);
    }

    #[test]
    fn dates_listed_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path());
        history.save(&record("2024-05-01T06:00:00.000", "a.mp3", None));
        history.save(&record("2024-05-03T06:00:00.000", "c.mp3", None));
        history.save(&record("2024-05-02T06:00:00.000", "b.mp3", None));
        assert_eq!(history.list_dates(), vec!["2024-05-03", "2024-05-02", "2024-05-01"]);
    }

    #[test]
    fn report_counts_successes_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path());
        history.save(&record("2024-05-01T06:00:00.000", "general_podcast_2024-05-01.mp3", None));
        history.save(&record(
            "2024-05-01T07:00:00.000",
            "general_podcast_2024-05-01.mp3",
            Some("speech synthesis failed at line 2"),
        ));

        let report = history.generate_report("2024-05-01");
        assert!(report.starts_with("# Newscast Report - 2024-05-01"));
        assert!(report.contains("- **Runs**: 2"));
        assert!(report.contains("- **Succeeded**: 1"));
        assert!(report.contains("- **Failed**: 1"));
        assert!(report.contains("- Synthesis: 3000ms"));
        assert!(report.contains("| 06:00:00 | general_podcast_2024-05-01.mp3 | 3 | 12 | ok |"));
        assert!(report.contains("synthesis: speech synthesis failed at line 2"));
    }

    #[test]
    fn empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = RunHistory::new(dir.path()).generate_report("2024-01-01");
        assert!(report.contains("No runs recorded."));
    }

    #[test]
    fn helpers() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer message", 10), "a much ...");
    }
}
