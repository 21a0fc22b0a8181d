use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::cli::{EnumMode, OutputFormat};
use crate::target::{ProbeRecord, ProbeStatus};
use crate::verifier::VerificationOutcome;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Where the core sends everything the operator should see.
pub trait Reporter: Send + Sync {
    /// A server line received during bootstrap (banner, greeting, sender reply).
    fn server_line(&self, line: &str);
    /// The candidate is about to be probed.
    fn testing(&self, candidate: &str);
    fn outcome(&self, candidate: &str, outcome: &VerificationOutcome);
}

#[derive(Clone)]
pub struct OutputHandler {
    is_color: bool,
    verbose: bool,
    progress: Option<ProgressBar>,
}

impl OutputHandler {
    pub fn new(is_color: bool, verbose: bool) -> Self {
        if !is_color {
            colored::control::set_override(false);
        }
        Self {
            is_color,
            verbose,
            progress: None,
        }
    }

    // The bar doubles as the in-place "[TEST] user ..." indicator, so verbose runs go without it.
    pub fn start_progress(&mut self, total: usize) {
        if self.verbose {
            return;
        }
        let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
            .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("#>-"));
        let pb = ProgressBar::new(total as u64);
        pb.set_style(style);
        self.progress = Some(pb);
    }

    pub fn finish_progress(&self) {
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
    }

    pub fn abandon_progress(&self) {
        if let Some(pb) = &self.progress {
            pb.abandon();
        }
    }

    // Print without tearing the progress bar.
    fn emit(&self, print: impl FnOnce()) {
        match &self.progress {
            Some(pb) => pb.suspend(print),
            None => print(),
        }
    }

    /// `[SUCC] user  reply` / `[----] user  reply` / `[FAIL] user  detail`
    pub fn format_outcome(&self, candidate: &str, outcome: &VerificationOutcome) -> String {
        let (tag, text) = match outcome {
            VerificationOutcome::Verified(reply) => ("[SUCC]", reply),
            VerificationOutcome::NotVerified(reply) => ("[----]", reply),
            VerificationOutcome::Fatal(detail) => ("[FAIL]", detail),
        };
        let head = format!("{tag} {candidate:<30}");
        if !self.is_color {
            return format!("{head} {text}");
        }
        let head = match outcome {
            VerificationOutcome::Verified(_) => head.green().bold(),
            VerificationOutcome::NotVerified(_) => head.red(),
            VerificationOutcome::Fatal(_) => head.red().bold(),
        };
        format!("{head} {text}")
    }

    pub fn print_start(&self, mode: EnumMode) {
        println!("Start enumerating users with {mode} mode ...");
    }

    pub fn print_target_info(
        &self,
        host: &str,
        port: u16,
        mode: EnumMode,
        firstnames: usize,
        surnames: usize,
        threads: usize,
    ) {
        let label_width = 15;
        let separator = "-".repeat(label_width + 25);
        let separator = if self.is_color {
            separator.dimmed().to_string()
        } else {
            separator
        };

        eprintln!("{separator}");
        eprintln!("{:<label_width$}: {host}:{port}", "Target");
        eprintln!("{:<label_width$}: {mode}", "Mode");
        eprintln!(
            "{:<label_width$}: {} ({firstnames} first names x {surnames} surnames)",
            "Users",
            firstnames * surnames
        );
        eprintln!("{:<label_width$}: {threads}", "Workers");
        eprintln!("{separator}");
        eprintln!();
    }

    pub fn print_statistics(&self, verified: usize, not_verified: usize, fatal: usize) {
        let total = verified + not_verified + fatal;
        eprintln!();
        if self.is_color {
            eprintln!(
                "{} {} {} | {} {} | {} {} | {} {}",
                "STATS".bold(),
                "Total:".bold(),
                total.to_string().bold(),
                "Verified:".green().bold(),
                verified.to_string().green().bold(),
                "Not verified:".red().bold(),
                not_verified.to_string().red(),
                "Fatal:".yellow().bold(),
                fatal.to_string().yellow()
            );
        } else {
            eprintln!(
                "STATS Total: {total} | Verified: {verified} | Not verified: {not_verified} | Fatal: {fatal}"
            );
        }
    }

    /// Prints the verified users once more, after the run.
    pub fn print_verified_summary(&self, records: &[ProbeRecord]) {
        let verified: Vec<&ProbeRecord> = records
            .iter()
            .filter(|r| r.status == ProbeStatus::Verified)
            .collect();
        if verified.is_empty() {
            return;
        }
        eprintln!();
        eprintln!("Verified users:");
        for record in verified {
            let name = if self.is_color {
                record.candidate.green().bold().to_string()
            } else {
                record.candidate.clone()
            };
            eprintln!("  {name:<30} - {}", record.reply);
        }
    }

    pub async fn save_results_to_file(
        &self,
        records: &[ProbeRecord],
        path: &Path,
        format: OutputFormat,
    ) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path).await?);
        for record in records {
            let line = match format {
                OutputFormat::Json => serde_json::to_string(record).map_err(io::Error::other)?,
                OutputFormat::Text => format!(
                    "[{}] {} - {}",
                    record.status, record.candidate, record.reply
                ),
            };
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await
    }
}

impl Reporter for OutputHandler {
    // Shown regardless of verbosity.
    fn server_line(&self, line: &str) {
        self.emit(|| println!("{line}"));
    }

    fn testing(&self, candidate: &str) {
        if let Some(pb) = &self.progress {
            let message = format!("[TEST] {candidate} ...");
            pb.set_message(if self.is_color {
                message.yellow().to_string()
            } else {
                message
            });
        }
    }

    fn outcome(&self, candidate: &str, outcome: &VerificationOutcome) {
        let line = self.format_outcome(candidate, outcome);
        if outcome.is_fatal() {
            self.emit(|| eprintln!("{line}"));
        } else {
            self.emit(|| println!("{line}"));
        }
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }
}
