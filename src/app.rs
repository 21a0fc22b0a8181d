use anyhow::{Context, bail};
use colored::Colorize;
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tokio::signal;

use crate::cli::Cli;
use crate::config::{ConnectionConfig, EnumConfig};
use crate::connection::{Dialer, TcpDialer};
use crate::input::InputSource;
use crate::output::{OutputHandler, Reporter};
use crate::target::{Candidate, ProbeRecord, ProbeStatus, generate_candidates};
use crate::verifier::Verifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    // `fatal` candidates could not be tested at all.
    Completed { fatal: usize },
    Interrupted,
}

pub struct App {
    cli: Cli,
    output_handler: OutputHandler,
}

impl App {
    pub fn new(cli: Cli) -> Self {
        let output_handler = OutputHandler::new(cli.is_color, cli.verbose);
        Self {
            cli,
            output_handler,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<RunStatus> {
        let firstnames = load_names(&self.cli.firstnames)
            .await
            .context("loading first names")?;
        let surnames = load_names(&self.cli.surnames)
            .await
            .context("loading surnames")?;
        let candidates = generate_candidates(&firstnames, &surnames);
        if candidates.is_empty() {
            bail!("no users to test: both wordlists need at least one entry");
        }

        let connection = ConnectionConfig::from_cli(&self.cli);
        let enumeration = EnumConfig::from_cli(&self.cli);
        let workers = usize::try_from(self.cli.threads)
            .unwrap_or(usize::MAX)
            .clamp(1, candidates.len());

        self.output_handler.print_target_info(
            &connection.host,
            connection.port,
            enumeration.mode,
            firstnames.len(),
            surnames.len(),
            workers,
        );
        self.output_handler.print_start(enumeration.mode);
        self.output_handler.start_progress(candidates.len());

        let dialer = TcpDialer;
        let records = tokio::select! {
            biased;
            () = interrupted() => {
                self.output_handler.abandon_progress();
                println!();
                return Ok(RunStatus::Interrupted);
            }
            records = dispatch(
                &dialer,
                &connection,
                &enumeration,
                &self.output_handler,
                &candidates,
                workers,
            ) => records,
        };
        self.output_handler.finish_progress();

        let count = |status: ProbeStatus| records.iter().filter(|r| r.status == status).count();
        let fatal = count(ProbeStatus::Fatal);
        self.output_handler.print_statistics(
            count(ProbeStatus::Verified),
            count(ProbeStatus::NotVerified),
            fatal,
        );
        self.output_handler.print_verified_summary(&records);

        if let Some(path) = &self.cli.output_file {
            match self
                .output_handler
                .save_results_to_file(&records, path, self.cli.output_format)
                .await
            {
                Ok(()) => eprintln!(
                    "{} Results saved to {}",
                    "[+]".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => eprintln!("{} Error writing results to file: {e}", "[-]".red().bold()),
            }
        }

        Ok(RunStatus::Completed { fatal })
    }
}

async fn load_names(input: &str) -> anyhow::Result<Vec<String>> {
    let input = input.to_string();
    let values = tokio::task::spawn_blocking(move || InputSource::new(&input)?.load_values())
        .await
        .context("wordlist loading panicked")??;
    Ok(values)
}

// Resolves on Ctrl+C; never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(err) = signal::ctrl_c().await {
        eprintln!("Unable to listen for Ctrl+C: {err}");
        std::future::pending::<()>().await;
    }
}

/// Runs `workers` concurrent verifiers over `candidates`.
///
/// Each candidate gets its own [`Verifier`] and therefore its own session. A fatal candidate is
/// recorded like any other; the rest keep being dispatched. Records come back in completion order.
pub async fn dispatch<D, R>(
    dialer: &D,
    connection: &ConnectionConfig,
    enumeration: &EnumConfig,
    reporter: &R,
    candidates: &[Candidate],
    workers: usize,
) -> Vec<ProbeRecord>
where
    D: Dialer,
    R: Reporter + ?Sized,
{
    stream::iter(candidates)
        .map(|candidate| async move {
            let start = Instant::now();
            let mut verifier = Verifier::new(dialer, connection, enumeration, reporter);
            let outcome = verifier.verify(candidate).await;
            verifier.finish().await;
            ProbeRecord {
                candidate: candidate.to_string(),
                command: enumeration.probe_command(candidate),
                status: outcome.status(),
                reply: outcome.text().to_string(),
                response_time: start.elapsed().as_millis(),
            }
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::EnumMode;
    use crate::retry::{ReconnectBudget, RetryPolicy};
    use crate::testing::{FakeDialer, RecordingReporter, Reply};
    use clap::Parser;
    use std::time::Duration;

    #[tokio::test]
    async fn blank_first_name_is_a_usage_error() {
        let cli =
            Cli::try_parse_from(["smtprobe", "-F", "", "-S", "doe", "127.0.0.1", "25"]).unwrap();
        let err = App::new(cli).run().await.unwrap_err();
        assert!(err.to_string().starts_with("no users to test"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_candidate_does_not_stop_the_others() {
        // "ghost" makes the server hang up, everybody else gets an answer
        let dialer = FakeDialer::smtp(|_, command| match command {
            "VRFY ghost" => Reply::Hangup,
            c if c.starts_with("VRFY root") => Reply::line("250 2.1.5 root"),
            _ => Reply::line("550 5.1.1 unknown"),
        });
        let connection = ConnectionConfig {
            host: "mx.example.com".to_string(),
            port: 25,
            helo: "test".to_string(),
            from_mail: "user@example.com".to_string(),
            retry: RetryPolicy::new(2),
            timeout: Duration::from_secs(25),
        };
        let enumeration = EnumConfig {
            mode: EnumMode::Vrfy,
            domain: None,
            wrap: false,
            retry: RetryPolicy::new(2),
            timeout: Duration::from_secs(10),
            reconnect: ReconnectBudget::new(2),
            verbose: false,
        };
        let reporter = RecordingReporter::default();
        let candidates: Vec<Candidate> = ["root", "ghost", "nobody"]
            .into_iter()
            .map(Candidate::new)
            .collect();

        let mut records = dispatch(
            &dialer,
            &connection,
            &enumeration,
            &reporter,
            &candidates,
            2,
        )
        .await;
        records.sort_by(|a, b| a.candidate.cmp(&b.candidate));

        let statuses: Vec<(&str, ProbeStatus)> = records
            .iter()
            .map(|r| (r.candidate.as_str(), r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("ghost", ProbeStatus::Fatal),
                ("nobody", ProbeStatus::NotVerified),
                ("root", ProbeStatus::Verified),
            ]
        );
        // root and nobody once each, ghost once per reconnect round
        assert_eq!(dialer.connections(), 4);
        assert_eq!(reporter.outcomes.lock().unwrap().len(), 3);
    }
}
