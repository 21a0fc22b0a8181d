use std::time::Duration;

use crate::cli::{Cli, EnumMode};
use crate::retry::{ReconnectBudget, RetryPolicy};
use crate::target::Candidate;

const FALLBACK_HELO: &str = "test";

/// How to reach the server and drive the opening sequence. Shared read-only by every worker.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub helo: String,
    pub from_mail: String,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

/// How each candidate is probed. Shared read-only by every worker.
#[derive(Clone, Debug)]
pub struct EnumConfig {
    pub mode: EnumMode,
    pub domain: Option<String>,
    pub wrap: bool,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub reconnect: ReconnectBudget,
    pub verbose: bool,
}

impl ConnectionConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let helo = cli.helo.clone().unwrap_or_else(|| {
            hostname::get().map_or_else(
                |_| FALLBACK_HELO.to_string(),
                |h| h.to_string_lossy().to_string(),
            )
        });
        Self {
            host: cli.host.clone(),
            port: cli.port,
            helo,
            from_mail: cli.from_mail.clone(),
            retry: RetryPolicy::new(cli.retry_init),
            timeout: Duration::from_secs(cli.timeout_init),
        }
    }

    pub fn greeting_command(&self) -> String {
        format!("HELO {}", self.helo)
    }

    pub fn sender_command(&self) -> String {
        format!("MAIL FROM: {}", self.from_mail)
    }
}

impl EnumConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let domain = cli
            .domain
            .as_deref()
            .map(|d| d.trim().trim_start_matches('@').to_string())
            .filter(|d| !d.is_empty());
        Self {
            mode: cli.mode,
            domain,
            wrap: cli.wrap,
            retry: RetryPolicy::new(cli.retry_enum),
            timeout: Duration::from_secs(cli.timeout_enum),
            reconnect: ReconnectBudget::new(cli.reconnect),
            verbose: cli.verbose,
        }
    }

    /// The probe line for one candidate, e.g. `VRFY alice` or `RCPT TO:<bob@example.com>`.
    pub fn probe_command(&self, candidate: &Candidate) -> String {
        let target = candidate.target(self.domain.as_deref(), self.wrap);
        match self.mode {
            EnumMode::Rcpt => format!("RCPT TO:{target}"),
            mode => format!("{} {target}", mode.verb()),
        }
    }
}
