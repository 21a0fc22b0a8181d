use tracing::debug;

use crate::config::{ConnectionConfig, EnumConfig};
use crate::connection::{Dialer, response_analysis};
use crate::error::{ProbeError, TransportError};
use crate::output::Reporter;
use crate::retry::Attempt;
use crate::session::{Session, bootstrap};
use crate::target::{Candidate, ProbeStatus};

/// How probing one candidate ended.
///
/// Transport failures never show up here: they are retried, then resolved by a reconnect, and
/// once the reconnect budget is gone they become [`VerificationOutcome::Fatal`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified(String),
    NotVerified(String),
    Fatal(String),
}

impl VerificationOutcome {
    /// Any received reply is authoritative: `250 ` means the user exists, everything else does not.
    pub fn classify(reply: String) -> Self {
        if response_analysis::is_verified(&reply) {
            Self::Verified(reply)
        } else {
            Self::NotVerified(reply)
        }
    }

    pub fn status(&self) -> ProbeStatus {
        match self {
            Self::Verified(_) => ProbeStatus::Verified,
            Self::NotVerified(_) => ProbeStatus::NotVerified,
            Self::Fatal(_) => ProbeStatus::Fatal,
        }
    }

    // Server reply, or the failure detail for Fatal.
    pub fn text(&self) -> &str {
        match self {
            Self::Verified(text) | Self::NotVerified(text) | Self::Fatal(text) => text,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Probes candidates with a session of its own.
///
/// A worker creates one `Verifier` per candidate; the session is bootstrapped lazily,
/// re-bootstrapped after each failed round and closed when the candidate is done.
pub struct Verifier<'a, D: Dialer, R: Reporter + ?Sized> {
    dialer: &'a D,
    connection: &'a ConnectionConfig,
    enumeration: &'a EnumConfig,
    reporter: &'a R,
    session: Option<Session<D::Stream>>,
}

impl<'a, D: Dialer, R: Reporter + ?Sized> Verifier<'a, D, R> {
    pub fn new(
        dialer: &'a D,
        connection: &'a ConnectionConfig,
        enumeration: &'a EnumConfig,
        reporter: &'a R,
    ) -> Self {
        Self {
            dialer,
            connection,
            enumeration,
            reporter,
            session: None,
        }
    }

    pub async fn verify(&mut self, candidate: &Candidate) -> VerificationOutcome {
        let outcome = self.run(candidate).await;
        self.reporter.outcome(candidate.as_str(), &outcome);
        outcome
    }

    // Closes the session left open by the last `verify`.
    pub async fn finish(mut self) {
        if let Some(session) = self.session.take() {
            session.quit().await;
        }
    }

    async fn run(&mut self, candidate: &Candidate) -> VerificationOutcome {
        let command = self.enumeration.probe_command(candidate);
        let budget = self.enumeration.reconnect;

        for round in budget.rounds() {
            let mut session = match self.session.take() {
                Some(session) => session,
                None => match self.open().await {
                    Ok(session) => session,
                    Err(detail) => return VerificationOutcome::Fatal(detail),
                },
            };

            // verbose runs log every attempt instead
            if round.number == 1 && !self.enumeration.verbose {
                self.reporter.testing(candidate.as_str());
            }

            match self.probe(&mut session, &command, round).await {
                Ok(reply) => {
                    self.session = Some(session);
                    return VerificationOutcome::classify(reply);
                }
                Err(e) => {
                    session.close().await;
                    if round.is_last() {
                        return VerificationOutcome::Fatal(format!(
                            "giving up after {} reconnect(s): {e}",
                            budget.max_rounds()
                        ));
                    }
                    debug!("[Reconn {round}] {candidate}: {e}, reconnecting");
                }
            }
        }

        // `rounds()` always yields at least one round and every round returns on its last pass.
        VerificationOutcome::Fatal("no reconnect budget".to_string())
    }

    async fn open(&self) -> Result<Session<D::Stream>, String> {
        bootstrap(
            self.dialer,
            self.connection,
            self.enumeration.mode,
            self.reporter,
        )
        .await
        .map_err(|e| e.to_string())
    }

    // One round on one session: send with retries, then receive with retries.
    async fn probe(
        &self,
        session: &mut Session<D::Stream>,
        command: &str,
        round: Attempt,
    ) -> Result<String, ProbeError> {
        let policy = self.enumeration.retry;
        let limit = self.enumeration.timeout;

        let mut last: Option<TransportError> = None;
        let mut sent = false;
        for attempt in policy.attempts() {
            debug!("[Reconn {round}] [Retry {attempt}] Testing: {command} ...");
            match session.send_line(command, limit).await {
                Ok(()) => {
                    sent = true;
                    break;
                }
                Err(e) => last = Some(e),
            }
        }
        if !sent {
            return Err(ProbeError::Send {
                command: command.to_string(),
                attempts: policy.max_attempts(),
                source: last.unwrap_or(TransportError::Closed),
            });
        }

        let mut last: Option<TransportError> = None;
        for attempt in policy.attempts() {
            debug!("[Reconn {round}] [Retry {attempt}] Waiting for answer ...");
            match session.receive_line(limit).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    debug!("[Reconn {round}] [Retry {attempt}] {e}");
                    last = Some(e);
                }
            }
        }
        Err(ProbeError::Receive {
            command: command.to_string(),
            attempts: policy.max_attempts(),
            source: last.unwrap_or(TransportError::Closed),
        })
    }
}
