//! Session bootstrap: connect, banner, greeting and, in RCPT mode, the sender declaration.
//!
//! Each step gets `ConnectionConfig::retry` attempts with `ConnectionConfig::timeout`. There is
//! no outer reconnect here: a step that exhausts its attempts fails the whole bootstrap, and the
//! connection is shut down before the error is returned.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::cli::EnumMode;
use crate::config::ConnectionConfig;
use crate::connection::{Connection, Dialer, response_analysis};
use crate::error::{BootstrapError, FailureCause, Step, TransportError};
use crate::output::Reporter;
use crate::retry::RetryPolicy;

/// How far the opening sequence has progressed. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Connected,
    BannerRead,
    GreetingSent,
    SenderDeclared,
    Ready,
}

/// The server lines received while bootstrapping, for the operator to see.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Handshake {
    pub banner: String,
    pub greeting: String,
    pub sender_reply: Option<String>,
}

impl Handshake {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        [Some(self.banner.as_str()), Some(self.greeting.as_str())]
            .into_iter()
            .chain(std::iter::once(self.sender_reply.as_deref()))
            .flatten()
    }
}

/// A connection that went through the opening sequence. Owned by exactly one worker.
pub struct Session<S> {
    conn: Connection<S>,
    phase: Phase,
    handshake: Handshake,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "phase {next:?} after {:?}", self.phase);
        self.phase = next;
    }

    pub async fn send_line(&mut self, text: &str, limit: Duration) -> Result<(), TransportError> {
        debug_assert_eq!(self.phase, Phase::Ready);
        self.conn.send_line(text, limit).await
    }

    pub async fn receive_line(&mut self, limit: Duration) -> Result<String, TransportError> {
        debug_assert_eq!(self.phase, Phase::Ready);
        self.conn.receive_line(limit).await
    }

    // Normal end of use.
    pub async fn quit(self) {
        self.conn.quit().await;
    }

    // Teardown after a transport failure.
    pub async fn close(self) {
        self.conn.close().await;
    }

    async fn send_step(
        &mut self,
        step: Step,
        command: &str,
        policy: RetryPolicy,
        limit: Duration,
    ) -> Result<(), BootstrapError> {
        let mut last = None;
        for attempt in policy.attempts() {
            debug!("[{attempt}] Sending {step}: {command}");
            match self.conn.send_line(command, limit).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!("[{attempt}] {step} not sent: {e}");
                    last = Some(e);
                }
            }
        }
        Err(exhausted(step, policy, last))
    }

    async fn receive_step(
        &mut self,
        step: Step,
        policy: RetryPolicy,
        limit: Duration,
    ) -> Result<String, BootstrapError> {
        let mut last = None;
        for attempt in policy.attempts() {
            debug!("[{attempt}] Waiting for {step} ...");
            match self.conn.receive_line(limit).await {
                Ok(line) => return Ok(line),
                Err(e) => {
                    debug!("[{attempt}] No {step}: {e}");
                    last = Some(e);
                }
            }
        }
        Err(exhausted(step, policy, last))
    }

    // Waits for a 250 to MAIL FROM. Other replies use up attempts like transport failures do.
    async fn sender_reply_step(
        &mut self,
        policy: RetryPolicy,
        limit: Duration,
    ) -> Result<String, BootstrapError> {
        let step = Step::SenderReply;
        let mut last: Option<FailureCause> = None;
        for attempt in policy.attempts() {
            debug!("[{attempt}] Waiting for {step} ...");
            match self.conn.receive_line(limit).await {
                Ok(reply) if response_analysis::is_success_class(&reply) => return Ok(reply),
                Ok(reply) => {
                    debug!(
                        "[{attempt}] {step} not accepted ({}): {reply}",
                        response_analysis::status_code(&reply).unwrap_or("no status")
                    );
                    last = Some(FailureCause::Rejected(reply));
                }
                Err(e) => {
                    debug!("[{attempt}] No {step}: {e}");
                    last = Some(e.into());
                }
            }
        }
        Err(BootstrapError::new(
            step,
            policy.max_attempts(),
            last.unwrap_or_else(|| TransportError::Closed.into()),
        ))
    }

    // Each server line goes to the reporter as soon as it is received, so the operator still
    // sees the banner when a later step fails.
    async fn handshake_steps<R: Reporter + ?Sized>(
        &mut self,
        config: &ConnectionConfig,
        mode: EnumMode,
        reporter: &R,
    ) -> Result<(), BootstrapError> {
        let (policy, limit) = (config.retry, config.timeout);

        let banner = self.receive_step(Step::Banner, policy, limit).await?;
        reporter.server_line(&banner);
        self.handshake.banner = banner;
        self.advance(Phase::BannerRead);

        self.send_step(Step::Greeting, &config.greeting_command(), policy, limit)
            .await?;
        self.advance(Phase::GreetingSent);
        let greeting = self.receive_step(Step::GreetingReply, policy, limit).await?;
        reporter.server_line(&greeting);
        self.handshake.greeting = greeting;

        if mode.needs_sender() {
            self.send_step(
                Step::SenderDeclaration,
                &config.sender_command(),
                policy,
                limit,
            )
            .await?;
            let reply = self.sender_reply_step(policy, limit).await?;
            reporter.server_line(&reply);
            self.handshake.sender_reply = Some(reply);
            self.advance(Phase::SenderDeclared);
        }

        self.advance(Phase::Ready);
        Ok(())
    }
}

fn exhausted(step: Step, policy: RetryPolicy, last: Option<TransportError>) -> BootstrapError {
    BootstrapError::new(
        step,
        policy.max_attempts(),
        last.unwrap_or(TransportError::Closed),
    )
}

/// Drives the full opening sequence and returns a [`Phase::Ready`] session.
///
/// Banner, greeting reply and accepted sender reply are passed to `reporter` as they arrive.
pub async fn bootstrap<D, R>(
    dialer: &D,
    config: &ConnectionConfig,
    mode: EnumMode,
    reporter: &R,
) -> Result<Session<D::Stream>, BootstrapError>
where
    D: Dialer,
    R: Reporter + ?Sized,
{
    let policy = config.retry;
    let mut stream = None;
    let mut last = None;
    for attempt in policy.attempts() {
        debug!(
            "[{attempt}] Connecting to {}:{} ...",
            config.host, config.port
        );
        match dialer.dial(&config.host, config.port, config.timeout).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => {
                debug!("[{attempt}] Connect failed: {e}");
                last = Some(e);
            }
        }
    }
    let Some(stream) = stream else {
        return Err(exhausted(Step::Connect, policy, last));
    };

    let mut session = Session {
        conn: Connection::new(stream),
        phase: Phase::Connected,
        handshake: Handshake::default(),
    };
    match session.handshake_steps(config, mode, reporter).await {
        Ok(()) => Ok(session),
        Err(e) => {
            session.close().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDialer, RecordingReporter, Reply};
    use tokio::io::DuplexStream;

    fn config(retry: u32) -> ConnectionConfig {
        ConnectionConfig {
            host: "mx.example.com".to_string(),
            port: 25,
            helo: "test".to_string(),
            from_mail: "user@example.com".to_string(),
            retry: RetryPolicy::new(retry),
            timeout: Duration::from_secs(25),
        }
    }

    async fn start(
        dialer: &FakeDialer,
        retry: u32,
        mode: EnumMode,
    ) -> Result<Session<DuplexStream>, BootstrapError> {
        bootstrap(dialer, &config(retry), mode, &RecordingReporter::default()).await
    }

    #[tokio::test(start_paused = true)]
    async fn vrfy_mode_skips_sender_declaration() {
        let dialer = FakeDialer::smtp(|_, _| Reply::line("250 ok"));
        let session = start(&dialer, 4, EnumMode::Vrfy).await.unwrap();

        assert_eq!(session.phase(), Phase::Ready);
        assert_eq!(
            session.handshake().lines().collect::<Vec<_>>(),
            vec!["220 mx.example.com ESMTP", "250 mx.example.com"]
        );
        assert_eq!(dialer.commands(), vec!["HELO test"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rcpt_mode_declares_sender() {
        let dialer = FakeDialer::smtp(|_, _| Reply::line("250 ok"));
        let session = start(&dialer, 4, EnumMode::Rcpt).await.unwrap();

        assert_eq!(session.phase(), Phase::Ready);
        assert_eq!(
            session.handshake().sender_reply.as_deref(),
            Some("250 2.1.0 Sender OK")
        );
        assert_eq!(
            dialer.commands(),
            vec!["HELO test", "MAIL FROM: user@example.com"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sender_accepted_after_unexpected_replies() {
        let dialer = FakeDialer::new(|_, command| match command {
            "" => Reply::line("220 ready"),
            c if c.starts_with("HELO") => Reply::line("250 hi"),
            _ => Reply::Lines(vec![
                "451 Try again".to_string(),
                "250 2.1.0 Sender OK".to_string(),
            ]),
        });
        let session = start(&dialer, 4, EnumMode::Rcpt).await.unwrap();
        assert_eq!(
            session.handshake().sender_reply.as_deref(),
            Some("250 2.1.0 Sender OK")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sender_rejected_until_exhausted_is_fatal() {
        let dialer = FakeDialer::new(|_, command| match command {
            "" => Reply::line("220 ready"),
            c if c.starts_with("HELO") => Reply::line("250 hi"),
            _ => Reply::Lines(vec!["550 Sender rejected".to_string(); 4]),
        });
        let err = start(&dialer, 4, EnumMode::Rcpt)
            .await
            .err()
            .unwrap();

        assert_eq!(err.step, Step::SenderReply);
        assert_eq!(err.attempts, 4);
        assert!(
            matches!(&err.cause, FailureCause::Rejected(reply) if reply == "550 Sender rejected")
        );
        assert_eq!(dialer.connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lines_received_before_a_failed_step_are_reported() {
        let dialer = FakeDialer::new(|_, command| match command {
            "" => Reply::line("220 ready"),
            c if c.starts_with("HELO") => Reply::line("250 hi"),
            _ => Reply::Lines(vec!["550 Sender rejected".to_string(); 2]),
        });
        let reporter = RecordingReporter::default();
        let err = bootstrap(&dialer, &config(2), EnumMode::Rcpt, &reporter)
            .await
            .err()
            .unwrap();

        assert_eq!(err.step, Step::SenderReply);
        assert_eq!(
            *reporter.server_lines.lock().unwrap(),
            vec!["220 ready", "250 hi"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_retries_then_succeeds() {
        let dialer = FakeDialer::smtp(|_, _| Reply::Silent).refusing_first(3);
        let session = start(&dialer, 4, EnumMode::Vrfy).await.unwrap();
        assert_eq!(session.phase(), Phase::Ready);
        assert_eq!(dialer.dials(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_exhausted_is_fatal() {
        let dialer = FakeDialer::smtp(|_, _| Reply::Silent).refusing_first(10);
        let err = start(&dialer, 4, EnumMode::Vrfy)
            .await
            .err()
            .unwrap();
        assert_eq!(err.step, Step::Connect);
        assert_eq!(dialer.dials(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_banner_is_retried_on_the_same_connection() {
        let dialer = FakeDialer::new(|_, command| match command {
            "" => Reply::Delayed(Duration::from_secs(60), vec!["220 slow".to_string()]),
            _ => Reply::line("250 hi"),
        });
        let session = start(&dialer, 4, EnumMode::Vrfy).await.unwrap();
        assert_eq!(session.handshake().banner, "220 slow");
        assert_eq!(dialer.connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_banner_is_fatal() {
        let dialer = FakeDialer::new(|_, _| Reply::Hangup);
        let err = start(&dialer, 2, EnumMode::Vrfy)
            .await
            .err()
            .unwrap();
        assert_eq!(err.step, Step::Banner);
        assert!(matches!(
            err.cause,
            FailureCause::Transport(TransportError::Closed)
        ));
    }
}
