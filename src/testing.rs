//! Scripted in-memory SMTP peers for unit tests.
//!
//! [`FakeDialer`] hands out one half of a `tokio::io::duplex` pipe per dial and spawns a task
//! that plays the server on the other half. The script decides, per connection index and per
//! received command line, what the server does. Connection index 0 is the first dial.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, WriteHalf, duplex};

use crate::connection::Dialer;
use crate::error::TransportError;
use crate::output::Reporter;
use crate::verifier::VerificationOutcome;

const LINE_GAP: Duration = Duration::from_millis(10);

pub enum Reply {
    Lines(Vec<String>),
    Delayed(Duration, Vec<String>),
    Silent,
    Hangup,
    // Answer, then close both directions before the client writes again.
    LinesThenHangup(Vec<String>),
}

impl Reply {
    pub fn line(text: &str) -> Self {
        Self::Lines(vec![text.to_string()])
    }
}

// `(connection index, command)`; the banner is requested with an empty command.
type Script = dyn Fn(usize, &str) -> Reply + Send + Sync;

pub struct FakeDialer {
    script: Arc<Script>,
    refuse_first: usize,
    dials: AtomicUsize,
    commands: Arc<Mutex<Vec<(usize, String)>>>,
}

impl FakeDialer {
    pub fn new(script: impl Fn(usize, &str) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            refuse_first: 0,
            dials: AtomicUsize::new(0),
            commands: Arc::default(),
        }
    }

    // A plain server answering 220 / 250 to everything except the probe verb.
    pub fn smtp(probe: impl Fn(usize, &str) -> Reply + Send + Sync + 'static) -> Self {
        Self::new(move |conn, command| match command {
            "" => Reply::line("220 mx.example.com ESMTP"),
            c if c.starts_with("HELO") => Reply::line("250 mx.example.com"),
            c if c.starts_with("MAIL FROM") => Reply::line("250 2.1.0 Sender OK"),
            c => probe(conn, c),
        })
    }

    pub fn refusing_first(mut self, refused: usize) -> Self {
        self.refuse_first = refused;
        self
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    // Successful dials, i.e. connections the server side saw.
    pub fn connections(&self) -> usize {
        self.dials().saturating_sub(self.refuse_first)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }
}

impl Dialer for FakeDialer {
    type Stream = DuplexStream;

    async fn dial(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<DuplexStream, TransportError> {
        let n = self.dials.fetch_add(1, Ordering::SeqCst);
        if n < self.refuse_first {
            return Err(TransportError::Connect {
                addr: format!("{host}:{port}"),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        let conn = n - self.refuse_first;
        let (client, server) = duplex(8192);
        tokio::spawn(serve(
            server,
            conn,
            Arc::clone(&self.script),
            Arc::clone(&self.commands),
        ));
        Ok(client)
    }
}

async fn serve(
    stream: DuplexStream,
    conn: usize,
    script: Arc<Script>,
    commands: Arc<Mutex<Vec<(usize, String)>>>,
) {
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();

    if !respond(&mut write, script(conn, "")).await {
        return;
    }
    while let Ok(Some(line)) = lines.next_line().await {
        commands.lock().unwrap().push((conn, line.clone()));
        if !respond(&mut write, script(conn, &line)).await {
            return;
        }
    }
}

async fn respond(write: &mut WriteHalf<DuplexStream>, reply: Reply) -> bool {
    let lines = match reply {
        Reply::Lines(lines) => lines,
        Reply::LinesThenHangup(lines) => {
            for line in lines {
                if write.write_all(format!("{line}\r\n").as_bytes()).await.is_err() {
                    break;
                }
            }
            return false;
        }
        Reply::Delayed(delay, lines) => {
            tokio::time::sleep(delay).await;
            lines
        }
        Reply::Silent => return true,
        Reply::Hangup => return false,
    };
    for line in lines {
        if write.write_all(format!("{line}\r\n").as_bytes()).await.is_err() {
            return false;
        }
        tokio::time::sleep(LINE_GAP).await;
    }
    true
}

// Collects everything the core reports.
#[derive(Default)]
pub struct RecordingReporter {
    pub server_lines: Mutex<Vec<String>>,
    pub tested: Mutex<Vec<String>>,
    pub outcomes: Mutex<Vec<(String, VerificationOutcome)>>,
}

impl Reporter for RecordingReporter {
    fn server_line(&self, line: &str) {
        self.server_lines.lock().unwrap().push(line.to_string());
    }

    fn testing(&self, candidate: &str) {
        self.tested.lock().unwrap().push(candidate.to_string());
    }

    fn outcome(&self, candidate: &str, outcome: &VerificationOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .push((candidate.to_string(), outcome.clone()));
    }
}
