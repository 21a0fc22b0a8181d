use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

// Failures of a single transport primitive. All of them are retryable.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no address found for {host}")]
    NoAddress { host: String },

    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection to {addr} timed out after {}s", .timeout.as_secs())]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("send timed out after {}s", .0.as_secs())]
    SendTimeout(Duration),

    #[error("timed out after {}s waiting for a reply", .0.as_secs())]
    ReceiveTimeout(Duration),

    #[error("upstream connection is gone while receiving")]
    Closed,

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),
}

// The step of the opening sequence that was being driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Connect,
    Banner,
    Greeting,
    GreetingReply,
    SenderDeclaration,
    SenderReply,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Banner => "banner",
            Self::Greeting => "greeting",
            Self::GreetingReply => "greeting reply",
            Self::SenderDeclaration => "MAIL FROM",
            Self::SenderReply => "MAIL FROM reply",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("server replied: {0}")]
    Rejected(String),
}

/// Bootstrap exhausted its retry budget on one step. Always fatal for the worker.
#[derive(Debug, Error)]
#[error("{step} failed after {attempts} attempt(s): {cause}")]
pub struct BootstrapError {
    pub step: Step,
    pub attempts: u32,
    #[source]
    pub cause: FailureCause,
}

impl BootstrapError {
    pub fn new(step: Step, attempts: u32, cause: impl Into<FailureCause>) -> Self {
        Self {
            step,
            attempts,
            cause: cause.into(),
        }
    }
}

// A probe that could not be delivered on the current session. Resolved by reconnecting.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("sending '{command}' failed after {attempts} attempt(s): {source}")]
    Send {
        command: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("no reply to '{command}' after {attempts} attempt(s): {source}")]
    Receive {
        command: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
}
