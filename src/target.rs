use serde::{Deserialize, Serialize};
use std::fmt;

// A generated user name to probe.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Candidate(String);

impl Candidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // `user`, `user@domain`, optionally wrapped as `<...>`
    pub fn target(&self, domain: Option<&str>, wrap: bool) -> String {
        let address = match domain {
            Some(domain) => format!("{}@{domain}", self.0),
            None => self.0.clone(),
        };
        if wrap { format!("<{address}>") } else { address }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Every first name joined with every surname, first-name-major.
pub fn generate_candidates(firstnames: &[String], surnames: &[String]) -> Vec<Candidate> {
    let mut candidates = Vec::with_capacity(firstnames.len() * surnames.len());
    for first in firstnames {
        for last in surnames {
            candidates.push(Candidate::new(format!("{first}{last}")));
        }
    }
    candidates
}

// Final status of a probed candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    Verified,
    NotVerified,
    Fatal,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => write!(f, "VERIFIED"),
            Self::NotVerified => write!(f, "NOT_VERIFIED"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

// One line of the results file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub candidate: String,
    pub command: String,
    pub status: ProbeStatus,
    pub reply: String,
    pub response_time: u128, // milliseconds, whole candidate including reconnects
}
