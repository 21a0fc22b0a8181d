//! SMTP user enumeration over VRFY, EXPN or RCPT TO.
//!
//! The interesting part is the connection lifecycle: every candidate runs on a session that went
//! through connect, banner, `HELO` and (for RCPT) `MAIL FROM`; sends and receives are retried on
//! the same connection, and once those retries run out the whole session is bootstrapped again
//! and the candidate is resumed, up to a reconnect budget.

pub mod app;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod input;
pub mod output;
pub mod retry;
pub mod session;
pub mod target;
pub mod verifier;

#[cfg(test)]
mod testing;
