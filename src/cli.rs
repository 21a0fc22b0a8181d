use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "SMTP user enumeration tool with clever timeout, retry and reconnect functionality",
    long_about = "SMTP user enumeration tool with clever timeout, retry and reconnect functionality.

Some SMTP servers take a long time for the initial communication (banner and greeting) and then
handle subsequent commands quite fast, until they randomly become slow again. Timeouts and retries
can therefore be tuned separately for the initial communication and for the enumeration.

When a server stops answering (for example after '421 Too many errors on this connection') the
session is transparently re-established and enumeration continues where it left off."
)]
pub struct Cli {
    // Required Connection Parameters
    /// Target host (IP address or hostname)
    #[arg(help = "IP or hostname to connect to")]
    pub host: String,

    /// Target port
    #[arg(help = "Port to connect to", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    // Enumeration Parameters
    /// Enumeration mode
    #[arg(short, long, value_enum, ignore_case = true, default_value = "vrfy")]
    pub mode: EnumMode,

    /// Domain to append to users to turn them into email addresses.
    /// Useful if you see '550 A valid address is required'
    #[arg(short, long)]
    pub domain: Option<String>,

    /// Wrap the user or email address in '<' and '>'.
    /// Useful if you see '501 5.5.2 Syntax error in parameters or arguments'
    #[arg(short, long)]
    pub wrap: bool,

    /// MAIL FROM address, only used in RCPT mode
    #[arg(short = 'f', long, default_value = "user@example.com")]
    pub from_mail: String,

    /// HELO token (defaults to the local host name)
    #[arg(short = 'l', long)]
    pub helo: Option<String>,

    /// First names: path to a newline separated wordlist or a single value
    #[arg(short = 'F', long)]
    pub firstnames: String,

    /// Surnames: path to a newline separated wordlist or a single value
    #[arg(short = 'S', long)]
    pub surnames: String,

    // Timing Parameters
    /// Timeout in seconds for the initial communication (connect, banner and greeting)
    #[arg(long, default_value = "25", value_name = "SEC")]
    pub timeout_init: u64,

    /// Timeout in seconds for user enumeration
    #[arg(long, default_value = "10", value_name = "SEC")]
    pub timeout_enum: u64,

    /// Attempts for each step of the initial communication
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u32).range(1..))]
    pub retry_init: u32,

    /// Attempts for each send and receive during user enumeration
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u32).range(1..))]
    pub retry_enum: u32,

    /// Full reconnects per user once the enumeration retries are exhausted
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    pub reconnect: u32,

    /// Number of concurrent workers
    #[arg(short = 't', long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    pub threads: u64,

    // Output and Display Options
    /// Show verbose output. Useful to adjust timing and retry settings
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Colorful output (disable for logging to files)
    #[arg(short = 'C', long = "no-color", default_value = "true", action = clap::ArgAction::SetFalse)]
    pub is_color: bool,

    /// Output file for results
    #[arg(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Format of the output file
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum EnumMode {
    /// VRFY command (verify user)
    Vrfy,
    /// EXPN command (expand mailing list)
    Expn,
    /// RCPT TO command (recipient), declares a sender first
    Rcpt,
}

impl EnumMode {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Vrfy => "VRFY",
            Self::Expn => "EXPN",
            Self::Rcpt => "RCPT",
        }
    }

    // Only RCPT needs MAIL FROM before the probe is valid.
    pub fn needs_sender(self) -> bool {
        matches!(self, Self::Rcpt)
    }
}

impl fmt::Display for EnumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum OutputFormat {
    /// One line per user
    Text,
    /// One JSON object per line
    Json,
}
