use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

// Either a literal value or a wordlist file with one value per line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    Single(String),
    File(PathBuf),
}

impl InputSource {
    // A value naming an existing file is a wordlist, anything else is taken literally
    pub fn new(input: &str) -> io::Result<Self> {
        match std::fs::metadata(input) {
            Ok(metadata) if metadata.is_file() => Ok(Self::File(PathBuf::from(input))),
            Ok(metadata) if metadata.is_dir() => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{input} is a directory, not a file"),
            )),
            _ => Ok(Self::Single(input.to_string())),
        }
    }

    pub fn load_values(&self) -> io::Result<Vec<String>> {
        match self {
            // a blank literal contributes nothing, like a blank wordlist line
            Self::Single(value) => Ok(Some(value.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .into_iter()
                .collect()),
            Self::File(path) => read_values_from_file(path),
        }
    }
}

// Read values from a file, skipping empty lines and comments
pub fn read_values_from_file(path: &Path) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut values = Vec::new();

    for line in reader.lines() {
        let value = line?;
        let trimmed = value.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            values.push(trimmed.to_string());
        }
    }

    Ok(values)
}
