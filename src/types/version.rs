// ABOUTME: Dotted PostgreSQL version parsing.
// ABOUTME: Only the major component participates in upgrade decisions.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseVersionError {
    #[error("version string cannot be empty")]
    Empty,

    #[error("invalid major version in '{0}'")]
    InvalidMajor(String),

    #[error("invalid minor version in '{0}'")]
    InvalidMinor(String),
}

/// A parsed `major.minor` version with the original text kept for display.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub raw: String,
}

impl Version {
    /// Parse a dotted version such as `12.7`, `13` or `9.6.24`.
    pub fn parse(value: &str) -> Result<Self, ParseVersionError> {
        let raw = value.trim();
        if raw.is_empty() {
            return Err(ParseVersionError::Empty);
        }

        let mut parts = raw.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| ParseVersionError::InvalidMajor(raw.to_string()))?;

        let minor = match parts.next() {
            None => 0,
            Some(p) => {
                // Tolerate suffixes such as "7-1" or "7rc1" from package versions
                let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits
                    .parse::<u32>()
                    .map_err(|_| ParseVersionError::InvalidMinor(raw.to_string()))?
            }
        };

        Ok(Self {
            major,
            minor,
            raw: raw.to_string(),
        })
    }

    /// A version that only knows its major component.
    pub fn from_major(major: u32) -> Self {
        Self {
            major,
            minor: 0,
            raw: major.to_string(),
        }
    }

    /// Two versions are the same upgrade target iff their majors match.
    pub fn same_major(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
