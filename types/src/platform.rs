//! Build platform identifiers: stack and CPU architecture.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const STACK_PREFIX: &str = "heroku-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformParseError {
    #[error("unsupported stack '{raw}'; expected heroku-<ubuntu major>, e.g. heroku-22")]
    UnsupportedStack { raw: String },
    #[error("unsupported architecture '{raw}'; expected amd64 or arm64")]
    UnsupportedArch { raw: String },
}

/// Target base image, e.g. `heroku-22`.
///
/// Each stack is built on an Ubuntu LTS release; `heroku-22` is Ubuntu 22.04.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stack {
    id: String,
    ubuntu_major: u16,
}

impl Stack {
    pub fn parse(raw: &str) -> Result<Self, PlatformParseError> {
        raw.parse()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn distro(&self) -> &'static str {
        "ubuntu"
    }

    /// `22.04` for `heroku-22`.
    #[must_use]
    pub fn distro_version(&self) -> String {
        format!("{}.04", self.ubuntu_major)
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl FromStr for Stack {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim();
        let unsupported = || PlatformParseError::UnsupportedStack { raw: id.to_string() };
        let digits = id.strip_prefix(STACK_PREFIX).ok_or_else(unsupported)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unsupported());
        }
        let ubuntu_major = digits.parse::<u16>().map_err(|_| unsupported())?;
        Ok(Self {
            id: id.to_string(),
            ubuntu_major,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    /// Debian architecture name, as printed by `dpkg --print-architecture`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Architecture of the running binary, if it is one artifacts are published for.
    #[must_use]
    pub fn host() -> Option<Self> {
        std::env::consts::ARCH.parse().ok()
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amd64" | "x86_64" => Ok(Arch::Amd64),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(PlatformParseError::UnsupportedArch {
                raw: other.to_string(),
            }),
        }
    }
}
