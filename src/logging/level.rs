use std::{fmt, str::FromStr};

use serde::{Serialize, Serializer};
use yansi::Color;

/// Severity of a record, and at the same time the threshold a registry filters with.
///
/// Levels are ranked from the most restrictive (`None`, which accepts nothing) to the least
/// restrictive (`Trace`, which accepts everything). A candidate level passes a threshold when its
/// rank is lower than or equal to the threshold's rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    None = 0,
    Fatal = 1,
    Error = 2,
    Warn = 3,
    Debug = 4,
    Info = 5,
    Trace = 6,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid log level: {0:?}")]
pub struct InvalidLevel(pub String);

impl Level {
    pub const ALL: [Level; 7] = [
        Level::None,
        Level::Fatal,
        Level::Error,
        Level::Warn,
        Level::Debug,
        Level::Info,
        Level::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::None => "NONE",
            Level::Fatal => "FATAL",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Trace => "TRACE",
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub(crate) fn from_rank(rank: u8) -> Option<Level> {
        Level::ALL.get(usize::from(rank)).copied()
    }

    /// Whether `name` spells one of the seven levels exactly.
    pub fn is_valid(name: &str) -> bool {
        name.parse::<Level>().is_ok()
    }

    /// Whether a record at `self` passes when `threshold` is configured.
    pub fn is_accepted_by(&self, threshold: Level) -> bool {
        accepts(threshold, *self)
    }

    pub fn color(&self) -> Color {
        match self {
            Level::None => Color::BrightWhite,
            Level::Fatal | Level::Error => Color::Red,
            Level::Warn => Color::Yellow,
            Level::Debug => Color::Green,
            Level::Info => Color::Blue,
            Level::Trace => Color::Magenta,
        }
    }
}

/// `NONE` never passes and never lets anything through.
pub fn accepts(threshold: Level, candidate: Level) -> bool {
    if threshold == Level::None || candidate == Level::None {
        return false;
    }

    candidate.rank() <= threshold.rank()
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` keeps width/alignment flags working for aligned prefixes.
        f.pad(self.as_str())
    }
}

impl FromStr for Level {
    type Err = InvalidLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .iter()
            .find(|level| level.as_str() == s)
            .copied()
            .ok_or_else(|| InvalidLevel(s.to_string()))
    }
}

impl TryFrom<&str> for Level {
    type Error = InvalidLevel;

    fn try_from(value: &str) -> Result<Self, InvalidLevel> {
        value.parse()
    }
}

impl TryFrom<String> for Level {
    type Error = InvalidLevel;

    fn try_from(value: String) -> Result<Self, InvalidLevel> {
        value.parse()
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
