//! Orchestrator lifecycle and forward-mode selector

use crate::Error;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of an [`RkdTrainer`](super::RkdTrainer)
///
/// ```text
/// Uninitialized → Training → Validating → ValidationAggregated → Training …
/// ```
///
/// Any failure inside a step, or [`finish`](super::RkdTrainer::finish), moves
/// to `Terminal`, after which every step is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Training,
    Validating,
    ValidationAggregated,
    Terminal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Training => "training",
            Phase::Validating => "validating",
            Phase::ValidationAggregated => "validation-aggregated",
            Phase::Terminal => "terminal",
        })
    }
}

/// Which network a forward pass runs through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    Student,
    Teacher,
}

impl FromStr for ForwardMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(ForwardMode::Student),
            "teacher" => Ok(ForwardMode::Teacher),
            other => Err(Error::Config(format!(
                "forward mode should be teacher or student, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ForwardMode::Student => "student",
            ForwardMode::Teacher => "teacher",
        })
    }
}
