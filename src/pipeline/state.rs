use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

/// Which branch of the pipeline a round runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    /// Round 1: seed the repository.
    Initializing,
    /// Round N > 1: evolve the repository using its stored context.
    Updating,
}

impl RoundState {
    /// Map a request's round number onto a state. Round 0 is rejected.
    pub fn for_round(round: u32) -> Result<Self, PipelineError> {
        match round {
            0 => Err(PipelineError::InvalidRound { round }),
            1 => Ok(Self::Initializing),
            _ => Ok(Self::Updating),
        }
    }

    pub fn regenerates_license(self) -> bool {
        matches!(self, Self::Initializing)
    }

    /// Pages are switched on once, before the first files land.
    pub fn enables_pages(self) -> bool {
        matches!(self, Self::Initializing)
    }

    /// Whether code generation starts from the previous round's code.
    pub fn uses_previous_code(self) -> bool {
        matches!(self, Self::Updating)
    }

    /// Whether the context record is written unconditionally (fresh) rather
    /// than read-modify-written.
    pub fn seeds_context(self) -> bool {
        matches!(self, Self::Initializing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Updating => "updating",
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
