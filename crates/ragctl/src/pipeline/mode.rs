//! Operating modes and the failure policy they map to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What happens to the rest of a run after a file fails
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OperatingMode {
    /// Ask the operator after each failure
    #[default]
    Interactive,
    /// Record the failure and keep going
    AutoContinue,
    /// Abort every remaining file on the first failure
    AutoStop,
    /// Record failures as skips and keep going
    AutoSkip,
}

/// The single decision the executor acts on after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    RecordFailedAndContinue,
    RecordSkippedAndContinue,
    AbortRemainder,
    AskOperator,
}

/// Operator answer in interactive mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Keep processing the remaining files
    Continue,
    /// Stop; remaining files are recorded as aborted
    Stop,
    /// Stop attempting; remaining files are recorded as skipped
    SkipRest,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Interactive => "interactive",
            OperatingMode::AutoContinue => "auto-continue",
            OperatingMode::AutoStop => "auto-stop",
            OperatingMode::AutoSkip => "auto-skip",
        }
    }

    pub fn on_failure(&self) -> FailurePolicy {
        match self {
            OperatingMode::Interactive => FailurePolicy::AskOperator,
            OperatingMode::AutoContinue => FailurePolicy::RecordFailedAndContinue,
            OperatingMode::AutoStop => FailurePolicy::AbortRemainder,
            OperatingMode::AutoSkip => FailurePolicy::RecordSkippedAndContinue,
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, OperatingMode::Interactive)
    }

    /// Resolve the mutually exclusive `--auto-*` flags
    pub fn from_flags(auto_continue: bool, auto_stop: bool, auto_skip: bool) -> Option<Self> {
        match (auto_continue, auto_stop, auto_skip) {
            (false, false, false) => Some(OperatingMode::Interactive),
            (true, false, false) => Some(OperatingMode::AutoContinue),
            (false, true, false) => Some(OperatingMode::AutoStop),
            (false, false, true) => Some(OperatingMode::AutoSkip),
            _ => None,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interactive" => Ok(OperatingMode::Interactive),
            "auto-continue" => Ok(OperatingMode::AutoContinue),
            "auto-stop" => Ok(OperatingMode::AutoStop),
            "auto-skip" => Ok(OperatingMode::AutoSkip),
            other => Err(format!(
                "unknown mode '{}' (expected interactive, auto-continue, auto-stop or auto-skip)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch() {
        assert_eq!(OperatingMode::Interactive.on_failure(), FailurePolicy::AskOperator);
        assert_eq!(
            OperatingMode::AutoContinue.on_failure(),
            FailurePolicy::RecordFailedAndContinue
        );
        assert_eq!(OperatingMode::AutoStop.on_failure(), FailurePolicy::AbortRemainder);
        assert_eq!(
            OperatingMode::AutoSkip.on_failure(),
            FailurePolicy::RecordSkippedAndContinue
        );
    }

    #[test]
    fn test_flags_are_exclusive() {
        assert_eq!(OperatingMode::from_flags(false, false, false), Some(OperatingMode::Interactive));
        assert_eq!(OperatingMode::from_flags(false, true, false), Some(OperatingMode::AutoStop));
        assert_eq!(OperatingMode::from_flags(true, true, false), None);
        assert_eq!(OperatingMode::from_flags(true, false, true), None);
    }

    #[test]
    fn test_serialized_tokens() {
        assert_eq!(serde_json::to_string(&OperatingMode::AutoContinue).unwrap(), "\"auto-continue\"");
        let mode: OperatingMode = serde_json::from_str("\"auto-skip\"").unwrap();
        assert_eq!(mode, OperatingMode::AutoSkip);
        assert!(serde_json::from_str::<OperatingMode>("\"auto_skip\"").is_err());
        assert_eq!("auto-stop".parse::<OperatingMode>().unwrap(), OperatingMode::AutoStop);
    }
}
