use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::AttemptRecord;

/// The final outcome of a generate/execute/fix loop
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// The generated script exited with code 0
    Success {
        /// 1-based attempt that succeeded
        attempts: usize,
        code: String,
        requirements: String,
        script_path: PathBuf,
        #[serde(skip)]
        history: Vec<AttemptRecord>,
        total_duration_secs: f64,
    },
    /// Every attempt in the budget failed
    MaxAttemptsReached {
        attempts: usize,
        #[serde(skip)]
        history: Vec<AttemptRecord>,
        total_duration_secs: f64,
    },
    /// User requested stop (e.g., Ctrl+C)
    UserInterrupted {
        attempts: usize,
        #[serde(skip)]
        history: Vec<AttemptRecord>,
        total_duration_secs: f64,
    },
}

impl LoopOutcome {
    pub fn success(
        attempts: usize,
        code: String,
        requirements: String,
        script_path: PathBuf,
        history: Vec<AttemptRecord>,
        duration: Duration,
    ) -> Self {
        Self::Success {
            attempts,
            code,
            requirements,
            script_path,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn max_attempts_reached(
        attempts: usize,
        history: Vec<AttemptRecord>,
        duration: Duration,
    ) -> Self {
        Self::MaxAttemptsReached {
            attempts,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn interrupted(attempts: usize, history: Vec<AttemptRecord>, duration: Duration) -> Self {
        Self::UserInterrupted {
            attempts,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            Self::Success { attempts, .. } => *attempts,
            Self::MaxAttemptsReached { attempts, .. } => *attempts,
            Self::UserInterrupted { attempts, .. } => *attempts,
        }
    }

    pub fn history(&self) -> &[AttemptRecord] {
        match self {
            Self::Success { history, .. } => history,
            Self::MaxAttemptsReached { history, .. } => history,
            Self::UserInterrupted { history, .. } => history,
        }
    }

    pub fn total_duration_secs(&self) -> f64 {
        match self {
            Self::Success {
                total_duration_secs,
                ..
            }
            | Self::MaxAttemptsReached {
                total_duration_secs,
                ..
            }
            | Self::UserInterrupted {
                total_duration_secs,
                ..
            } => *total_duration_secs,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Same name as the serialized `status` tag
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::MaxAttemptsReached { .. } => "max_attempts_reached",
            Self::UserInterrupted { .. } => "user_interrupted",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success { .. } => 0,
            Self::MaxAttemptsReached { .. } => 1,
            Self::UserInterrupted { .. } => 130,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_serializes_without_history() {
        let outcome = LoopOutcome::success(
            2,
            "print(1)".into(),
            "numpy".into(),
            PathBuf::from("/work/generated_script.py"),
            Vec::new(),
            Duration::from_secs(3),
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["attempts"], 2);
        assert_eq!(json["code"], "print(1)");
        assert!(json.get("history").is_none());
        assert_eq!(outcome.exit_code(), 0);
    }

    #[test]
    fn test_exit_codes() {
        let failed = LoopOutcome::max_attempts_reached(10, Vec::new(), Duration::ZERO);
        let stopped = LoopOutcome::interrupted(1, Vec::new(), Duration::ZERO);
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(failed.label(), "max_attempts_reached");
        assert_eq!(stopped.exit_code(), 130);
        assert!(!stopped.is_success());
    }

    #[test]
    fn test_label_matches_status_tag() {
        let outcomes = [
            LoopOutcome::success(
                1,
                String::new(),
                String::new(),
                PathBuf::from("s.py"),
                Vec::new(),
                Duration::ZERO,
            ),
            LoopOutcome::max_attempts_reached(3, Vec::new(), Duration::ZERO),
            LoopOutcome::interrupted(1, Vec::new(), Duration::ZERO),
        ];
        for outcome in &outcomes {
            let json = serde_json::to_value(outcome).unwrap();
            assert_eq!(json["status"], outcome.label());
        }
    }
}
