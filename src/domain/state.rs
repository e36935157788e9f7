use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Connection supervisor state machine
///
/// `Idle -> Connecting -> {Connected, Backoff, Fatal}`,
/// `Connected -> Backoff -> Connecting` while attempts remain,
/// `Fatal` and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Idle,
    Connecting,
    Connected,
    Backoff,
    Fatal,
    Stopped,
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorState::Fatal | SupervisorState::Stopped)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Idle => write!(f, "idle"),
            SupervisorState::Connecting => write!(f, "connecting"),
            SupervisorState::Connected => write!(f, "connected"),
            SupervisorState::Backoff => write!(f, "backoff"),
            SupervisorState::Fatal => write!(f, "fatal"),
            SupervisorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// How a single connection attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RecoverableFailure,
    FatalFailure,
}

/// One connection attempt; discarded once its outcome is known
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: Option<AttemptOutcome>,
}

impl ConnectionAttempt {
    pub fn begin(attempt_number: u32) -> Self {
        Self {
            attempt_number,
            started_at: Utc::now(),
            outcome: None,
        }
    }

    pub fn finish(mut self, outcome: AttemptOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

/// Result of one liveness ping cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResult {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub status_code: Option<u16>,
    /// Response body on success, failure reason otherwise
    pub detail: Option<String>,
}

impl PingResult {
    pub fn succeeded(status_code: u16, body: String) -> Self {
        Self {
            timestamp: Utc::now(),
            success: true,
            status_code: Some(status_code),
            detail: Some(body),
        }
    }

    pub fn failed(status_code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            success: false,
            status_code,
            detail: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_state_display() {
        assert_eq!(SupervisorState::Connecting.to_string(), "connecting");
        assert_eq!(SupervisorState::Fatal.to_string(), "fatal");
    }

    #[test]
    fn test_terminal_states() {
        assert!(SupervisorState::Fatal.is_terminal());
        assert!(SupervisorState::Stopped.is_terminal());
        assert!(!SupervisorState::Backoff.is_terminal());
        assert!(!SupervisorState::Connected.is_terminal());
    }

    #[test]
    fn test_attempt_finish() {
        let attempt = ConnectionAttempt::begin(3).finish(AttemptOutcome::RecoverableFailure);
        assert_eq!(attempt.attempt_number, 3);
        assert_eq!(attempt.outcome, Some(AttemptOutcome::RecoverableFailure));
    }
}
