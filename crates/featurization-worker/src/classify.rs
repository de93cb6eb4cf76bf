//! Failure classification for featurization calls.

use crate::FeaturizationError;

/// Statuses worth retrying.
pub const RECOVERABLE_STATUSES: [u16; 5] = [408, 429, 502, 503, 504];

/// Which call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Check,
    Register,
}

/// What to do with a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The experience is unknown to the service: register it.
    NotFound,
    /// Keep the record and try again later.
    Recoverable,
    /// Drop the record.
    Terminal,
}

/// Maps a failed call to the action the retry engine takes.
pub fn classify(phase: Phase, error: &FeaturizationError) -> FailureClass {
    match error {
        FeaturizationError::Http { status: 404, .. } if phase == Phase::Check => {
            FailureClass::NotFound
        }
        FeaturizationError::Http { status, .. } if RECOVERABLE_STATUSES.contains(status) => {
            FailureClass::Recoverable
        }
        FeaturizationError::Network(_) => FailureClass::Recoverable,
        FeaturizationError::Transport(err) if err.is_timeout() || err.is_connect() => {
            FailureClass::Recoverable
        }
        FeaturizationError::Http { .. }
        | FeaturizationError::Transport(_)
        | FeaturizationError::Config(_)
        | FeaturizationError::Json(_)
        | FeaturizationError::Store(_)
        | FeaturizationError::ConsentDenied => FailureClass::Terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> FeaturizationError {
        FeaturizationError::Http {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn not_found_only_during_check() {
        assert_eq!(classify(Phase::Check, &http(404)), FailureClass::NotFound);
        assert_eq!(classify(Phase::Register, &http(404)), FailureClass::Terminal);
    }

    #[test]
    fn recoverable_statuses() {
        for status in RECOVERABLE_STATUSES {
            assert_eq!(classify(Phase::Check, &http(status)), FailureClass::Recoverable);
            assert_eq!(classify(Phase::Register, &http(status)), FailureClass::Recoverable);
        }
    }

    #[test]
    fn other_statuses_are_terminal() {
        for status in [400, 401, 403, 409, 422, 500, 501] {
            assert_eq!(classify(Phase::Register, &http(status)), FailureClass::Terminal, "{status}");
        }
    }

    #[test]
    fn network_is_recoverable_config_is_not() {
        assert_eq!(
            classify(Phase::Check, &FeaturizationError::Network("reset".into())),
            FailureClass::Recoverable
        );
        assert_eq!(
            classify(Phase::Check, &FeaturizationError::Config("no datastream".into())),
            FailureClass::Terminal
        );
    }
}
