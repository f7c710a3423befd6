//! Error taxonomy shared by every engine component.

use thiserror::Error;

/// Failure raised by a queued command, a query, an interception or a stub.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// Query matched zero elements
    #[error("expected to find element `{selector}`, but never found it")]
    NotFound { selector: String },

    /// A retry-bounded operation ran out of time; `last` is the final observed failure
    #[error("{operation} timed out after {waited_ms}ms: {last}")]
    Timeout {
        operation: String,
        waited_ms: u64,
        #[source]
        last: Box<EngineError>,
    },

    /// Predicate evaluated on a resolved subject and returned false.
    /// `predicate` is its position among the checks evaluated together.
    #[error("expected {expected}, but {actual}")]
    AssertionFailed {
        expected: String,
        actual: String,
        predicate: Option<usize>,
    },

    #[error("no alias named @{0} was declared in this test")]
    AliasNotFound(String),

    #[error("alias @{0} is already bound")]
    AliasConflict(String),

    /// Malformed interception matcher
    #[error("invalid route matcher: {0}")]
    RegistrationConflict(String),

    #[error("cannot stub `{target}.{method}`: method does not exist")]
    StubTargetMissing { target: String, method: String },

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("no custom query registered under `{0}`")]
    UnknownQuery(String),

    #[error("`{command}` cannot run on this subject: {reason}")]
    InvalidSubject { command: String, reason: String },

    #[error("element is detached from the document: {0}")]
    Detached(String),

    #[error("element is not actionable: {0}")]
    NotActionable(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("application error: {0}")]
    Application(String),

    #[error("network error: {0}")]
    Network(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn timeout(operation: impl Into<String>, waited_ms: u64, last: EngineError) -> Self {
        EngineError::Timeout {
            operation: operation.into(),
            waited_ms,
            last: Box::new(last),
        }
    }

    pub fn assertion(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        EngineError::AssertionFailed {
            expected: expected.into(),
            actual: actual.into(),
            predicate: None,
        }
    }

    /// Tag an assertion failure with the position of the failing predicate.
    pub fn at_predicate(self, index: usize) -> Self {
        match self {
            EngineError::AssertionFailed {
                expected, actual, ..
            } => EngineError::AssertionFailed {
                expected,
                actual,
                predicate: Some(index),
            },
            other => other,
        }
    }

    /// Position of the predicate behind this failure, if it is one.
    pub fn failed_predicate(&self) -> Option<usize> {
        match self.root_cause() {
            EngineError::AssertionFailed { predicate, .. } => *predicate,
            _ => None,
        }
    }

    pub fn invalid_subject(command: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidSubject {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Whether a retry loop may re-run the check after this failure.
    ///
    /// Only failures caused by eventually-consistent external state qualify;
    /// structural mistakes in the test itself never get better by waiting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. }
                | EngineError::AssertionFailed { .. }
                | EngineError::Detached(_)
                | EngineError::NotActionable(_)
        )
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            EngineError::Application(_) | EngineError::Network(_) => 3,
            EngineError::Timeout { .. } | EngineError::Cancelled(_) => 2,
            EngineError::NotFound { .. }
            | EngineError::AssertionFailed { .. }
            | EngineError::Detached(_)
            | EngineError::NotActionable(_) => 1,
            _ => 0,
        }
    }

    /// Innermost concrete failure, looking through nested timeouts.
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::Timeout { last, .. } => last.root_cause(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), EngineError::Cancelled(_))
    }

    /// Short machine-friendly name of the variant, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::Timeout { .. } => "timeout",
            EngineError::AssertionFailed { .. } => "assertion_failed",
            EngineError::AliasNotFound(_) => "alias_not_found",
            EngineError::AliasConflict(_) => "alias_conflict",
            EngineError::RegistrationConflict(_) => "registration_conflict",
            EngineError::StubTargetMissing { .. } => "stub_target_missing",
            EngineError::InvalidSelector(_) => "invalid_selector",
            EngineError::UnknownQuery(_) => "unknown_query",
            EngineError::InvalidSubject { .. } => "invalid_subject",
            EngineError::Detached(_) => "detached",
            EngineError::NotActionable(_) => "not_actionable",
            EngineError::Cancelled(_) => "cancelled",
            EngineError::Application(_) => "application",
            EngineError::Network(_) => "network",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_keeps_last_failure_in_message() {
        let err = EngineError::timeout(
            "should",
            4000,
            EngineError::assertion("text `Sign Out`", "found `Sign In`"),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("4000ms"));
        assert!(rendered.contains("found `Sign In`"));
        assert_eq!(err.root_cause().kind(), "assertion_failed");
    }

    #[test]
    fn structural_errors_are_not_retryable() {
        assert!(!EngineError::AliasNotFound("options".into()).is_retryable());
        assert!(!EngineError::InvalidSelector("empty tag".into()).is_retryable());
        assert!(EngineError::NotFound {
            selector: "[data-cy=x]".into()
        }
        .is_retryable());
    }

    #[test]
    fn failed_predicate_survives_the_timeout_wrapper() {
        let err = EngineError::timeout(
            "should",
            100,
            EngineError::assertion("text `Stop`", "found `Go`").at_predicate(1),
        );
        assert_eq!(err.failed_predicate(), Some(1));
        assert_eq!(EngineError::Cancelled("x".into()).at_predicate(2).failed_predicate(), None);
    }

    #[test]
    fn nested_cancellation_is_detected() {
        let err = EngineError::timeout("wait", 10, EngineError::Cancelled("run aborted".into()));
        assert!(err.is_cancelled());
        assert_eq!(err.severity(), 2);
    }
}
