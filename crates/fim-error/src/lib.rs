//! Crate-wide error types and the error-bucket accumulator.
//!
//! The core never unwinds past an object or a rule: per-object and
//! per-rule failures are pushed onto an [`ErrorBucket`] and the walk
//! continues. Only envelope/signature failures and parse failures are
//! propagated as `Err(FimError)`.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FimError>;

/// Errors raised by the policy parser and preprocessor.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("rule start-point is not absolute: {0}")]
    StartPointNotAbsolute(String),
    #[error("duplicate start-point: {0}")]
    DuplicateStartPoint(String),
    #[error("stop-point {stop} is not strictly below start-point {start}")]
    StopPointNotUnderStart { start: String, stop: String },
    #[error("#section may only appear at top level in top scope")]
    SectionNotAtTopLevel,
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("{0}")]
    UserError(String),
}

/// Errors raised by the hierarchical database.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DatabaseError {
    #[error("corrupt block at index {0}")]
    CorruptBlock(u32),
    #[error("database format version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("type id {0:#010x} is not registered")]
    TypeIdNotRegistered(u32),
    #[error("signature verification failed")]
    SignatureVerificationFailed,
    #[error("case sensitivity / delimiter of data source does not match database genre")]
    GenreMismatch,
}

/// Errors raised by the integrity pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IntegrityError {
    #[error("name {0} is not contained by any rule in the spec list")]
    FcoNotInSpec(String),
    #[error("name {0} has no corresponding entry in the database")]
    FcoNotInDatabase(String),
    #[error("failed to create FCO for {0}")]
    FcoCreateFailure(String),
    #[error("unknown genre: {0}")]
    UnknownGenre(String),
    #[error("severity value {0} out of range")]
    SeverityOutOfRange(u32),
    #[error("mismatching parameters: {0}")]
    MismatchingParameters(String),
}

/// Errors raised by the property calculator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CalculatorError {
    #[error("stat failed for {0}")]
    StatFailed(String),
    #[error("open failed for {0}")]
    OpenFailed(String),
    #[error("hash stream failed for {0}")]
    HashStreamFailed(String),
    #[error("symlink read failed for {0}")]
    SymlinkReadFailed(String),
}

/// Errors raised by the typed serializer / envelope.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SerializerError {
    #[error("unknown type id {0:#010x}")]
    UnknownType(u32),
    #[error("invalid input stream format: {0}")]
    InputStreamFormat(String),
    #[error("invalid output stream format: {0}")]
    OutputStreamFormat(String),
    #[error("serialized version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: i32, expected: i32 },
}

/// Top-level error type returned from fallible, non-accumulating operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FimError {
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Calculator(#[from] CalculatorError),
    #[error(transparent)]
    Serializer(#[from] SerializerError),
    #[error("io error: {0}")]
    Io(String),
}

impl FimError {
    /// Whether this error aborts the current operation (parse, envelope,
    /// signature) as opposed to being routed to an [`ErrorBucket`].
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FimError::Policy(_) | FimError::Database(DatabaseError::SignatureVerificationFailed)
        )
    }
}

impl From<std::io::Error> for FimError {
    fn from(e: std::io::Error) -> Self {
        FimError::Io(e.to_string())
    }
}

/// A single error recorded against an object or rule, for non-fatal,
/// "report and continue" failures (spec.md §7).
#[derive(Debug, Clone)]
pub struct CollectedError {
    /// Kind-specific message, already rendered for display.
    pub message: String,
    /// Display-rendered identity of the object this error concerns, if any.
    pub object: Option<String>,
    /// Whether this particular error is fatal to the *enclosing rule*
    /// (not the whole operation).
    pub fatal_to_rule: bool,
}

impl fmt::Display for CollectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object {
            Some(obj) => write!(f, "{obj}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A chain of handlers that per-object and per-rule errors are pushed
/// onto instead of being thrown. New errors are pushed to the head of
/// the chain, matching the "most recent first" iteration order used by
/// report rendering.
#[derive(Debug, Clone, Default)]
pub struct ErrorBucket {
    errors: Vec<CollectedError>,
}

impl ErrorBucket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an error to the head of the chain.
    pub fn push(&mut self, message: impl Into<String>, object: Option<String>, fatal_to_rule: bool) {
        self.errors.insert(
            0,
            CollectedError {
                message: message.into(),
                object,
                fatal_to_rule,
            },
        );
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectedError> {
        self.errors.iter()
    }

    #[must_use]
    pub fn any_fatal_to_rule(&self) -> bool {
        self.errors.iter().any(|e| e.fatal_to_rule)
    }

    /// Merge another bucket's errors into this one, preserving "most
    /// recent first" order (the other bucket's errors are newer).
    pub fn extend(&mut self, other: ErrorBucket) {
        let mut merged = other.errors;
        merged.extend(std::mem::take(&mut self.errors));
        self.errors = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_pushes_to_head() {
        let mut bucket = ErrorBucket::new();
        bucket.push("first", None, false);
        bucket.push("second", None, false);
        let rendered: Vec<_> = bucket.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["second".to_string(), "first".to_string()]);
    }

    #[test]
    fn fatal_to_rule_is_detected() {
        let mut bucket = ErrorBucket::new();
        bucket.push("ok", None, false);
        assert!(!bucket.any_fatal_to_rule());
        bucket.push("start-point unreadable", Some("/a".into()), true);
        assert!(bucket.any_fatal_to_rule());
    }

    #[test]
    fn policy_error_is_fatal() {
        let e = FimError::Policy(PolicyError::UndefinedVariable("X".into()));
        assert!(e.is_fatal());
        let e = FimError::Calculator(CalculatorError::StatFailed("/a".into()));
        assert!(!e.is_fatal());
    }
}
