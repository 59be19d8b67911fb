//! Codec errors
//!
//! One enum per codec. Every error aborts the whole operation: a failed read
//! never hands back a partial list, and a failed stack operation leaves the
//! stack at the depth it had on entry.
//!
//! Lossy conversions that are expected in normal operation (unsupported stack
//! types, vanished references) are not errors; they are logged and the value
//! is downgraded.

use scriptval_core::RefId;

/// Malformed or truncated wire input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("truncated input: needed {needed} bits, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("invalid type tag {0}")]
    InvalidTag(u8),

    #[error("reference to unknown table slot {0}")]
    UnknownTableRef(u64),

    #[error("declared length {declared} exceeds the {remaining} bytes remaining")]
    LengthExceedsRemaining { declared: u64, remaining: usize },

    #[error("table declares an odd element count {0}")]
    OddTableLength(u64),

    #[error("declared count {declared} exceeds what {remaining_bits} remaining bits can hold")]
    CountExceedsRemaining { declared: u64, remaining_bits: usize },

    #[error("nesting exceeds the maximum depth of {0}")]
    DepthExceeded(usize),

    #[error("compressed integer does not fit in 64 bits")]
    MalformedInteger,
}

/// JSON conversion failure
#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("JSON syntax error: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("top-level JSON value must be an array or an object, found {0}")]
    TopLevel(&'static str),

    #[error("reference {0} cannot be persisted")]
    UnserializableReference(RefId),

    #[error("{0} cannot be used as an object key")]
    InvalidKey(&'static str),

    #[error("two table keys both render as \"{0}\"")]
    DuplicateKey(String),

    #[error("unknown table reference \"{0}\"")]
    UnknownTableRef(String),

    #[error("cannot persist non-finite number {0}")]
    NonFiniteNumber(f64),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("nesting exceeds the maximum depth of {0}")]
    DepthExceeded(usize),
}

/// Interpreter stack conversion failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    #[error("stack cannot grow by {requested} slots")]
    Overflow { requested: usize },

    #[error("nesting exceeds the maximum depth of {0}")]
    DepthExceeded(usize),

    #[error("range {begin}..{end} is outside a stack of depth {depth}")]
    IndexOutOfRange {
        begin: usize,
        end: usize,
        depth: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ProtocolError::Truncated {
            needed: 8,
            available: 3,
        };
        assert_eq!(err.to_string(), "truncated input: needed 8 bits, 3 available");
        assert_eq!(
            JsonError::InvalidKey("nil").to_string(),
            "nil cannot be used as an object key"
        );
        assert_eq!(
            StackError::Overflow { requested: 2 }.to_string(),
            "stack cannot grow by 2 slots"
        );
    }

    #[test]
    fn test_syntax_error_keeps_source() {
        use std::error::Error;
        let parse = serde_json::from_str::<serde_json::Value>("[1,").unwrap_err();
        let err = JsonError::from(parse);
        assert!(err.source().is_some());
    }
}
