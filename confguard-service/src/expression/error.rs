//! Error types for the constraint expression language
//!
//! Parse errors are deployment-fatal (a schema declaring a malformed
//! expression never deploys). Evaluation errors are recovered into
//! violations on the owning node by the orchestrator.

use thiserror::Error;

/// Errors raised while parsing an expression
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// Unexpected end of input
    #[error("Unexpected end of input at position {position}")]
    UnexpectedEof {
        /// Position in the input where parsing failed
        position: usize,
    },

    /// Unexpected token
    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken {
        /// The unexpected token text
        token: String,
        /// Position in the input
        position: usize,
    },

    /// Invalid number format
    #[error("Invalid number '{value}' at position {position}")]
    InvalidNumber {
        /// The numeric text that failed to parse
        value: String,
        /// Position in the input
        position: usize,
    },

    /// Unterminated string literal
    #[error("Unterminated string literal starting at position {position}")]
    UnterminatedLiteral {
        /// Position of the opening quote
        position: usize,
    },

    /// Missing closing delimiter
    #[error("Missing closing '{delimiter}' at position {position}")]
    MissingDelimiter {
        /// The expected delimiter
        delimiter: char,
        /// Position where it was expected
        position: usize,
    },

    /// Function name outside the closed function set
    #[error("Unknown function '{name}' at position {position}")]
    UnknownFunction {
        /// The unrecognized name
        name: String,
        /// Position in the input
        position: usize,
    },

    /// Expression nesting exceeds the configured bound
    #[error("Expression nesting depth {depth} exceeds maximum of {max}")]
    TooDeep {
        /// Reached depth
        depth: usize,
        /// Configured maximum
        max: usize,
    },

    /// Expression text exceeds the configured bound
    #[error("Expression length {length} exceeds maximum of {max}")]
    TooLong {
        /// Input length
        length: usize,
        /// Configured maximum
        max: usize,
    },

    /// Trailing input after a complete expression
    #[error("Unexpected input after expression: '{input}'")]
    TrailingInput {
        /// The remaining input
        input: String,
    },
}

/// Errors raised while evaluating an expression
#[derive(Debug, Clone, Error)]
pub enum EvaluationError {
    /// A required function argument was not supplied
    #[error("Missing argument(s) in {function} function in node '{node}'.")]
    MissingArgument {
        /// Function name
        function: &'static str,
        /// Instance path of the node owning the expression
        node: String,
    },

    /// An argument had an unusable type
    #[error("Invalid argument for function '{function}': {message}")]
    InvalidArgument {
        /// Function name
        function: &'static str,
        /// Why the argument is unusable
        message: String,
    },

    /// A function was applied to a node of the wrong schema kind
    #[error("Function '{function}' is not applicable to node '{node}': {message}")]
    NotApplicable {
        /// Function name
        function: &'static str,
        /// Instance path of the offending node
        node: String,
        /// What was expected
        message: String,
    },

    /// An invalid regular expression reached `re-match`
    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex {
        /// The offending pattern text
        pattern: String,
        /// Compiler diagnostic
        reason: String,
    },

    /// Numeric operation produced no usable result
    #[error("Type error: {message}")]
    TypeError {
        /// Description
        message: String,
    },

    /// State-data retrieval failed mid-expression
    #[error("State data retrieval failed: {reason}")]
    StateRetrieval {
        /// Collaborator diagnostic
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_argument_message_names_function_and_node() {
        let err = EvaluationError::MissingArgument {
            function: "re-match",
            node: "/sys:system/sys:match-check".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing argument(s) in re-match function in node '/sys:system/sys:match-check'."
        );
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::UnknownFunction {
            name: "starts-with".to_string(),
            position: 4,
        };
        assert_eq!(
            err.to_string(),
            "Unknown function 'starts-with' at position 4"
        );
    }
}
