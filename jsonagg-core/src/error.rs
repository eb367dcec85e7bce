// jsonagg-core/src/error.rs
// Error types for the aggregation core

use thiserror::Error;

/// Errors reported by collection construction and `aggregate` calls
///
/// Unresolved field paths are never errors: they simply fail a `$match`
/// condition, drop a document from `$group`, or sort as an absent key.
#[derive(Error, Debug)]
pub enum JsonAggError {
    /// The collection root is not a JSON array
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The pipeline text is not valid JSON after normalization, or has the wrong shape
    #[error("Malformed aggregation specification: {0}")]
    MalformedSpecification(String),

    /// `$group._id` is neither null, a field reference, nor an object of field references
    #[error("Unsupported _id in $group: {0}")]
    UnsupportedGroupId(String),

    /// The contents of a `Date(...)` call could not be interpreted
    #[error("Date literal error: {0}")]
    DateLiteral(String),

    /// A bracket scan keyword that does not end with an opening bracket
    #[error("Invalid bracket keyword: {0}")]
    InvalidKeyword(String),

    /// Collection text that is not JSON at all
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, JsonAggError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = JsonAggError::InvalidInput("The input JSON is not an array.".to_string());
        assert_eq!(err.to_string(), "Invalid input: The input JSON is not an array.");

        let err = JsonAggError::UnsupportedGroupId("number".to_string());
        assert!(err.to_string().contains("$group"));
    }

    #[test]
    fn test_json_error_conversion() {
        fn parse(text: &str) -> Result<serde_json::Value> {
            Ok(serde_json::from_str(text)?)
        }

        let err = parse("{not json").unwrap_err();
        assert!(matches!(err, JsonAggError::Json(_)));
    }
}
