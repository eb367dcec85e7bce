// jsonagg-core/src/collection.rs
//! In-memory document collection and the `aggregate` entry point
//!
//! ```
//! use jsonagg_core::JsonCollection;
//!
//! let users = JsonCollection::parse(r#"[
//!     {"id": 1, "age": 30},
//!     {"id": 2, "age": 25},
//!     {"id": 3, "age": 35}
//! ]"#).unwrap();
//!
//! let result = users.aggregate("{ $match: { age: { $gt: 30 } } }").unwrap();
//! assert_eq!(result.to_string(), r#"[{"id":3,"age":35}]"#);
//! ```

use crate::aggregation::StageSpec;
use crate::date_literal::DateLiteralParser;
use crate::error::{JsonAggError, Result};
use crate::normalize::normalize;
use crate::options::AggregateOptions;
use crate::{log_debug, log_warn};
use serde_json::Value;

/// Read-only collection backed by one JSON array
///
/// There is no mutation API; `aggregate` takes `&self` and can be called from
/// several threads at once.
#[derive(Debug, Clone)]
pub struct JsonCollection {
    data: Value,
}

impl JsonCollection {
    /// Wrap an already parsed array
    pub fn new(data: Value) -> Result<Self> {
        if !data.is_array() {
            log_warn!("Rejected collection root of non-array kind");
            return Err(JsonAggError::InvalidInput(
                "The input JSON is not an array.".to_string(),
            ));
        }
        Ok(JsonCollection { data })
    }

    /// Parse collection text
    pub fn parse(json: &str) -> Result<Self> {
        Self::new(serde_json::from_str(json)?)
    }

    /// Number of documents
    pub fn count(&self) -> usize {
        self.documents().len()
    }

    pub fn documents(&self) -> &[Value] {
        self.data.as_array().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run a pipeline specification with default options
    pub fn aggregate(&self, spec: &str) -> Result<Value> {
        self.aggregate_with_options(spec, &AggregateOptions::default())
    }

    /// Run a pipeline specification with per-call options. Logging verbosity
    /// is not an option; it is set process-wide with `set_log_level`.
    pub fn aggregate_with_options(&self, spec: &str, options: &AggregateOptions) -> Result<Value> {
        self.aggregate_with_parser(spec, &options.date_parser())
    }

    /// Run a pipeline specification with a caller-supplied date literal parser
    pub fn aggregate_with_parser(&self, spec: &str, dates: &dyn DateLiteralParser) -> Result<Value> {
        log_debug!("aggregate() called on {} documents with spec: {}", self.count(), spec);

        let normalized = normalize(spec, dates)?;
        log_debug!("Normalized spec: {}", normalized);

        let stage = StageSpec::parse(&normalized)?;
        let results = stage.execute(self.documents());
        Ok(StageSpec::materialize(results))
    }

    /// Run a pipeline specification and render the result as compact JSON text
    pub fn aggregate_to_string(&self, spec: &str) -> Result<String> {
        Ok(serde_json::to_string(&self.aggregate(spec)?)?)
    }
}

impl TryFrom<Value> for JsonCollection {
    type Error = JsonAggError;

    fn try_from(data: Value) -> Result<Self> {
        JsonCollection::new(data)
    }
}
