// jsonagg-core/src/lib.rs
// MongoDB-style aggregation ($match, $group, $sort, $limit) over in-memory JSON arrays

pub mod aggregation;
pub mod bracket;
pub mod collection;
pub mod condition;
pub mod date_literal;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod options;
pub mod path;
pub mod value;

// Public exports
pub use aggregation::{GroupKey, StageSpec};
pub use collection::JsonCollection;
pub use date_literal::{parse_datetime, DateLiteralParser, ScriptDateParser};
pub use error::{JsonAggError, Result};
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use options::AggregateOptions;
pub use value::DynamicValue;
