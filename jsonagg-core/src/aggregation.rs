// src/aggregation.rs
// Aggregation stage: $match, $group, $sort, $limit

use crate::condition::Condition;
use crate::error::{JsonAggError, Result};
use crate::path::{get_property, FieldPath};
use crate::value::DynamicValue;
use crate::{log_debug, log_trace};
use ahash::AHashMap;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Clause value as an object; `null` counts as an absent clause
fn clause_object<'a>(name: &str, value: &'a Value) -> Result<Option<&'a Map<String, Value>>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(obj) => Ok(Some(obj)),
        other => Err(JsonAggError::MalformedSpecification(format!(
            "{} must be an object, got {}",
            name,
            kind_name(other)
        ))),
    }
}

/// One aggregate stage object
///
/// Clauses always run in the order Match, Group, Sort, Limit, whatever order
/// they were written in. Each one is optional.
#[derive(Debug, Clone, Default)]
pub struct StageSpec {
    match_clause: Option<MatchClause>,
    group: Option<GroupClause>,
    sort: Option<SortClause>,
    limit: Option<LimitClause>,
}

/// $match clause - every condition must hold
#[derive(Debug, Clone)]
pub struct MatchClause {
    conditions: Vec<Condition>,
}

/// $group clause - bucket by `_id`, count each bucket
#[derive(Debug, Clone)]
pub struct GroupClause {
    id: GroupId,
}

/// Parsed `_id` selector of a $group clause
#[derive(Debug, Clone)]
pub enum GroupId {
    /// Missing or null: one group for every document
    All,
    /// "$field.path"
    Field(FieldPath),
    /// { name: "$field.path", ... }
    Composite(Vec<(String, FieldPath)>),
}

/// Computed key a document is bucketed under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    All,
    Scalar(DynamicValue),
    Composite(Vec<(String, DynamicValue)>),
}

/// $sort clause - (field, direction) pairs in written order
#[derive(Debug, Clone)]
pub struct SortClause {
    fields: Vec<(String, SortDirection)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// $limit clause
#[derive(Debug, Clone, Copy)]
pub struct LimitClause {
    limit: usize,
}

impl StageSpec {
    /// Parse normalized (strict JSON) pipeline text
    pub fn parse(normalized: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(normalized)
            .map_err(|e| JsonAggError::MalformedSpecification(e.to_string()))?;
        Self::from_json(&root)
    }

    /// Pick the stage object out of a parsed specification.
    ///
    /// An object root is the stage itself. For an array root only the first
    /// element is used, and it must be an object; later elements are ignored.
    pub fn from_json(root: &Value) -> Result<Self> {
        match root {
            Value::Object(obj) => Self::from_stage_object(obj),
            Value::Array(stages) => match stages.first() {
                Some(Value::Object(obj)) => {
                    if stages.len() > 1 {
                        log_debug!(
                            "Pipeline has {} stage objects; only the first is executed",
                            stages.len()
                        );
                    }
                    Self::from_stage_object(obj)
                }
                _ => Err(JsonAggError::MalformedSpecification(
                    "invalid aggregation specification: array must start with a stage object"
                        .to_string(),
                )),
            },
            other => Err(JsonAggError::MalformedSpecification(format!(
                "invalid aggregation specification: expected object or array, got {}",
                kind_name(other)
            ))),
        }
    }

    fn from_stage_object(obj: &Map<String, Value>) -> Result<Self> {
        let mut stage = StageSpec::default();

        for (name, spec) in obj {
            match name.as_str() {
                "$match" => {
                    stage.match_clause = clause_object(name, spec)?.map(MatchClause::from_json)
                }
                "$group" => {
                    stage.group = clause_object(name, spec)?
                        .map(GroupClause::from_json)
                        .transpose()?
                }
                "$sort" => {
                    stage.sort = clause_object(name, spec)?
                        .map(SortClause::from_json)
                        .transpose()?
                }
                "$limit" => stage.limit = Some(LimitClause::from_json(spec)),
                other => log_debug!("Ignoring unsupported clause '{}'", other),
            }
        }

        Ok(stage)
    }

    pub fn match_clause(&self) -> Option<&MatchClause> {
        self.match_clause.as_ref()
    }

    pub fn group(&self) -> Option<&GroupClause> {
        self.group.as_ref()
    }

    pub fn sort(&self) -> Option<&SortClause> {
        self.sort.as_ref()
    }

    pub fn limit(&self) -> Option<&LimitClause> {
        self.limit.as_ref()
    }

    /// Run the present clauses over `docs`.
    ///
    /// Passthrough documents stay borrowed; only $group allocates new ones.
    pub fn execute<'a>(&self, docs: &'a [Value]) -> Vec<Cow<'a, Value>> {
        let mut results: Vec<Cow<'a, Value>> = docs.iter().map(Cow::Borrowed).collect();

        if let Some(clause) = &self.match_clause {
            results = clause.execute(results);
            log_trace!("$match kept {} of {} documents", results.len(), docs.len());
        }

        if let Some(clause) = &self.group {
            let input = results.len();
            results = clause.execute(results);
            log_trace!("$group produced {} groups from {} documents", results.len(), input);
        }

        if let Some(clause) = &self.sort {
            results = clause.execute(results);
            log_trace!("$sort ordered {} documents", results.len());
        }

        if let Some(clause) = &self.limit {
            results = clause.execute(results);
            log_trace!("$limit kept {} documents", results.len());
        }

        results
    }

    /// Collect results into one JSON array
    pub fn materialize(results: Vec<Cow<'_, Value>>) -> Value {
        Value::Array(results.into_iter().map(Cow::into_owned).collect())
    }
}

impl MatchClause {
    pub fn from_json(spec: &Map<String, Value>) -> Self {
        let conditions = spec
            .iter()
            .map(|(field, ops)| Condition::from_json(field, ops))
            .collect();
        MatchClause { conditions }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|condition| condition.matches(doc))
    }

    pub fn execute<'a>(&self, docs: Vec<Cow<'a, Value>>) -> Vec<Cow<'a, Value>> {
        docs.into_iter().filter(|doc| self.matches(doc)).collect()
    }
}

impl GroupId {
    pub fn from_json(id: Option<&Value>) -> Result<Self> {
        match id {
            None | Some(Value::Null) => Ok(GroupId::All),
            Some(Value::String(reference)) => Ok(GroupId::Field(FieldPath::from_reference(reference))),
            Some(Value::Object(members)) => {
                let mut fields = Vec::with_capacity(members.len());
                for (name, reference) in members {
                    let Some(reference) = reference.as_str() else {
                        return Err(JsonAggError::UnsupportedGroupId(format!(
                            "_id.{} must be a field reference, got {}",
                            name,
                            kind_name(reference)
                        )));
                    };
                    fields.push((name.clone(), FieldPath::from_reference(reference)));
                }
                Ok(GroupId::Composite(fields))
            }
            Some(other) => Err(JsonAggError::UnsupportedGroupId(format!(
                "expected null, a field reference, or an object of field references, got {}",
                kind_name(other)
            ))),
        }
    }

    /// Key for `doc`, or `None` if any referenced path is missing
    pub fn key_for(&self, doc: &Value) -> Option<GroupKey> {
        match self {
            GroupId::All => Some(GroupKey::All),
            GroupId::Field(path) => path
                .resolve(doc)
                .map(|value| GroupKey::Scalar(DynamicValue::from_json(value))),
            GroupId::Composite(fields) => fields
                .iter()
                .map(|(name, path)| {
                    path.resolve(doc)
                        .map(|value| (name.clone(), DynamicValue::from_json(value)))
                })
                .collect::<Option<Vec<_>>>()
                .map(GroupKey::Composite),
        }
    }
}

impl GroupKey {
    /// The `_id` value written to the group's output document
    pub fn to_json(&self) -> Value {
        match self {
            GroupKey::All => Value::from(1),
            GroupKey::Scalar(value) => value.to_json(),
            GroupKey::Composite(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl GroupClause {
    pub fn from_json(spec: &Map<String, Value>) -> Result<Self> {
        let id = GroupId::from_json(spec.get("_id"))?;

        for (field, accumulator) in spec {
            if field == "_id" {
                continue;
            }
            if field != "count" || accumulator.get("$sum") != Some(&Value::from(1)) {
                log_debug!(
                    "Accumulator '{}' is not computed; groups only report count",
                    field
                );
            }
        }

        Ok(GroupClause { id })
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    /// One `{ "_id": key, "count": n }` document per distinct key, in
    /// first-seen order. Documents whose key cannot be resolved are dropped.
    pub fn execute<'a>(&self, docs: Vec<Cow<'a, Value>>) -> Vec<Cow<'a, Value>> {
        let mut index: AHashMap<GroupKey, usize> = AHashMap::new();
        let mut groups: Vec<(GroupKey, u64)> = Vec::new();
        let mut excluded = 0usize;

        for doc in &docs {
            let Some(key) = self.id.key_for(doc) else {
                excluded += 1;
                continue;
            };
            match index.entry(key) {
                Entry::Occupied(slot) => groups[*slot.get()].1 += 1,
                Entry::Vacant(slot) => {
                    groups.push((slot.key().clone(), 1));
                    slot.insert(groups.len() - 1);
                }
            }
        }

        if excluded > 0 {
            log_trace!("$group excluded {} documents with unresolved _id", excluded);
        }

        groups
            .into_iter()
            .map(|(key, count)| {
                let mut result = Map::new();
                result.insert("_id".to_string(), key.to_json());
                result.insert("count".to_string(), Value::from(count));
                Cow::Owned(Value::Object(result))
            })
            .collect()
    }
}

impl SortClause {
    pub fn from_json(spec: &Map<String, Value>) -> Result<Self> {
        let mut fields = Vec::with_capacity(spec.len());

        for (field, value) in spec {
            let direction = match value.as_i64() {
                Some(1) => SortDirection::Ascending,
                Some(-1) => SortDirection::Descending,
                _ => {
                    return Err(JsonAggError::MalformedSpecification(format!(
                        "sort direction for '{}' must be 1 or -1",
                        field
                    )))
                }
            };
            fields.push((field.clone(), direction));
        }

        Ok(SortClause { fields })
    }

    pub fn fields(&self) -> &[(String, SortDirection)] {
        &self.fields
    }

    /// Stable multi-key sort. Keys are exact-case top-level properties; a
    /// missing property sorts as `Absent`.
    pub fn execute<'a>(&self, docs: Vec<Cow<'a, Value>>) -> Vec<Cow<'a, Value>> {
        let mut keyed: Vec<(Vec<DynamicValue>, Cow<'a, Value>)> = docs
            .into_iter()
            .map(|doc| {
                let keys = self
                    .fields
                    .iter()
                    .map(|(field, _)| DynamicValue::from_optional(get_property(&doc, field)))
                    .collect();
                (keys, doc)
            })
            .collect();

        keyed.sort_by(|(a, _), (b, _)| {
            for ((key_a, key_b), (_, direction)) in a.iter().zip(b).zip(&self.fields) {
                let cmp = match direction {
                    SortDirection::Ascending => key_a.cmp(key_b),
                    SortDirection::Descending => key_b.cmp(key_a),
                };
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });

        keyed.into_iter().map(|(_, doc)| doc).collect()
    }
}

impl LimitClause {
    /// A value that is not a non-negative integer keeps nothing
    pub fn from_json(spec: &Value) -> Self {
        let limit = spec
            .as_u64()
            .or_else(|| {
                spec.as_f64()
                    .filter(|n| *n >= 0.0 && n.fract() == 0.0)
                    .map(|n| n as u64)
            })
            .map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
        LimitClause { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn execute<'a>(&self, mut docs: Vec<Cow<'a, Value>>) -> Vec<Cow<'a, Value>> {
        docs.truncate(self.limit);
        docs
    }
}
