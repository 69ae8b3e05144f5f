//! Loosely-typed module records
//!
//! A record is a JSON object with a string `id`; every other field is free
//! form and owned by the module that defines it. Ids are the creation time
//! in epoch milliseconds, rendered as a decimal string.

use serde_json::{Map, Value};

use crate::{time, Error, Result};

/// One module record
pub type Record = Map<String, Value>;

/// Whole-store snapshot: module storage key → array of records
pub type DataBlob = Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Id of a record, if it carries a non-empty one
pub fn record_id(record: &Record) -> Option<&str> {
    record
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Generate a timestamp id not already used by `existing`
pub fn generate_record_id(existing: &[Record]) -> String {
    let mut candidate = time::epoch_millis();
    while existing
        .iter()
        .any(|r| record_id(r) == Some(candidate.to_string().as_str()))
    {
        candidate += 1;
    }
    candidate.to_string()
}

/// Normalize an incoming record: numeric ids become strings, blank ids are dropped.
pub fn normalize(mut record: Record) -> Record {
    match record.get(ID_FIELD) {
        Some(Value::Number(n)) => {
            let id = n.to_string();
            record.insert(ID_FIELD.to_string(), Value::String(id));
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            record.remove(ID_FIELD);
        }
        Some(Value::Null) => {
            record.remove(ID_FIELD);
        }
        _ => {}
    }
    record
}

/// Prepare a record for insertion into `existing`.
///
/// Keeps a client-supplied id (rejecting duplicates), otherwise assigns a
/// fresh timestamp id. Stamps `createdAt` unless already present.
pub fn prepare_new(existing: &[Record], record: Record) -> Result<Record> {
    let mut record = normalize(record);

    match record_id(&record) {
        Some(id) => {
            if existing.iter().any(|r| record_id(r) == Some(id)) {
                return Err(Error::Conflict(format!("Record id already exists: {}", id)));
            }
        }
        None => {
            let id = generate_record_id(existing);
            record.insert(ID_FIELD.to_string(), Value::String(id));
        }
    }

    if !record.contains_key(CREATED_AT_FIELD) {
        record.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(time::now_rfc3339()),
        );
    }

    Ok(record)
}

/// Shallow-merge `patch` over `existing`. The id never changes.
pub fn apply_update(existing: &mut Record, patch: Record) {
    for (key, value) in patch {
        if key == ID_FIELD {
            continue;
        }
        existing.insert(key, value);
    }
    existing.insert(
        UPDATED_AT_FIELD.to_string(),
        Value::String(time::now_rfc3339()),
    );
}

/// Decode a JSON array of records, normalizing ids.
///
/// Every element must be an object; elements without an id get one.
pub fn records_from_value(value: Value) -> Result<Vec<Record>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(Error::InvalidInput(format!(
                "Expected an array of records, got {}",
                json_type_name(&other)
            )))
        }
    };

    let mut records: Vec<Record> = Vec::with_capacity(items.len());
    for item in items {
        let obj = match item {
            Value::Object(obj) => obj,
            other => {
                return Err(Error::InvalidInput(format!(
                    "Expected record object, got {}",
                    json_type_name(&other)
                )))
            }
        };
        let mut record = normalize(obj);
        if record_id(&record).is_none() {
            let id = generate_record_id(&records);
            record.insert(ID_FIELD.to_string(), Value::String(id));
        }
        records.push(record);
    }
    Ok(records)
}

/// Encode records back into a JSON array
pub fn records_to_value(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Flatten a field value into searchable text (strings, numbers, arrays of either)
fn searchable_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.to_lowercase()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| searchable_text(v, out)),
        _ => {}
    }
}

/// Case-insensitive substring match against one field
pub fn field_contains(record: &Record, field: &str, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    let Some(value) = record.get(field) else {
        return false;
    };
    let mut texts = Vec::new();
    searchable_text(value, &mut texts);
    texts.iter().any(|t| t.contains(&needle))
}

/// Case-insensitive substring match against every field
pub fn matches_keyword(record: &Record, keyword: &str) -> bool {
    let keyword = keyword.to_lowercase();
    let mut texts = Vec::new();
    for value in record.values() {
        searchable_text(value, &mut texts);
    }
    texts.iter().any(|t| t.contains(&keyword))
}

/// How many records mention `name` in any field.
///
/// Used for cross-module tallies such as "training records naming this person".
pub fn count_mentions(records: &[Record], name: &str) -> usize {
    if name.trim().is_empty() {
        return 0;
    }
    records.iter().filter(|r| matches_keyword(r, name)).count()
}

/// Search form state: keyword over all fields plus per-field filters
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub keyword: Option<String>,
    pub filters: Vec<(String, String)>,
    pub sort: Option<String>,
    pub descending: bool,
}

impl RecordQuery {
    /// Filter and order a module's records.
    ///
    /// Without a sort field, records are ordered by id (creation time).
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let mut matched: Vec<Record> = records
            .into_iter()
            .filter(|r| {
                self.keyword
                    .as_deref()
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map_or(true, |k| matches_keyword(r, k))
            })
            .filter(|r| {
                self.filters
                    .iter()
                    .filter(|(_, v)| !v.trim().is_empty())
                    .all(|(field, v)| field_contains(r, field, v.trim()))
            })
            .collect();

        match self.sort.as_deref() {
            Some(field) => {
                matched.sort_by(|a, b| compare_field(a.get(field), b.get(field)));
            }
            None => {
                matched.sort_by(|a, b| compare_ids(record_id(a), record_id(b)));
            }
        }
        if self.descending {
            matched.reverse();
        }

        matched
    }
}

/// Sort key for ids: missing, then numeric in numeric order, then the rest as text
fn id_key(id: Option<&str>) -> (u8, i64, &str) {
    match id {
        None => (0, 0, ""),
        Some(s) => match s.parse::<i64>() {
            Ok(n) => (1, n, s),
            Err(_) => (2, 0, s),
        },
    }
}

fn compare_ids(a: Option<&str>, b: Option<&str>) -> std::cmp::Ordering {
    id_key(a).cmp(&id_key(b))
}

/// Fixed position of each JSON type when a sort field holds mixed types
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x @ Value::Array(_)), Some(y @ Value::Array(_)))
        | (Some(x @ Value::Object(_)), Some(y @ Value::Object(_))) => {
            x.to_string().cmp(&y.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
