//! JSON canonicalization: sorted object keys, compact separators.

use serde_json::{Map, Value};

use crate::canon::{Location, ParseError};
use crate::model::Format;

pub fn parse(text: &str) -> Result<Value, ParseError> {
    serde_json::from_str(text).map_err(|err| {
        ParseError::new(Format::Json, Location::new(err.line(), err.column()), err.to_string())
    })
}

pub fn canonicalize(text: &str) -> Result<String, ParseError> {
    let value = sort_keys(parse(text)?);
    serde_json::to_string(&value)
        .map_err(|err| ParseError::new(Format::Json, Location::start(), err.to_string()))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, sort_keys(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
