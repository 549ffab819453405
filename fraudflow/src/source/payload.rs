//! Wire format of the payments API.
//!
//! The API answers with a split-orientation table, `{"columns": [...],
//! "data": [[...], ...]}`, which is frequently double encoded as a JSON
//! string. A plain array of row objects is accepted as well.

use crate::errors::SourceError;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Split-orientation table.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitPayload {
    /// Column names.
    pub columns: Vec<String>,
    /// Rows, positionally aligned with `columns`.
    pub data: Vec<Vec<Value>>,
}

impl SplitPayload {
    /// Zips every row with the columns. Rows of the wrong width are errors.
    #[must_use]
    pub fn into_rows(self) -> Vec<Result<Map<String, Value>, SourceError>> {
        let width = self.columns.len();
        let columns = self.columns;
        self.data
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                if row.len() != width {
                    return Err(SourceError::invalid_payload(
                        index,
                        None,
                        format!("row has {} values for {width} columns", row.len()),
                    ));
                }
                Ok(columns.iter().cloned().zip(row).collect())
            })
            .collect()
    }
}

/// Parses a response body into rows.
///
/// Fails with [`SourceError::MalformedResponse`] only when the envelope
/// itself is unreadable. Individual bad rows are returned as `Err` entries.
pub fn parse_split_payload(body: &str) -> Result<Vec<Result<Map<String, Value>, SourceError>>, SourceError> {
    let mut value: Value = serde_json::from_str(body)
        .map_err(|e| SourceError::MalformedResponse(format!("response is not JSON: {e}")))?;

    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner).map_err(|e| {
            SourceError::MalformedResponse(format!("string payload is not JSON: {e}"))
        })?;
    }

    if value.get("columns").is_some() {
        let payload: SplitPayload = serde_json::from_value(value)
            .map_err(|e| SourceError::MalformedResponse(format!("bad split payload: {e}")))?;
        return Ok(payload.into_rows());
    }

    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(row) => Ok(row),
                other => Err(SourceError::invalid_payload(
                    index,
                    None,
                    format!("row is not an object: {other}"),
                )),
            })
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(SourceError::MalformedResponse(format!(
            "unexpected payload shape: {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_payload_rows() {
        let body = json!({
            "columns": ["trans_num", "amt"],
            "data": [["T1", 10.5], ["T2", 3.0]]
        })
        .to_string();

        let rows = parse_split_payload(&body).unwrap();
        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first["trans_num"], "T1");
        assert_eq!(first["amt"], 10.5);
    }

    #[test]
    fn test_double_encoded_payload() {
        let inner = json!({"columns": ["trans_num"], "data": [["T9"]]}).to_string();
        let body = serde_json::to_string(&inner).unwrap();

        let rows = parse_split_payload(&body).unwrap();
        assert_eq!(rows[0].as_ref().unwrap()["trans_num"], "T9");
    }

    #[test]
    fn test_short_row_is_row_error() {
        let body = json!({"columns": ["a", "b"], "data": [["x"], ["x", "y"]]}).to_string();
        let rows = parse_split_payload(&body).unwrap();
        assert!(matches!(
            rows[0],
            Err(SourceError::InvalidPayload { index: 0, .. })
        ));
        assert!(rows[1].is_ok());
    }

    #[test]
    fn test_record_array_accepted() {
        let body = json!([{"trans_num": "T1"}, 7]).to_string();
        let rows = parse_split_payload(&body).unwrap();
        assert!(rows[0].is_ok());
        assert!(rows[1].is_err());
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(matches!(
            parse_split_payload("<html>502</html>"),
            Err(SourceError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_split_payload("42"),
            Err(SourceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_empty_window() {
        let body = json!({"columns": ["trans_num"], "data": []}).to_string();
        assert!(parse_split_payload(&body).unwrap().is_empty());
        assert!(parse_split_payload("null").unwrap().is_empty());
    }
}
