use serde_json::{Map, Value};

pub const NO_DATA_NOTICE: &str =
    "Нет данных для превью (rows_preview пустой или в неожиданном формате).";

/// Classification of a raw `rows_preview` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RowsPreview {
    Rows(Vec<Map<String, Value>>),
    Empty,
    Malformed,
}

impl RowsPreview {
    pub fn classify(raw: &Value) -> Self {
        match raw {
            Value::Null => RowsPreview::Empty,
            Value::String(s) if s.trim().is_empty() => RowsPreview::Empty,
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                // A string holding another string is not a row set.
                Ok(Value::String(_)) => RowsPreview::Malformed,
                Ok(inner) => RowsPreview::classify(&inner),
                Err(_) => RowsPreview::Malformed,
            },
            Value::Array(items) if items.is_empty() => RowsPreview::Empty,
            Value::Array(items) => {
                let mut rows = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(map) => rows.push(map.clone()),
                        _ => return RowsPreview::Malformed,
                    }
                }
                RowsPreview::Rows(rows)
            }
            _ => RowsPreview::Malformed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl PreviewTable {
    /// Projects every row onto one fixed column list: the explicit one when
    /// given, otherwise the key order of the first row.
    pub fn build(rows: &[Map<String, Value>], columns: Option<&[String]>) -> Self {
        let columns: Vec<String> = match columns {
            Some(cols) if !cols.is_empty() => cols.to_vec(),
            _ => rows
                .first()
                .map(|first| first.keys().cloned().collect())
                .unwrap_or_default(),
        };

        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        PreviewTable { columns, rows }
    }
}

/// What the renderer shows for a turn that carries `rows_preview`.
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewSection {
    Table(PreviewTable),
    NoData,
}

impl PreviewSection {
    pub fn from_raw(raw: &Value, columns: Option<&[String]>) -> Self {
        match RowsPreview::classify(raw) {
            RowsPreview::Rows(rows) => PreviewSection::Table(PreviewTable::build(&rows, columns)),
            RowsPreview::Empty | RowsPreview::Malformed => PreviewSection::NoData,
        }
    }
}

pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_rows() {
        let raw = json!([{"a": 1}, {"a": 2}]);
        match RowsPreview::classify(&raw) {
            RowsPreview::Rows(rows) => assert_eq!(rows.len(), 2),
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_string_encoded_rows() {
        let raw = json!(r#"[{"a": 1, "b": "x"}]"#);
        assert!(matches!(RowsPreview::classify(&raw), RowsPreview::Rows(_)));
    }

    #[test]
    fn test_classify_empty_variants() {
        assert_eq!(RowsPreview::classify(&json!(null)), RowsPreview::Empty);
        assert_eq!(RowsPreview::classify(&json!([])), RowsPreview::Empty);
        assert_eq!(RowsPreview::classify(&json!("")), RowsPreview::Empty);
        assert_eq!(RowsPreview::classify(&json!("[]")), RowsPreview::Empty);
    }

    #[test]
    fn test_classify_malformed_variants() {
        assert_eq!(RowsPreview::classify(&json!("not json")), RowsPreview::Malformed);
        assert_eq!(RowsPreview::classify(&json!(42)), RowsPreview::Malformed);
        assert_eq!(RowsPreview::classify(&json!({"a": 1})), RowsPreview::Malformed);
        assert_eq!(RowsPreview::classify(&json!([[1, 2]])), RowsPreview::Malformed);
        assert_eq!(RowsPreview::classify(&json!([{"a": 1}, 3])), RowsPreview::Malformed);
        assert_eq!(RowsPreview::classify(&json!("\"[]\"")), RowsPreview::Malformed);
    }

    #[test]
    fn test_inferred_columns_follow_first_row() {
        let raw = json!([{"a": 1, "b": 2}, {"a": 3}]);
        let section = PreviewSection::from_raw(&raw, None);
        let PreviewSection::Table(table) = section else {
            panic!("expected table");
        };
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows[0], vec!["1", "2"]);
        assert_eq!(table.rows[1], vec!["3", ""]);
    }

    #[test]
    fn test_inferred_columns_keep_wire_order() {
        let raw: Value = serde_json::from_str(r#"[{"zeta": 1, "alpha": 2, "mid": 3}]"#).unwrap();
        let PreviewSection::Table(table) = PreviewSection::from_raw(&raw, None) else {
            panic!("expected table");
        };
        assert_eq!(table.columns, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_explicit_columns_override() {
        let raw = json!([{"a": 1, "b": 2}]);
        let columns = vec!["b".to_string(), "c".to_string()];
        let PreviewSection::Table(table) = PreviewSection::from_raw(&raw, Some(&columns)) else {
            panic!("expected table");
        };
        assert_eq!(table.columns, vec!["b", "c"]);
        assert_eq!(table.rows[0], vec!["2", ""]);
    }

    #[test]
    fn test_empty_explicit_columns_fall_back_to_inference() {
        let raw = json!([{"a": 1}]);
        let columns: Vec<String> = Vec::new();
        let PreviewSection::Table(table) = PreviewSection::from_raw(&raw, Some(&columns)) else {
            panic!("expected table");
        };
        assert_eq!(table.columns, vec!["a"]);
    }

    #[test]
    fn test_malformed_string_renders_no_data() {
        assert_eq!(
            PreviewSection::from_raw(&json!("not json"), None),
            PreviewSection::NoData
        );
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&json!(null)), "");
        assert_eq!(cell_text(&json!("Май")), "Май");
        assert_eq!(cell_text(&json!(0.25)), "0.25");
        assert_eq!(cell_text(&json!(true)), "true");
        assert_eq!(cell_text(&json!([1, 2])), "[1,2]");
    }
}
