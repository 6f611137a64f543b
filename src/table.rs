use compact_str::CompactString;
use serde::Serialize;
use serde_json::{Map, Value};

pub const RUA: &str = "rua";
pub const REFERENCIA: &str = "referencia";
pub const BAIRRO: &str = "bairro";
pub const CIDADE: &str = "cidade";
pub const SENTIDO: &str = "sentido";

/// Columns shown to the user, in display order. Ids and created/updated
/// timestamps never appear here.
pub const DISPLAY_COLUMNS: [&str; 11] = [
    RUA,
    REFERENCIA,
    BAIRRO,
    CIDADE,
    SENTIDO,
    "horario_1",
    "horario_2",
    "horario_3",
    "horario_reuniao",
    "codigo_linha",
    "linha",
];

/// Schedule columns that are dropped when no surviving row fills them.
pub const OPTIONAL_COLUMNS: [&str; 3] = ["horario_2", "horario_3", "horario_reuniao"];

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(pub Map<String, Value>);

impl Row {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Trimmed text of a cell. Missing, null and blank cells are `None`.
    pub fn text(&self, field: &str) -> Option<String> {
        let s = match self.0.get(field)? {
            Value::Null => return None,
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        if s.is_empty() { None } else { Some(s) }
    }

    pub fn is_empty(&self, field: &str) -> bool {
        self.text(field).is_none()
    }

    /// Case-sensitive equality against the same trimmed text `text` returns.
    pub fn equals(&self, field: &str, expected: &str) -> bool {
        self.text(field).as_deref() == Some(expected)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<CompactString>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Builds a table from the store's JSON array. Columns are the union of
    /// all object keys in first-seen order.
    pub fn from_json(value: Value) -> Result<Self, String> {
        let Value::Array(items) = value else {
            return Err("expected a JSON array of rows".to_string());
        };

        let mut table = Table::default();
        for item in items {
            let Value::Object(map) = item else {
                return Err(format!("expected a JSON object per row, got {}", item));
            };
            for key in map.keys() {
                if !table.has_column(key) {
                    table.columns.push(CompactString::from(key.as_str()));
                }
            }
            table.rows.push(Row(map));
        }
        Ok(table)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps rows matching `keep`, preserving order and columns.
    pub fn retain_rows(&self, keep: impl Fn(&Row) -> bool) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Narrows every row to `columns`. Returns the missing column names when
    /// the table does not carry all of them.
    pub fn project(&self, columns: &[&str]) -> Result<Table, Vec<String>> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut out = Map::new();
                for c in columns {
                    out.insert(c.to_string(), row.get(c).cloned().unwrap_or(Value::Null));
                }
                Row(out)
            })
            .collect();

        Ok(Table {
            columns: columns.iter().map(|c| CompactString::from(*c)).collect(),
            rows,
        })
    }

    pub fn drop_column(&self, name: &str) -> Table {
        Table {
            columns: self.columns.iter().filter(|c| *c != name).cloned().collect(),
            rows: self
                .rows
                .iter()
                .map(|r| {
                    let mut map = r.0.clone();
                    map.remove(name);
                    Row(map)
                })
                .collect(),
        }
    }

    pub fn column_all_empty(&self, name: &str) -> bool {
        self.rows.iter().all(|r| r.is_empty(name))
    }

    /// Sorted distinct non-empty values of a column.
    pub fn distinct(&self, field: &str) -> Vec<String> {
        let mut values: Vec<String> = self.rows.iter().filter_map(|r| r.text(field)).collect();
        values.sort();
        values.dedup();
        values
    }
}
