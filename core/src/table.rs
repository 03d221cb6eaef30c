use crate::error::{Error, Result};
use crate::schema::OutputSchema;
use crate::validation::ValidationContext;
use comfy_table::{presets::ASCII_FULL, Table};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Row-major table of JSON scalars whose columns line up with an
/// [`OutputSchema`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputTable {
    rows: Vec<Vec<Value>>,
    width: usize,
}

impl OutputTable {
    /// Builds a table from model output. Short rows are padded with nulls.
    pub fn from_rows(rows: Vec<Vec<Value>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { rows, width }
    }

    pub fn load(path: &Path, schema: &OutputSchema, ctx: &mut ValidationContext) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        let value: Value = serde_json::from_str(&content).map_err(|err| {
            Error::MalformedOutputTable(format!("{} is not valid JSON: {err}", path.display()))
        })?;
        ctx.push(path.display().to_string());
        let table = Self::from_json(value, schema, ctx);
        ctx.pop();
        table
    }

    /// Accepts either an array of rows or an object of columns keyed by
    /// position or indicator name.
    pub fn from_json(value: Value, schema: &OutputSchema, ctx: &mut ValidationContext) -> Result<Self> {
        match value {
            Value::Array(rows) => Self::from_row_values(rows, ctx),
            Value::Object(columns) => Self::from_column_map(columns, schema, ctx),
            other => Err(Error::MalformedOutputTable(format!(
                "expected an array of rows or an object of columns, found {}",
                json_type(&other)
            ))),
        }
    }

    fn from_row_values(rows: Vec<Value>, ctx: &mut ValidationContext) -> Result<Self> {
        let mut parsed = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            match row {
                Value::Array(cells) => parsed.push(cells),
                other => {
                    return Err(Error::MalformedOutputTable(format!(
                        "row {index} is {}, expected an array",
                        json_type(&other)
                    )))
                }
            }
        }

        let width = parsed.iter().map(Vec::len).max().unwrap_or(0);
        let short = parsed.iter().filter(|row| row.len() < width).count();
        if short > 0 {
            ctx.warning(format!(
                "{short} row(s) shorter than {width} columns were padded with nulls"
            ));
        }
        Ok(Self::from_rows(parsed))
    }

    fn from_column_map(
        columns: Map<String, Value>,
        schema: &OutputSchema,
        ctx: &mut ValidationContext,
    ) -> Result<Self> {
        let mut indexed = Vec::with_capacity(columns.len());
        let mut seen = HashSet::new();
        for (key, values) in columns {
            let position = match key.parse::<usize>() {
                Ok(position) => position,
                Err(_) => schema.index_of(&key).map_err(|_| {
                    Error::MalformedOutputTable(format!(
                        "column key '{key}' is neither a position nor a registered indicator"
                    ))
                })?,
            };
            if position >= schema.len() {
                return Err(Error::MalformedOutputTable(format!(
                    "column key '{key}' is outside the {} schema positions",
                    schema.len()
                )));
            }
            if !seen.insert(position) {
                return Err(Error::MalformedOutputTable(format!(
                    "column key '{key}' names position {position} more than once"
                )));
            }
            let values = match values {
                Value::Array(values) => values,
                other => {
                    return Err(Error::MalformedOutputTable(format!(
                        "column '{key}' is {}, expected an array",
                        json_type(&other)
                    )))
                }
            };
            indexed.push((position, values));
        }

        let width = indexed.iter().map(|(position, _)| position + 1).max().unwrap_or(0);
        let height = indexed.iter().map(|(_, values)| values.len()).max().unwrap_or(0);
        if indexed.iter().any(|(_, values)| values.len() != height) {
            ctx.warning(format!(
                "columns have unequal lengths; padded to {height} rows with nulls"
            ));
        }
        if indexed.len() < width {
            ctx.warning(format!(
                "{} of {width} column positions are absent and were filled with nulls",
                width - indexed.len()
            ));
        }

        let mut rows = vec![vec![Value::Null; width]; height];
        for (position, values) in indexed {
            for (row, value) in values.into_iter().enumerate() {
                rows[row][position] = value;
            }
        }
        Ok(Self { rows, width })
    }

    pub fn to_json(&self) -> Value {
        Value::Array(
            self.rows
                .iter()
                .map(|row| Value::Array(row.clone()))
                .collect(),
        )
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Coerces one column to floats. `None` marks a missing value.
    pub fn float_column(&self, index: usize, ctx: &mut ValidationContext) -> Result<Vec<Option<f64>>> {
        if index >= self.width {
            return Err(Error::MalformedOutputTable(format!(
                "column {index} requested but the table has {} column(s)",
                self.width
            )));
        }

        ctx.push(format!("column {index}"));
        let mut values = Vec::with_capacity(self.rows.len());
        for (row, cells) in self.rows.iter().enumerate() {
            match coerce_float(&cells[index], row, ctx) {
                Ok(value) => values.push(value),
                Err(err) => {
                    ctx.pop();
                    return Err(err);
                }
            }
        }
        ctx.pop();
        Ok(values)
    }

    /// Renders the selected columns as an ASCII table, at most `max_rows` rows.
    pub fn render_columns(&self, schema: &OutputSchema, columns: &[usize], max_rows: usize) -> String {
        let mut display = Table::new();
        display.load_preset(ASCII_FULL);
        display.set_header(
            columns
                .iter()
                .map(|index| {
                    schema
                        .name_at(*index)
                        .map(str::to_string)
                        .unwrap_or_else(|| index.to_string())
                })
                .collect::<Vec<_>>(),
        );

        for row in self.rows.iter().take(max_rows) {
            let cells: Vec<String> = columns
                .iter()
                .map(|index| value_to_string(row.get(*index)))
                .collect();
            display.add_row(cells);
        }

        display.to_string()
    }
}

fn coerce_float(value: &Value, row: usize, ctx: &mut ValidationContext) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_f64()),
        Value::Bool(flag) => {
            ctx.warning(format!("row {row}: boolean {flag} coerced to float"));
            Ok(Some(if *flag { 1.0 } else { 0.0 }))
        }
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
                ctx.warning(format!("row {row}: string '{raw}' treated as missing"));
                return Ok(None);
            }
            match trimmed.parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => {
                    ctx.warning(format!("row {row}: string '{raw}' coerced to float"));
                    Ok(Some(parsed))
                }
                Ok(_) => {
                    ctx.warning(format!("row {row}: non-finite value '{raw}' treated as missing"));
                    Ok(None)
                }
                Err(_) => Err(Error::MalformedOutputTable(format!(
                    "row {row}: could not convert string '{raw}' to float"
                ))),
            }
        }
        other => Err(Error::MalformedOutputTable(format!(
            "row {row}: cannot coerce {} to float",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn value_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::Null) | None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
    }
}
