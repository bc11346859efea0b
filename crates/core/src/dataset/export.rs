//! Tabular export of datasets, dispatched on the output file extension.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

/// Name of the table written by SQLite exports.
pub const SQLITE_TABLE: &str = "dataset";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),

    /// Recognized format with no writer in this build.
    #[error("Export format {0} is not available in this build")]
    FormatUnavailable(String),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite export failed: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// A dataset flattened into named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns: columns.into_iter().map(Into::into).collect(), rows }
    }

    /// Rows as JSON objects keyed by column name, in column order.
    pub fn to_objects(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }
}

/// Write `table` in the format implied by `path`'s extension (case-insensitive).
///
/// Supported: `.json`, `.jsonl`, `.csv`, `.tsv`, `.md`/`.markdown`, `.tex`,
/// `.html`/`.htm`, `.xml`, `.db`/`.sqlite`/`.sqlite3`. Spreadsheet extensions
/// are recognized but unavailable.
pub fn save_table(table: &Table, path: &Path) -> Result<(), ExportError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let body = match extension.as_str() {
        "json" => serde_json::to_string_pretty(&table.to_objects())?,
        "jsonl" => to_json_lines(table)?,
        "csv" => to_delimited(table, ','),
        "tsv" => to_delimited(table, '\t'),
        "md" | "markdown" => to_markdown(table),
        "tex" => to_latex(table),
        "html" | "htm" => to_html(table),
        "xml" => to_xml(table),
        "db" | "sqlite" | "sqlite3" => {
            write_sqlite(table, path)?;
            info!(path = %path.display(), rows = table.rows.len(), "exported dataset");
            return Ok(());
        }
        "xlsx" | "xls" | "xlsm" => return Err(ExportError::FormatUnavailable(extension)),
        _ => return Err(ExportError::UnsupportedExtension(display_extension(path))),
    };
    fs::write(path, body)
        .map_err(|source| ExportError::Io { path: path.to_path_buf(), source })?;
    info!(path = %path.display(), rows = table.rows.len(), "exported dataset");
    Ok(())
}

fn display_extension(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!(".{}", ext.to_string_lossy()),
        None => "(none)".to_string(),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_json_lines(table: &Table) -> Result<String, ExportError> {
    let mut out = String::new();
    for object in table.to_objects() {
        out.push_str(&serde_json::to_string(&object)?);
        out.push('\n');
    }
    Ok(out)
}

fn to_delimited(table: &Table, sep: char) -> String {
    let quote = |field: &str| {
        if field.contains([sep, '"', '\n', '\r']) {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    };
    let mut out = String::new();
    let header: Vec<String> = table.columns.iter().map(|c| quote(c.as_str())).collect();
    out.push_str(&header.join(&sep.to_string()));
    out.push('\n');
    for row in &table.rows {
        let fields: Vec<String> = row.iter().map(|v| quote(&cell_text(v))).collect();
        out.push_str(&fields.join(&sep.to_string()));
        out.push('\n');
    }
    out
}

fn to_markdown(table: &Table) -> String {
    let escape = |text: &str| text.replace('|', "\\|").replace("\r\n", "<br>").replace('\n', "<br>");
    let mut out = String::new();
    let header: Vec<String> = table.columns.iter().map(|c| escape(c.as_str())).collect();
    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&format!("|{}\n", " --- |".repeat(table.columns.len())));
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(|v| escape(&cell_text(v))).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

fn to_latex(table: &Table) -> String {
    let mut out = String::new();
    out.push_str(&format!("\\begin{{tabular}}{{{}}}\n\\hline\n", "l".repeat(table.columns.len())));
    let header: Vec<String> = table.columns.iter().map(|c| escape_latex(c)).collect();
    out.push_str(&format!("{} \\\\\n\\hline\n", header.join(" & ")));
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(|v| escape_latex(&cell_text(v))).collect();
        out.push_str(&format!("{} \\\\\n", cells.join(" & ")));
    }
    out.push_str("\\hline\n\\end{tabular}\n");
    out
}

fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn to_html(table: &Table) -> String {
    let mut out = String::from("<table border=\"1\" class=\"dataset\">\n  <thead>\n    <tr>\n");
    for column in &table.columns {
        out.push_str(&format!("      <th>{}</th>\n", escape_markup(column)));
    }
    out.push_str("    </tr>\n  </thead>\n  <tbody>\n");
    for row in &table.rows {
        out.push_str("    <tr>\n");
        for value in row {
            out.push_str(&format!("      <td>{}</td>\n", escape_markup(&cell_text(value))));
        }
        out.push_str("    </tr>\n");
    }
    out.push_str("  </tbody>\n</table>\n");
    out
}

fn to_xml(table: &Table) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<data>\n");
    for row in &table.rows {
        out.push_str("  <row>\n");
        for (column, value) in table.columns.iter().zip(row) {
            out.push_str(&format!(
                "    <{column}>{}</{column}>\n",
                escape_markup(&cell_text(value))
            ));
        }
        out.push_str("  </row>\n");
    }
    out.push_str("</data>\n");
    out
}

fn write_sqlite(table: &Table, path: &Path) -> Result<(), ExportError> {
    if path.exists() {
        fs::remove_file(path)
            .map_err(|source| ExportError::Io { path: path.to_path_buf(), source })?;
    }
    let mut conn = Connection::open(path)?;
    let columns: Vec<String> =
        table.columns.iter().map(|c| format!("\"{}\" TEXT", c.replace('"', "\"\""))).collect();
    conn.execute(&format!("CREATE TABLE {SQLITE_TABLE} ({})", columns.join(", ")), [])?;

    let placeholders: Vec<String> = (1..=table.columns.len()).map(|i| format!("?{i}")).collect();
    let tx = conn.transaction()?;
    {
        let mut stmt =
            tx.prepare(&format!("INSERT INTO {SQLITE_TABLE} VALUES ({})", placeholders.join(", ")))?;
        for row in &table.rows {
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            stmt.execute(params_from_iter(cells.iter()))?;
        }
    }
    tx.commit()?;
    Ok(())
}
