//! Jupyter notebook model shared by Read and NotebookEdit

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cell source, stored either as one string or as a list of lines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Text(String),
    Lines(Vec<String>),
}

impl Source {
    pub fn as_text(&self) -> String {
        match self {
            Source::Text(text) => text.clone(),
            Source::Lines(lines) => lines.concat(),
        }
    }
}

impl Default for Source {
    fn default() -> Self {
        Source::Text(String::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub cell_type: CellType,
    #[serde(default)]
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_count: Option<Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Cell {
    /// A fresh cell with empty outputs when it is code
    pub fn new(cell_type: CellType, source: impl Into<String>) -> Self {
        let code = cell_type == CellType::Code;
        Self {
            cell_type,
            source: Source::Text(source.into()),
            id: None,
            outputs: code.then(Vec::new),
            execution_count: code.then_some(Value::Null),
            metadata: Map::new(),
        }
    }

    /// Replace the source, clearing stale outputs of code cells
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = Source::Text(source.into());
        if self.cell_type == CellType::Code {
            self.outputs = Some(Vec::new());
            self.execution_count = Some(Value::Null);
        }
    }

    /// Change the cell type, adding or removing code-only fields
    pub fn set_type(&mut self, cell_type: CellType) {
        self.cell_type = cell_type;
        if cell_type == CellType::Code {
            self.outputs.get_or_insert_with(Vec::new);
            self.execution_count.get_or_insert(Value::Null);
        } else {
            self.outputs = None;
            self.execution_count = None;
        }
    }

    fn render_outputs(&self) -> String {
        let mut out = String::new();
        for output in self.outputs.iter().flatten() {
            let kind = output.get("output_type").and_then(Value::as_str).unwrap_or("");
            let text = match kind {
                "stream" => output.get("text").map(join_text),
                "execute_result" | "display_data" => output
                    .get("data")
                    .and_then(|d| d.get("text/plain"))
                    .map(join_text)
                    .or_else(|| {
                        output
                            .get("data")
                            .and_then(|d| d.get("image/png"))
                            .map(|_| "[image/png output]".to_string())
                    }),
                "error" => Some(format!(
                    "{}: {}",
                    output.get("ename").and_then(Value::as_str).unwrap_or("Error"),
                    output.get("evalue").and_then(Value::as_str).unwrap_or("")
                )),
                _ => None,
            };
            if let Some(text) = text {
                out.push_str(&text);
                if !text.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        out
    }
}

fn join_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Notebook {
    pub fn parse(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Serialize with the one-space indent Jupyter writes
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        buf.push(b'\n');
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn language(&self) -> &str {
        self.metadata
            .get("language_info")
            .and_then(|l| l.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("python")
    }

    /// Index of the cell with `id`, falling back to a numeric index
    pub fn find_cell(&self, id: &str) -> Option<usize> {
        self.cells
            .iter()
            .position(|c| c.id.as_deref() == Some(id))
            .or_else(|| id.parse::<usize>().ok().filter(|i| *i < self.cells.len()))
    }

    /// Text rendering of every cell and its outputs
    pub fn render(&self) -> String {
        let language = self.language();
        let mut out = String::new();
        for (index, cell) in self.cells.iter().enumerate() {
            let id = cell.id.clone().unwrap_or_else(|| index.to_string());
            let kind = match cell.cell_type {
                CellType::Code => "code",
                CellType::Markdown => "markdown",
                CellType::Raw => "raw",
            };
            out.push_str(&format!("<cell id=\"{}\" type=\"{}\">\n", id, kind));
            let source = cell.source.as_text();
            if cell.cell_type == CellType::Code {
                out.push_str(&format!("```{}\n{}\n```\n", language, source.trim_end()));
            } else {
                out.push_str(source.trim_end());
                out.push('\n');
            }
            let outputs = cell.render_outputs();
            if !outputs.is_empty() {
                out.push_str("<outputs>\n");
                out.push_str(&outputs);
                out.push_str("</outputs>\n");
            }
            out.push_str("</cell>\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Notebook {
        serde_json::from_value(json!({
            "cells": [
                {"cell_type": "code", "id": "abc", "source": ["x = 1\n", "x"], "metadata": {},
                 "outputs": [{"output_type": "execute_result", "data": {"text/plain": ["1"]}}],
                 "execution_count": 3},
                {"cell_type": "markdown", "source": "notes", "metadata": {}}
            ],
            "metadata": {},
            "nbformat": 4,
            "nbformat_minor": 5
        }))
        .unwrap()
    }

    #[test]
    fn test_render() {
        let rendered = sample().render();
        assert!(rendered.contains("<cell id=\"abc\" type=\"code\">"));
        assert!(rendered.contains("```python\nx = 1\nx\n```"));
        assert!(rendered.contains("<outputs>\n1\n</outputs>"));
        assert!(rendered.contains("<cell id=\"1\" type=\"markdown\">\nnotes"));
    }

    #[test]
    fn test_find_cell() {
        let nb = sample();
        assert_eq!(nb.find_cell("abc"), Some(0));
        assert_eq!(nb.find_cell("1"), Some(1));
        assert_eq!(nb.find_cell("7"), None);
    }

    #[test]
    fn test_set_source_clears_outputs() {
        let mut nb = sample();
        nb.cells[0].set_source("y = 2");
        assert_eq!(nb.cells[0].outputs.as_deref().map(|o| o.len()), Some(0));
        assert_eq!(nb.cells[0].execution_count, Some(Value::Null));

        let json = nb.to_json().unwrap();
        assert!(json.contains("\"nbformat\": 4"));
        let reparsed = Notebook::parse(&json).unwrap();
        assert_eq!(reparsed.cells[0].source.as_text(), "y = 2");
    }

    #[test]
    fn test_set_type() {
        let mut cell = Cell::new(CellType::Code, "1");
        cell.set_type(CellType::Markdown);
        assert!(cell.outputs.is_none());
        cell.set_type(CellType::Code);
        assert!(cell.outputs.is_some());
    }
}
