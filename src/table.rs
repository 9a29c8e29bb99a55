use std::borrow::Cow;
use std::fmt::Write as _;

use crate::db::Row;

const NULL_CELL: &str = "NULL";

/// Left-aligned text table with a dashed rule under the header.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    /// Adds a database row, showing SQL NULL as `NULL`.
    pub fn push_db_row(&mut self, row: &Row) {
        self.push_row(
            row.iter()
                .map(|cell| cell.as_deref().unwrap_or(NULL_CELL).to_string()),
        );
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self
            .headers
            .iter()
            .map(|h| display_width(h).max(3))
            .collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(display_width(&clean_cell(cell)));
            }
        }

        let mut output = String::new();
        let _ = writeln!(output, "{}", format_line(&self.headers, &widths));
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        let _ = writeln!(output, "{}", format_line(&rule, &widths));
        for row in &self.rows {
            let _ = writeln!(output, "{}", format_line(row, &widths));
        }
        output
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

fn format_line(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = clean_cell(value);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI escape, e.g. \x1b[31m
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn clean_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
