// src/ingest/tables.rs
//! Plain table model lifted out of the HTML so scoring and extraction stay pure.

use once_cell::sync::OnceCell;
use scraper::{ElementRef, Html, Selector};

use crate::ingest::parse::normalize_period;

fn sel_table() -> &'static Selector {
    static SEL: OnceCell<Selector> = OnceCell::new();
    SEL.get_or_init(|| Selector::parse("table").unwrap())
}

fn sel_caption() -> &'static Selector {
    static SEL: OnceCell<Selector> = OnceCell::new();
    SEL.get_or_init(|| Selector::parse("caption").unwrap())
}

fn sel_row() -> &'static Selector {
    static SEL: OnceCell<Selector> = OnceCell::new();
    SEL.get_or_init(|| Selector::parse("tr").unwrap())
}

fn sel_cell() -> &'static Selector {
    static SEL: OnceCell<Selector> = OnceCell::new();
    SEL.get_or_init(|| Selector::parse("th, td").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub is_header: bool,
}

impl Cell {
    pub fn header(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_header: true,
        }
    }

    pub fn data(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_header: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub caption: Option<String>,
    pub rows: Vec<Row>,
}

/// Text of an element as trimmed fragments joined by a single space, NBSP folded.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Every `<table>` in document order.
pub fn parse_tables(html: &str) -> Vec<Table> {
    let doc = Html::parse_document(html);
    doc.select(sel_table())
        .map(|table| {
            let caption = table
                .select(sel_caption())
                .next()
                .map(element_text)
                .filter(|c| !c.is_empty());
            let rows = table
                .select(sel_row())
                .map(|tr| Row {
                    cells: tr
                        .select(sel_cell())
                        .map(|c| Cell {
                            text: element_text(c),
                            is_header: c.value().name() == "th",
                        })
                        .collect(),
                })
                .collect();
            Table { caption, rows }
        })
        .collect()
}

impl Table {
    /// Caption plus every cell, space separated.
    pub fn full_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(c) = &self.caption {
            parts.push(c);
        }
        for row in &self.rows {
            for cell in &row.cells {
                if !cell.text.is_empty() {
                    parts.push(&cell.text);
                }
            }
        }
        parts.join(" ")
    }

    /// Column labels, preferring the last header-only row with at least two labels.
    /// Falls back to every header cell in the table.
    pub fn header_labels(&self) -> Vec<String> {
        let header_rows = self
            .rows
            .iter()
            .filter(|r| !r.cells.is_empty() && r.cells.iter().all(|c| c.is_header));

        if let Some(row) = header_rows.filter(|r| r.cells.len() >= 2).last() {
            return row.cells.iter().map(|c| c.text.clone()).collect();
        }

        self.rows
            .iter()
            .flat_map(|r| r.cells.iter())
            .filter(|c| c.is_header)
            .map(|c| c.text.clone())
            .collect()
    }

    /// First row whose leading cell reads as a quarter, with its full cell texts.
    pub fn latest_period_row(&self) -> Option<(String, Vec<String>)> {
        self.rows.iter().find_map(|row| {
            if row.cells.len() < 2 {
                return None;
            }
            let period = normalize_period(&row.cells[0].text)?;
            Some((period, row.cells.iter().map(|c| c.text.clone()).collect()))
        })
    }
}
