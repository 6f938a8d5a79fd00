// src/extract/mod.rs

pub mod normalize;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::fetch::DocumentSource;

pub use normalize::{clean_number, parse_market_cap};

/// Output labels for the two scraped attributes.
pub const TABLE_ATTRIBS: [&str; 2] = ["Name", "MC_USD_Billion"];

static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("selector should parse"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("selector should parse"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("selector should parse"));

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub name: String,
    pub market_cap_usd: f64,
}

/// Why a single source row was left out.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    TooFewCells { found: usize },
    EmptyName,
    InvalidNumber { raw: String },
    OutOfRange { value: f64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooFewCells { found } => write!(f, "expected 3 cells, found {}", found),
            SkipReason::EmptyName => write!(f, "empty name cell"),
            SkipReason::InvalidNumber { raw } => write!(f, "not a number: {:?}", raw),
            SkipReason::OutOfRange { value } => write!(f, "value out of range: {}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    /// Position of the `<tr>` inside the table; the header row is 0.
    pub row_index: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub rows: Vec<RawRow>,
    pub skipped: Vec<SkippedRow>,
}

/// How to choose the data table among all tables carrying the marker class.
///
/// `First` depends purely on page layout and breaks silently when the page
/// gains a table above the one we want. Prefer `HeaderContains` when the
/// header text is known.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "strategy", content = "text", rename_all = "snake_case")]
pub enum TableSelection {
    #[default]
    First,
    /// First table whose header row contains this text (case-insensitive).
    HeaderContains(String),
}

impl TableSelection {
    pub fn select<'a>(&self, tables: &[ElementRef<'a>]) -> Option<ElementRef<'a>> {
        match self {
            TableSelection::First => {
                if tables.len() > 1 {
                    warn!(
                        candidates = tables.len(),
                        "selecting the first marked table by position; \
                         this breaks if the page layout changes"
                    );
                }
                tables.first().copied()
            }
            TableSelection::HeaderContains(needle) => {
                let needle = needle.to_lowercase();
                tables.iter().copied().find(|t| {
                    t.select(&ROW)
                        .next()
                        .map(|header| {
                            header
                                .text()
                                .collect::<String>()
                                .to_lowercase()
                                .contains(&needle)
                        })
                        .unwrap_or(false)
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub table_class: String,
    pub selection: TableSelection,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            table_class: "wikitable".to_string(),
            selection: TableSelection::First,
        }
    }
}

/// Fetch the document and scrape it.
pub fn extract<S: DocumentSource + ?Sized>(
    source: &S,
    opts: &ExtractOptions,
) -> Result<Extraction> {
    let html = source.fetch()?;
    extract_from_html(&html, opts)
}

/// Scrape rows from an already-fetched document.
pub fn extract_from_html(html: &str, opts: &ExtractOptions) -> Result<Extraction> {
    let document = Html::parse_document(html);
    let tables: Vec<ElementRef> = document
        .select(&TABLE)
        .filter(|t| t.value().classes().any(|c| c == opts.table_class))
        .collect();
    debug!(count = tables.len(), class = %opts.table_class, "marked tables");

    let table = opts
        .selection
        .select(&tables)
        .ok_or_else(|| PipelineError::NoTable {
            class: opts.table_class.clone(),
        })?;

    let mut out = Extraction::default();
    // header row first
    for (row_index, tr) in table.select(&ROW).enumerate().skip(1) {
        match parse_row(tr) {
            Ok(row) => out.rows.push(row),
            Err(reason) => {
                debug!(row_index, %reason, "skipping row");
                out.skipped.push(SkippedRow { row_index, reason });
            }
        }
    }

    info!(
        rows = out.rows.len(),
        skipped = out.skipped.len(),
        "extracted table rows"
    );
    Ok(out)
}

fn parse_row(tr: ElementRef) -> std::result::Result<RawRow, SkipReason> {
    let cells: Vec<ElementRef> = tr.select(&CELL).collect();
    if cells.len() < 3 {
        return Err(SkipReason::TooFewCells { found: cells.len() });
    }

    let name = cells[1].text().collect::<String>().trim().to_string();
    if name.is_empty() {
        return Err(SkipReason::EmptyName);
    }
    let market_cap_usd = parse_market_cap(&cells[2].text().collect::<String>())?;

    Ok(RawRow {
        name,
        market_cap_usd,
    })
}
