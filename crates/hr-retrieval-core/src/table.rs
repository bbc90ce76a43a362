//! Table normalization, Markdown rendering, and topic enrichment.
//!
//! Policy tables (leave entitlements, holiday calendars, pay bands) are
//! rendered as one chunk each. A synthetic topic line built from the column
//! headers and a few sample values is prepended so keyword search can find
//! a table by what it is about, not only by the literal cell contents.
//!
//! ```text
//! [TABLE DATA] Topic: leave type days casual sick
//!
//! | Leave Type | Days |
//! | --- | --- |
//! | Casual | 12 |
//! | Sick | 10 |
//!
//! [END TABLE]
//! ```

use crate::models::{Chunk, ChunkKind, Provenance, RawTable};

pub const TABLE_START: &str = "[TABLE DATA]";
pub const TABLE_END: &str = "[END TABLE]";

/// Columns sampled for the topic line.
const TOPIC_SAMPLE_COLUMNS: usize = 3;
/// Values sampled per column.
const TOPIC_SAMPLES_PER_COLUMN: usize = 3;
/// Total sample values in the topic line.
const TOPIC_MAX_SAMPLES: usize = 10;
/// Characters kept per sampled value.
const TOPIC_SAMPLE_MAX_CHARS: usize = 40;

/// Render an extracted table as an enriched Markdown block.
///
/// Returns `None` for tables without at least a header row and one data row.
pub fn render_table(raw: &RawTable) -> Option<String> {
    if raw.rows.len() < 2 {
        return None;
    }

    let width = raw.rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return None;
    }

    let grid: Vec<Vec<String>> = raw
        .rows
        .iter()
        .map(|row| {
            (0..width)
                .map(|i| row.get(i).and_then(|c| c.as_deref()).map(clean_cell).unwrap_or_default())
                .collect()
        })
        .collect();

    let topic = topic_line(&grid);

    let headers = normalize_headers(&grid[0]);
    let data = &grid[1..];

    let mut keep: Vec<usize> = (0..width).collect();
    if width > 1 && looks_like_sequential_index(data.iter().map(|r| r[0].as_str())) {
        keep.remove(0);
    }
    let non_empty: Vec<usize> = keep
        .iter()
        .copied()
        .filter(|&c| data.iter().any(|r| !r[c].is_empty()))
        .collect();
    if !non_empty.is_empty() {
        keep = non_empty;
    }

    let mut md = String::new();
    push_row(&mut md, keep.iter().map(|&c| headers[c].as_str()));
    push_row(&mut md, keep.iter().map(|_| "---"));
    for row in data {
        push_row(&mut md, keep.iter().map(|&c| row[c].as_str()));
    }
    let md = md.trim_end();

    Some(format!(
        "{} Topic: {}\n\n{}\n\n{}",
        TABLE_START, topic, md, TABLE_END
    ))
}

/// Build a table chunk, or `None` if the table is header-only noise.
pub fn table_chunk(
    source_document: &str,
    page: u32,
    raw: &RawTable,
    next_index: &mut u32,
) -> Option<Chunk> {
    let content = render_table(raw)?;
    let chunk = Chunk {
        content,
        provenance: Provenance::new(source_document, page),
        kind: ChunkKind::Table,
        sequence_index: *next_index,
    };
    *next_index += 1;
    Some(chunk)
}

/// Detect a rendered table from its structural markers alone.
pub fn is_table_content(text: &str) -> bool {
    text.contains(TABLE_START) || text.matches('|').count() > 3
}

fn clean_cell(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(raw.len());
    for (i, h) in raw.iter().enumerate() {
        let name = if h.is_empty() || h.eq_ignore_ascii_case("none") || seen.contains(h) {
            format!("Column {}", i + 1)
        } else {
            h.clone()
        };
        seen.push(name);
    }
    seen
}

fn looks_like_sequential_index<'a>(values: impl Iterator<Item = &'a str>) -> bool {
    let mut count = 0usize;
    for (expected, v) in values.enumerate() {
        match v.parse::<usize>() {
            Ok(n) if n == expected => count += 1,
            _ => return false,
        }
    }
    count > 0
}

fn topic_line(grid: &[Vec<String>]) -> String {
    let columns: Vec<String> = grid[0]
        .iter()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
        .collect();

    let width = grid[0].len();
    let mut samples: Vec<String> = Vec::new();
    for col in 0..width.min(TOPIC_SAMPLE_COLUMNS) {
        samples.extend(
            grid[1..]
                .iter()
                .map(|row| row[col].as_str())
                .filter(|v| !v.is_empty())
                .take(TOPIC_SAMPLES_PER_COLUMN)
                .map(|v| {
                    v.to_lowercase()
                        .chars()
                        .take(TOPIC_SAMPLE_MAX_CHARS)
                        .collect::<String>()
                }),
        );
    }
    samples.truncate(TOPIC_MAX_SAMPLES);

    let mut topic = columns.join(" ");
    if !samples.is_empty() {
        if !topic.is_empty() {
            topic.push(' ');
        }
        topic.push_str(&samples.join(" "));
    }
    topic
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&cell.replace('|', "\\|"));
        out.push_str(" |");
    }
    out.push('\n');
}
