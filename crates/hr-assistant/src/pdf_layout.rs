//! Positioned text for one PDF page, with column-aligned table detection.
//!
//! [`PageLayout`] is a `pdf-extract` output device that records every
//! glyph with its baseline position and advance. [`PageLayout::finish`]
//! groups glyphs into lines (top to bottom) and each line into cells, where
//! a cell boundary is a horizontal gap of at least [`CELL_GAP`] font sizes.
//!
//! A run of two or more consecutive lines with the same number of cells
//! (at least two), whose cells line up with the first line's columns, is
//! lifted out of the page text as a [`RawTable`]. Rows with a merged or
//! missing cell end the run.

use pdf_extract::{MediaBox, OutputDev, OutputError, Transform};

use hr_retrieval_core::models::RawTable;

/// Gap between glyphs that starts a new word, in font sizes.
const WORD_GAP: f64 = 0.1;

/// Gap between words that starts a new cell, in font sizes.
const CELL_GAP: f64 = 1.0;

/// Baseline difference that still counts as the same line, in font sizes.
const LINE_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone)]
struct Glyph {
    x: f64,
    y: f64,
    end: f64,
    size: f64,
    text: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Clone)]
struct Line {
    size: f64,
    cells: Vec<Cell>,
}

impl Line {
    fn text(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Same column count, and every cell starts near or overlaps the
    /// matching column of `header`.
    fn aligned_with(&self, header: &Line) -> bool {
        let tolerance = header.size.max(self.size);
        self.cells.len() == header.cells.len()
            && self.cells.iter().zip(&header.cells).all(|(cell, col)| {
                (cell.start - col.start).abs() <= tolerance
                    || (cell.start < col.end && col.start < cell.end)
            })
    }
}

/// Glyph collector for a single page.
#[derive(Debug, Default)]
pub(crate) struct PageLayout {
    glyphs: Vec<Glyph>,
}

/// Text of a page with its tables removed, plus the tables.
#[derive(Debug, Default)]
pub(crate) struct LaidOutPage {
    pub text: String,
    pub tables: Vec<RawTable>,
}

impl OutputDev for PageLayout {
    fn begin_page(
        &mut self,
        _page_num: u32,
        _media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> Result<(), OutputError> {
        self.glyphs.clear();
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        _spacing: f64,
        font_size: f64,
        char: &str,
    ) -> Result<(), OutputError> {
        let scale = (trm.m11 * trm.m22 - trm.m12 * trm.m21).abs().sqrt();
        let size = if scale > 0.0 { font_size * scale } else { font_size };
        let (x, y) = (trm.m31, trm.m32);
        self.glyphs.push(Glyph {
            x,
            y,
            end: x + width * size,
            size,
            text: char.to_string(),
        });
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

impl PageLayout {
    pub(crate) fn finish(self) -> LaidOutPage {
        let lines = group_lines(self.glyphs);
        let mut kept: Vec<String> = Vec::new();
        let mut tables = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            if lines[i].cells.len() >= 2 {
                let header = &lines[i];
                let mut j = i + 1;
                while j < lines.len() && lines[j].aligned_with(header) {
                    j += 1;
                }
                if j - i >= 2 {
                    tables.push(RawTable::from_strings(
                        lines[i..j]
                            .iter()
                            .map(|l| l.cells.iter().map(|c| c.text.clone()).collect::<Vec<_>>()),
                    ));
                    i = j;
                    continue;
                }
            }
            kept.push(lines[i].text());
            i += 1;
        }

        LaidOutPage {
            text: kept.join("\n"),
            tables,
        }
    }
}

/// Sort glyphs top to bottom, then left to right, and split them into
/// lines of cells. Whitespace glyphs only widen gaps.
fn group_lines(mut glyphs: Vec<Glyph>) -> Vec<Line> {
    glyphs.retain(|g| !g.text.chars().all(char::is_whitespace));
    glyphs.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut rows: Vec<Vec<Glyph>> = Vec::new();
    for glyph in glyphs {
        match rows.last_mut() {
            Some(row) if (row[0].y - glyph.y).abs() <= row[0].size * LINE_TOLERANCE => {
                row.push(glyph)
            }
            _ => rows.push(vec![glyph]),
        }
    }

    rows.into_iter()
        .map(|mut row| {
            row.sort_by(|a, b| a.x.total_cmp(&b.x));
            split_cells(&row)
        })
        .collect()
}

fn split_cells(row: &[Glyph]) -> Line {
    let size = row.iter().map(|g| g.size).fold(0.0, f64::max);
    let mut cells: Vec<Cell> = Vec::new();
    let mut last_end: Option<f64> = None;

    for glyph in row {
        let gap = last_end.map(|end| glyph.x - end);
        match (cells.last_mut(), gap) {
            (Some(cell), Some(gap)) if gap < glyph.size * CELL_GAP => {
                if gap > glyph.size * WORD_GAP {
                    cell.text.push(' ');
                }
                cell.text.push_str(&glyph.text);
                cell.end = cell.end.max(glyph.end);
            }
            _ => cells.push(Cell {
                start: glyph.x,
                end: glyph.end,
                text: glyph.text.clone(),
            }),
        }
        last_end = Some(last_end.map_or(glyph.end, |end: f64| end.max(glyph.end)));
    }

    Line { size, cells }
}
