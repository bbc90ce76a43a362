//! Per-format page and table extraction for policy documents.
//!
//! | Format | Pages | Tables |
//! |--------|-------|--------|
//! | PDF | one per PDF page (`pdf-extract`) | column-aligned text, pipe tables |
//! | DOCX | split at explicit page breaks | `w:tbl` elements |
//! | Markdown / text | split at form feed (`\x0c`) | GitHub pipe tables |
//!
//! Extraction never panics: `pdf-extract` is run under `catch_unwind`
//! and every format error is returned so the ingestor can skip the file.
//! PDF pages are laid out one at a time; a page that fails is logged and
//! comes back with empty text while the rest of the document is kept.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::Event;
use tracing::warn;

use crate::pdf_layout::{LaidOutPage, PageLayout};

use hr_retrieval_core::models::{ExtractedDocument, ExtractedPage, RawTable};

/// Maximum decompressed bytes to read from `word/document.xml`.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const FORM_FEED: char = '\x0c';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Markdown,
    Text,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Extract the pages of one document from its raw bytes.
pub fn extract_document(name: &str, bytes: &[u8]) -> Result<ExtractedDocument> {
    let format = DocumentFormat::from_path(Path::new(name))
        .ok_or_else(|| anyhow!("unsupported document type: {}", name))?;
    let pages = match format {
        DocumentFormat::Pdf => extract_pdf(bytes).context("PDF extraction failed")?,
        DocumentFormat::Docx => extract_docx(bytes).context("DOCX extraction failed")?,
        DocumentFormat::Markdown | DocumentFormat::Text => {
            extract_plain(&String::from_utf8_lossy(bytes))
        }
    };
    Ok(ExtractedDocument {
        name: name.to_string(),
        pages,
    })
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
    let mut doc = catch_unwind(|| pdf_extract::Document::load_mem(bytes))
        .map_err(|_| anyhow!("PDF parser panicked"))?
        .map_err(|e| anyhow!("{}", e))?;
    if doc.is_encrypted() {
        doc.decrypt("").map_err(|e| anyhow!("encrypted PDF: {}", e))?;
    }

    let numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    if numbers.is_empty() {
        bail!("PDF has no pages");
    }

    Ok(numbers
        .into_iter()
        .map(|number| {
            let laid_out = layout_pdf_page(&doc, number).unwrap_or_else(|e| {
                warn!(page = number, error = %e, "unreadable PDF page indexed as empty");
                LaidOutPage::default()
            });
            let (text, pipe_tables) = lift_pipe_tables(&laid_out.text);
            let mut tables = laid_out.tables;
            tables.extend(pipe_tables);
            ExtractedPage {
                number,
                text,
                tables,
            }
        })
        .collect())
}

fn layout_pdf_page(doc: &pdf_extract::Document, number: u32) -> Result<LaidOutPage> {
    let mut layout = PageLayout::default();
    catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::output_doc_page(doc, &mut layout, number)
    }))
    .map_err(|_| anyhow!("PDF parser panicked"))?
    .map_err(|e| anyhow!("{}", e))?;
    Ok(layout.finish())
}

// ============ DOCX ============

fn extract_docx(bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| anyhow!("word/document.xml not found"))?;
    let mut xml = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut xml)?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        bail!("word/document.xml exceeds size limit");
    }
    parse_document_xml(&xml)
}

#[derive(Default)]
struct DocxWalker {
    pages: Vec<ExtractedPage>,
    page_text: String,
    page_tables: Vec<RawTable>,
    paragraph: String,
    table_depth: usize,
    rows: Vec<Vec<Option<String>>>,
    row: Vec<Option<String>>,
    cell: Vec<String>,
    in_text: bool,
}

impl DocxWalker {
    fn break_page(&mut self) {
        self.finish_paragraph();
        let number = self.pages.len() as u32 + 1;
        self.pages.push(ExtractedPage {
            number,
            text: std::mem::take(&mut self.page_text).trim_end().to_string(),
            tables: std::mem::take(&mut self.page_tables),
        });
    }

    fn finish_paragraph(&mut self) {
        let para = std::mem::take(&mut self.paragraph);
        let para = para.trim();
        if para.is_empty() {
            return;
        }
        if self.table_depth > 0 {
            self.cell.push(para.to_string());
        } else {
            self.page_text.push_str(para);
            self.page_text.push_str("\n\n");
        }
    }
}

fn parse_document_xml(xml: &[u8]) -> Result<Vec<ExtractedPage>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut w = DocxWalker::default();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => w.in_text = true,
                b"tbl" => {
                    w.finish_paragraph();
                    w.table_depth += 1;
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => w.paragraph.push(' '),
                b"br" => {
                    let page_break = e.attributes().flatten().any(|a| {
                        a.key.local_name().as_ref() == b"type" && a.value.as_ref() == b"page"
                    });
                    if page_break && w.table_depth == 0 {
                        w.break_page();
                    } else {
                        w.paragraph.push('\n');
                    }
                }
                _ => {}
            },
            Event::Text(t) if w.in_text => {
                w.paragraph.push_str(&t.unescape()?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => w.in_text = false,
                b"p" => w.finish_paragraph(),
                b"tc" if w.table_depth == 1 => {
                    w.finish_paragraph();
                    let text = std::mem::take(&mut w.cell).join(" ");
                    w.row.push(Some(text));
                }
                b"tr" if w.table_depth == 1 => {
                    let row = std::mem::take(&mut w.row);
                    w.rows.push(row);
                }
                b"tbl" => {
                    w.table_depth = w.table_depth.saturating_sub(1);
                    if w.table_depth == 0 {
                        let rows = std::mem::take(&mut w.rows);
                        w.page_tables.push(RawTable::new(rows));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    w.break_page();
    Ok(w.pages)
}

// ============ Markdown / text ============

fn extract_plain(content: &str) -> Vec<ExtractedPage> {
    content
        .split(FORM_FEED)
        .enumerate()
        .map(|(i, page)| {
            let (text, tables) = lift_pipe_tables(page);
            ExtractedPage {
                number: i as u32 + 1,
                text,
                tables,
            }
        })
        .collect()
}

fn is_pipe_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.len() > 1
}

fn split_pipe_row(line: &str) -> Vec<String> {
    let t = line.trim();
    let t = t.strip_prefix('|').unwrap_or(t);
    let t = t.strip_suffix('|').unwrap_or(t);
    t.split('|').map(|c| c.trim().to_string()).collect()
}

fn is_separator_row(line: &str) -> bool {
    let cells = split_pipe_row(line);
    !cells.is_empty()
        && cells.iter().all(|c| {
            !c.is_empty() && c.contains('-') && c.chars().all(|ch| matches!(ch, '-' | ':' | ' '))
        })
}

/// Remove GitHub-style pipe tables from `page`, returning the remaining
/// text and the tables found.
///
/// A block counts as a table only when its second line is a `|---|`
/// separator; other pipe-prefixed lines stay in the text.
fn lift_pipe_tables(page: &str) -> (String, Vec<RawTable>) {
    let lines: Vec<&str> = page.lines().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut tables = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let starts_table =
            is_pipe_row(lines[i]) && i + 1 < lines.len() && is_separator_row(lines[i + 1]);
        if !starts_table {
            kept.push(lines[i]);
            i += 1;
            continue;
        }

        let mut rows = vec![split_pipe_row(lines[i])];
        i += 2;
        while i < lines.len() && is_pipe_row(lines[i]) {
            rows.push(split_pipe_row(lines[i]));
            i += 1;
        }
        tables.push(RawTable::from_strings(rows));
    }

    (kept.join("\n"), tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("a/Leave.PDF")), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_path(Path::new("x.docx")), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_path(Path::new("x.md")), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::from_path(Path::new("x.xlsx")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_unsupported_type_is_error() {
        assert!(extract_document("sheet.xlsx", b"data").is_err());
    }

    #[test]
    fn test_invalid_pdf_is_error() {
        assert!(extract_document("bad.pdf", b"not a pdf").is_err());
    }

    /// Minimal Helvetica PDF, one content stream per page. Pages flagged
    /// `false` have no MediaBox anywhere in their tree.
    fn pdf_bytes(pages: &[(&str, bool)]) -> Vec<u8> {
        let n = pages.len();
        let font = 3 + 2 * n;
        let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), n),
        ];
        for (i, (content, media_box)) in pages.iter().enumerate() {
            let mb = if *media_box { "/MediaBox [0 0 612 792] " } else { "" };
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R {}/Contents {} 0 R /Resources << /Font << /F1 {} 0 R >> >> >>",
                mb,
                4 + 2 * i,
                font
            ));
            objects.push(format!(
                "<< /Length {} >> stream\n{}\nendstream",
                content.len(),
                content
            ));
        }
        objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
        }
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", offsets.len() + 1).as_bytes());
        for offset in &offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                offsets.len() + 1,
                xref
            )
            .as_bytes(),
        );
        out
    }

    fn text_at(x: u32, y: u32, text: &str) -> String {
        format!("BT /F1 12 Tf {} {} Td ({}) Tj ET", x, y, text)
    }

    #[test]
    fn test_pdf_pages_and_layout_table() {
        let first = [
            text_at(72, 720, "Leave entitlements by type."),
            text_at(72, 690, "Leave Type"),
            text_at(300, 690, "Days"),
            text_at(72, 672, "Casual"),
            text_at(300, 672, "12"),
            text_at(72, 654, "Sick"),
            text_at(300, 654, "10"),
        ]
        .join(" ");
        let second = text_at(72, 720, "Apply through the portal.");
        let doc = extract_document("leave.pdf", &pdf_bytes(&[(&first, true), (&second, true)])).unwrap();

        assert_eq!(doc.pages.len(), 2);
        let page = &doc.pages[0];
        assert_eq!(page.text, "Leave entitlements by type.");
        assert_eq!(
            page.tables,
            vec![RawTable::from_strings(vec![
                vec!["Leave Type", "Days"],
                vec!["Casual", "12"],
                vec!["Sick", "10"],
            ])]
        );
        assert_eq!(doc.pages[1].number, 2);
        assert_eq!(doc.pages[1].text, "Apply through the portal.");
    }

    #[test]
    fn test_broken_pdf_page_is_empty_not_fatal() {
        let good = text_at(72, 720, "Sick leave needs a certificate.");
        let broken = text_at(72, 720, "never read");
        let last = text_at(72, 720, "Casual leave is twelve days.");
        let bytes = pdf_bytes(&[(&good, true), (&broken, false), (&last, true)]);

        let doc = extract_document("mixed.pdf", &bytes).unwrap();
        assert_eq!(doc.pages.len(), 3);
        assert_eq!(doc.pages[0].text, "Sick leave needs a certificate.");
        assert_eq!(doc.pages[1].number, 2);
        assert!(doc.pages[1].text.is_empty());
        assert!(doc.pages[1].tables.is_empty());
        assert_eq!(doc.pages[2].text, "Casual leave is twelve days.");
    }

    #[test]
    fn test_invalid_docx_is_error() {
        assert!(extract_document("bad.docx", b"not a zip").is_err());
    }

    #[test]
    fn test_markdown_tables_lifted() {
        let md = "# Leave\n\nEmployees get leave.\n\n| Leave Type | Days |\n|---|:---:|\n| Casual | 12 |\n| Sick | 10 |\n\nApply in advance.";
        let doc = extract_document("leave.md", md.as_bytes()).unwrap();
        assert_eq!(doc.pages.len(), 1);
        let page = &doc.pages[0];
        assert_eq!(page.number, 1);
        assert!(page.text.contains("Employees get leave."));
        assert!(page.text.contains("Apply in advance."));
        assert!(!page.text.contains("Casual"));
        assert_eq!(page.tables.len(), 1);
        assert_eq!(
            page.tables[0],
            RawTable::from_strings(vec![
                vec!["Leave Type", "Days"],
                vec!["Casual", "12"],
                vec!["Sick", "10"],
            ])
        );
    }

    #[test]
    fn test_pipe_lines_without_separator_stay_text() {
        let (text, tables) = lift_pipe_tables("| not | a table |\nplain");
        assert!(tables.is_empty());
        assert_eq!(text, "| not | a table |\nplain");
    }

    #[test]
    fn test_form_feed_splits_pages() {
        let doc = extract_document("p.txt", b"page one\x0cpage two").unwrap();
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[1].number, 2);
        assert_eq!(doc.pages[1].text, "page two");
    }

    fn docx_bytes(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn cell(text: &str) -> String {
        format!("<w:tc><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:tc>", text)
    }

    #[test]
    fn test_docx_paragraphs_tables_and_page_breaks() {
        let body = format!(
            "<w:p><w:r><w:t xml:space=\"preserve\">Employees get </w:t></w:r><w:r><w:t>12 days &amp; more.</w:t></w:r></w:p>\
             <w:tbl><w:tr>{}{}</w:tr><w:tr>{}{}</w:tr></w:tbl>\
             <w:p><w:r><w:br w:type=\"page\"/></w:r></w:p>\
             <w:p><w:r><w:t>Second page.</w:t></w:r></w:p>",
            cell("Leave Type"),
            cell("Days"),
            cell("Casual"),
            cell("12")
        );
        let doc = extract_document("policy.docx", &docx_bytes(&body)).unwrap();
        assert_eq!(doc.pages.len(), 2);

        let first = &doc.pages[0];
        assert_eq!(first.text, "Employees get 12 days & more.");
        assert_eq!(first.tables.len(), 1);
        assert_eq!(
            first.tables[0],
            RawTable::from_strings(vec![vec!["Leave Type", "Days"], vec!["Casual", "12"]])
        );

        assert_eq!(doc.pages[1].number, 2);
        assert_eq!(doc.pages[1].text, "Second page.");
        assert!(doc.pages[1].tables.is_empty());
    }

    #[test]
    fn test_docx_missing_document_xml() {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<x/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let err = extract_document("empty.docx", &bytes).unwrap_err();
        assert!(format!("{:#}", err).contains("word/document.xml"));
    }
}
