//! WordprocessingML (`.docx`) reader.
//!
//! Walks `word/document.xml` body children in document order and yields
//! paragraphs (with style id) and tables. Math blocks inside a paragraph are
//! translated by [`crate::omml`] and spliced into the text at the position
//! they occupy, as `$ latex $`.

use std::io::Read;

use crate::error::ParseError;
use crate::omml;
use crate::xml::{self, Ns, XmlElement};

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCUMENT_ENTRY: &str = "word/document.xml";

/// A body-level block in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph { text: String, style: String },
    Table { rows: Vec<Vec<String>> },
}

/// Parse a `.docx` archive held in memory.
pub fn parse_docx(bytes: &[u8]) -> Result<Vec<Block>, ParseError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ParseError::Docx(e.to_string()))?;
    let doc_xml = read_zip_entry_bounded(&mut archive, DOCUMENT_ENTRY, MAX_XML_ENTRY_BYTES)?;
    parse_document_xml(&doc_xml)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ParseError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ParseError::Docx(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ParseError::Docx(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ParseError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Parse the main document part.
pub fn parse_document_xml(xml_bytes: &[u8]) -> Result<Vec<Block>, ParseError> {
    let root = xml::parse(xml_bytes).map_err(ParseError::Docx)?;
    if !root.is(Ns::Word, "document") {
        return Err(ParseError::Docx(format!(
            "unexpected root element <{}>",
            root.name
        )));
    }
    let body = root
        .child(Ns::Word, "body")
        .ok_or_else(|| ParseError::Docx("document has no body".to_string()))?;

    let mut blocks = Vec::new();
    collect_blocks(body, &mut blocks);
    Ok(blocks)
}

fn collect_blocks(container: &XmlElement, out: &mut Vec<Block>) {
    for el in container.elements() {
        if el.ns != Ns::Word {
            continue;
        }
        match el.name.as_str() {
            "p" => {
                let text = paragraph_text(el);
                if !text.is_empty() {
                    out.push(Block::Paragraph {
                        text,
                        style: paragraph_style(el),
                    });
                }
            }
            "tbl" => out.push(Block::Table {
                rows: table_rows(el),
            }),
            "sdt" => {
                if let Some(content) = el.child(Ns::Word, "sdtContent") {
                    collect_blocks(content, out);
                }
            }
            _ => {}
        }
    }
}

fn paragraph_style(p: &XmlElement) -> String {
    p.child(Ns::Word, "pPr")
        .and_then(|ppr| ppr.child(Ns::Word, "pStyle"))
        .and_then(|s| s.attr("val"))
        .unwrap_or_default()
        .to_string()
}

/// Linear text of a paragraph. Math blocks are inlined as `$ … $`, and when
/// any are present whitespace is collapsed so math and text stay separated
/// by single spaces.
pub fn paragraph_text(p: &XmlElement) -> String {
    let mut out = String::new();
    let mut has_math = false;
    inline_text(p, &mut out, &mut has_math);
    if has_math {
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        out.trim().to_string()
    }
}

fn inline_text(el: &XmlElement, out: &mut String, has_math: &mut bool) {
    for child in el.elements() {
        match child.ns {
            Ns::Math if child.name == "oMath" || child.name == "oMathPara" => {
                *has_math = true;
                out.push(' ');
                out.push_str(&omml::math_to_inline(child));
                out.push(' ');
            }
            Ns::Word => match child.name.as_str() {
                "pPr" | "rPr" | "del" | "moveFrom" | "instrText" => {}
                "t" => out.push_str(&child.text()),
                "tab" => out.push('\t'),
                "br" | "cr" => out.push('\n'),
                _ => inline_text(child, out, has_math),
            },
            _ => {}
        }
    }
}

fn table_rows(tbl: &XmlElement) -> Vec<Vec<String>> {
    tbl.elements()
        .filter(|e| e.is(Ns::Word, "tr"))
        .map(|tr| {
            tr.elements()
                .filter(|e| e.is(Ns::Word, "tc"))
                .map(cell_text)
                .collect()
        })
        .collect()
}

fn cell_text(tc: &XmlElement) -> String {
    let paragraphs: Vec<String> = tc
        .elements()
        .filter(|e| e.is(Ns::Word, "p"))
        .map(paragraph_text)
        .collect();
    paragraphs.join("\n").trim().to_string()
}
