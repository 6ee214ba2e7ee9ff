//! DOCX parser: one chunk per non-empty paragraph (§4.1).
//!
//! DOCX is a zip archive containing `word/document.xml`; paragraphs are
//! `<w:p>` elements whose text runs (`<w:t>`) are concatenated.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::parsers::Parser;
use crate::types::Chunk;

pub struct DocxParser;

#[async_trait]
impl Parser for DocxParser {
    async fn parse(&self, path: &Path) -> Vec<Chunk> {
        let owned_path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || extract_paragraphs(&owned_path)).await;

        match result {
            Ok(Ok(paragraphs)) => {
                let chunks: Vec<Chunk> = paragraphs
                    .into_iter()
                    .enumerate()
                    .filter(|(_, text)| !text.trim().is_empty())
                    .map(|(i, text)| {
                        Chunk::new(text, path)
                            .with_meta("index", i as i64)
                            .with_meta("type", "paragraph")
                    })
                    .collect();
                if chunks.is_empty() {
                    vec![Chunk::error(path, "docx contained no non-empty paragraphs")]
                } else {
                    chunks
                }
            }
            Ok(Err(e)) => vec![Chunk::error(path, e)],
            Err(e) => vec![Chunk::error(
                path,
                format!("docx extraction task panicked: {e}"),
            )],
        }
    }
}

fn extract_paragraphs(path: &std::path::Path) -> Result<Vec<String>, String> {
    let file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| e.to_string())?
        .read_to_string(&mut document_xml)
        .map_err(|e| e.to_string())?;

    parse_paragraphs_from_xml(&document_xml)
}

fn parse_paragraphs_from_xml(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) if tag.local_name().as_ref() == b"p" => {
                current.clear();
            }
            Ok(Event::End(tag)) if tag.local_name().as_ref() == b"p" => {
                paragraphs.push(std::mem::take(&mut current));
            }
            Ok(Event::Start(tag)) if tag.local_name().as_ref() == b"t" => {
                in_text_run = true;
            }
            Ok(Event::End(tag)) if tag.local_name().as_ref() == b"t" => {
                in_text_run = false;
            }
            Ok(Event::Text(text)) if in_text_run => {
                current.push_str(&text.unescape().map_err(|e| e.to_string())?);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
        buf.clear();
    }

    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_paragraph() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Hello world</w:t></w:r></w:p></w:body></w:document>"#;
        let paragraphs = parse_paragraphs_from_xml(xml).unwrap();
        assert_eq!(paragraphs, vec!["Hello world".to_string()]);
    }

    #[test]
    fn concatenates_multiple_runs_in_one_paragraph() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p></w:body></w:document>"#;
        let paragraphs = parse_paragraphs_from_xml(xml).unwrap();
        assert_eq!(paragraphs, vec!["Hello world".to_string()]);
    }

    #[test]
    fn separate_paragraphs_stay_separate() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>First</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let paragraphs = parse_paragraphs_from_xml(xml).unwrap();
        assert_eq!(paragraphs, vec!["First".to_string(), "Second".to_string()]);
    }

    #[tokio::test]
    async fn missing_file_yields_error_chunk() {
        let parser = DocxParser;
        let chunks = parser.parse(Path::new("/nonexistent/a.docx")).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].metadata.get("type"),
            Some(&crate::types::MetaValue::Str("error".to_string()))
        );
    }
}
