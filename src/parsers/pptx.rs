//! PPTX parser: one chunk per slide, concatenating its shape texts (§4.1).
//!
//! PPTX is a zip archive with one `ppt/slides/slideN.xml` per slide; shape
//! text runs (`<a:t>`) are concatenated in document order.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::parsers::Parser;
use crate::types::Chunk;

pub struct PptxParser;

#[async_trait]
impl Parser for PptxParser {
    async fn parse(&self, path: &Path) -> Vec<Chunk> {
        let owned_path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || extract_slides(&owned_path)).await;

        match result {
            Ok(Ok(slides)) => {
                let chunks: Vec<Chunk> = slides
                    .into_iter()
                    .filter(|(_, text)| !text.trim().is_empty())
                    .map(|(slide_no, text)| {
                        Chunk::new(text, path)
                            .with_meta("slide", slide_no as i64)
                            .with_meta("type", "paragraph")
                    })
                    .collect();
                if chunks.is_empty() {
                    vec![Chunk::error(path, "pptx contained no non-empty slides")]
                } else {
                    chunks
                }
            }
            Ok(Err(e)) => vec![Chunk::error(path, e)],
            Err(e) => vec![Chunk::error(
                path,
                format!("pptx extraction task panicked: {e}"),
            )],
        }
    }
}

/// Slide numbers are 1-based, in natural filename order
/// (`slide1.xml`, `slide2.xml`, ...).
fn extract_slides(path: &std::path::Path) -> Result<Vec<(usize, String)>, String> {
    let file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;

    let mut slide_names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter(|name| {
            name.starts_with("ppt/slides/slide") && name.ends_with(".xml")
        })
        .collect();
    slide_names.sort_by_key(|name| slide_number(name).unwrap_or(usize::MAX));

    let mut slides = Vec::with_capacity(slide_names.len());
    for (position, name) in slide_names.iter().enumerate() {
        let mut xml = String::new();
        archive
            .by_name(name)
            .map_err(|e| e.to_string())?
            .read_to_string(&mut xml)
            .map_err(|e| e.to_string())?;
        let text = extract_shape_text(&xml)?;
        slides.push((position + 1, text));
    }
    Ok(slides)
}

fn slide_number(name: &str) -> Option<usize> {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .ok()
}

fn extract_shape_text(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut parts = Vec::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) if tag.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(tag)) if tag.local_name().as_ref() == b"t" => in_text = false,
            Ok(Event::Text(text)) if in_text => {
                parts.push(text.unescape().map_err(|e| e.to_string())?.into_owned());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
        buf.clear();
    }

    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_shape_texts_on_a_slide() {
        let xml = r#"<p:sld><p:cSld><p:spTree>
            <p:sp><p:txBody><a:p><a:r><a:t>Title</a:t></a:r></a:p></p:txBody></p:sp>
            <p:sp><p:txBody><a:p><a:r><a:t>Body text</a:t></a:r></a:p></p:txBody></p:sp>
        </p:spTree></p:cSld></p:sld>"#;
        let text = extract_shape_text(xml).unwrap();
        assert_eq!(text, "Title Body text");
    }

    #[test]
    fn slide_number_parses_trailing_digits() {
        assert_eq!(slide_number("ppt/slides/slide3.xml"), Some(3));
        assert_eq!(slide_number("ppt/slides/slide12.xml"), Some(12));
    }

    #[tokio::test]
    async fn missing_file_yields_error_chunk() {
        let parser = PptxParser;
        let chunks = parser.parse(Path::new("/nonexistent/a.pptx")).await;
        assert_eq!(chunks.len(), 1);
    }
}
