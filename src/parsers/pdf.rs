//! PDF parser: one chunk per non-empty page (§4.1).

use std::path::Path;

use async_trait::async_trait;

use crate::parsers::Parser;
use crate::types::Chunk;

pub struct PdfParser;

#[async_trait]
impl Parser for PdfParser {
    async fn parse(&self, path: &Path) -> Vec<Chunk> {
        let owned_path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || extract_pages(&owned_path)).await;

        match result {
            Ok(Ok(pages)) if !pages.is_empty() => {
                let chunks: Vec<Chunk> = pages
                    .into_iter()
                    .enumerate()
                    .filter(|(_, text)| !text.trim().is_empty())
                    .map(|(i, text)| {
                        Chunk::new(text, path)
                            .with_meta("page", (i as i64) + 1)
                            .with_meta("type", "paragraph")
                    })
                    .collect();
                if chunks.is_empty() {
                    vec![Chunk::error(path, "pdf contained no non-empty pages")]
                } else {
                    chunks
                }
            }
            Ok(Ok(_)) => vec![Chunk::error(path, "pdf contained no extractable pages")],
            Ok(Err(e)) => vec![Chunk::error(path, e)],
            Err(e) => vec![Chunk::error(
                path,
                format!("pdf extraction task panicked: {e}"),
            )],
        }
    }
}

fn extract_pages(path: &std::path::Path) -> Result<Vec<String>, String> {
    let text = pdf_extract::extract_text(path).map_err(|e| e.to_string())?;
    // pdf-extract joins pages with form-feed characters.
    Ok(text.split('\u{c}').map(|page| page.to_string()).collect())
}
