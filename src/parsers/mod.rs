//! File parsers: extract textual units from PDF/DOCX/PPTX/audio/video (§4.1).
//!
//! Duck-typed parser selection keyed by file extension is replaced with a
//! tagged variant over parser kinds plus an extension→variant table (§9);
//! each variant implements the `Parser` capability.

pub mod audio;
pub mod docx;
mod media;
pub mod pdf;
pub mod pptx;
pub mod video;

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::traits::Transcriber;
use crate::types::Chunk;

/// `parse(path) -> list<Chunk>`. Implementations never propagate a parse
/// failure as process-fatal; they return a single error chunk instead
/// (§4.1, §7 ParseError).
#[async_trait]
pub trait Parser: Send + Sync {
    async fn parse(&self, path: &Path) -> Vec<Chunk>;
}

/// Parser kind, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Pdf,
    Docx,
    Pptx,
    Audio,
    Video,
}

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac", "opus"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm"];

/// Map a file extension to its parser kind, if one is registered.
pub fn kind_for_extension(path: &Path) -> Option<ParserKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(ParserKind::Pdf),
        "docx" => Some(ParserKind::Docx),
        "pptx" => Some(ParserKind::Pptx),
        e if AUDIO_EXTENSIONS.contains(&e) => Some(ParserKind::Audio),
        e if VIDEO_EXTENSIONS.contains(&e) => Some(ParserKind::Video),
        _ => None,
    }
}

/// Select and run the parser registered for `path`'s extension. A path with
/// no registered extension is treated as plain text and chunked from
/// `raw` directly, rather than rejected — every watched file gets indexed
/// (§4.6; mixed-content directories keep their non-document files).
pub async fn parse_file(
    path: &Path,
    raw: &[u8],
    transcriber: Option<Arc<dyn Transcriber>>,
) -> Vec<Chunk> {
    match kind_for_extension(path) {
        Some(ParserKind::Pdf) => pdf::PdfParser.parse(path).await,
        Some(ParserKind::Docx) => docx::DocxParser.parse(path).await,
        Some(ParserKind::Pptx) => pptx::PptxParser.parse(path).await,
        Some(ParserKind::Audio) => audio::AudioParser::new(transcriber).parse(path).await,
        Some(ParserKind::Video) => video::VideoParser::new(transcriber).parse(path).await,
        None => parse_plain_text(path, raw),
    }
}

/// Fallback for files with no registered parser: one chunk holding the
/// file's lossily-decoded text.
fn parse_plain_text(path: &Path, raw: &[u8]) -> Vec<Chunk> {
    vec![Chunk::new(
        String::from_utf8_lossy(raw).into_owned(),
        source_path(path),
    )]
}

/// Remove the longest word-level suffix/prefix overlap (up to `max_words`)
/// between two adjacent transcription windows, so the stitched transcript
/// doesn't repeat the overlapping audio twice (§4.1).
pub fn dedupe_word_overlap(prev: &str, next: &str, max_words: usize) -> String {
    let prev_words: Vec<&str> = prev.split_whitespace().collect();
    let next_words: Vec<&str> = next.split_whitespace().collect();

    let max_check = max_words.min(prev_words.len()).min(next_words.len());
    let mut overlap = 0;
    for n in (1..=max_check).rev() {
        if prev_words[prev_words.len() - n..] == next_words[..n] {
            overlap = n;
            break;
        }
    }
    next_words[overlap..].join(" ")
}

/// Build an absolute-path-qualified chunk source, used by every parser.
pub(crate) fn source_path(path: &Path) -> PathBuf {
    path.to_path_buf()
}
