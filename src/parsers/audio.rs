//! Audio parser: a metadata chunk plus an optional transcription chunk,
//! windowed for long files (§4.1).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::parsers::media;
use crate::parsers::Parser;
use crate::traits::TranscribeParams;
use crate::traits::Transcriber;
use crate::types::Chunk;

pub struct AudioParser {
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl AudioParser {
    pub fn new(transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        Self { transcriber }
    }
}

#[async_trait]
impl Parser for AudioParser {
    async fn parse(&self, path: &Path) -> Vec<Chunk> {
        let mut chunks = vec![metadata_chunk(path)];

        let Some(transcriber) = self.transcriber.clone() else {
            return chunks;
        };

        let owned_path = path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || media::decode_mono_16k(&owned_path)).await;

        let samples = match decoded {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                chunks.push(Chunk::error(path, e));
                return chunks;
            }
            Err(e) => {
                chunks.push(Chunk::error(path, format!("decode task panicked: {e}")));
                return chunks;
            }
        };

        let duration_secs = samples.len() as f64 / media::TARGET_SAMPLE_RATE as f64;
        let transcript = if duration_secs > media::WINDOWING_THRESHOLD_SECS {
            media::transcribe_windowed(&samples, transcriber.as_ref()).await
        } else {
            transcriber
                .transcribe(path, &TranscribeParams::default())
                .await
        };

        match transcript {
            Ok(text) if !text.trim().is_empty() => {
                chunks.push(Chunk::new(text, path).with_meta("type", "transcription"));
            }
            Ok(_) => {}
            Err(e) => chunks.push(Chunk::error(path, e)),
        }

        chunks
    }
}

fn metadata_chunk(path: &Path) -> Chunk {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Chunk::new(format!("Audio file: {filename}"), path).with_meta("type", "music")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_chunk_carries_music_type() {
        let chunk = metadata_chunk(Path::new("/music/song.mp3"));
        assert_eq!(
            chunk.metadata.get("type"),
            Some(&crate::types::MetaValue::Str("music".to_string()))
        );
        assert!(chunk.content.contains("song.mp3"));
    }

    #[tokio::test]
    async fn parse_without_transcriber_returns_only_metadata_chunk() {
        let parser = AudioParser::new(None);
        let chunks = parser.parse(Path::new("/nonexistent/a.mp3")).await;
        assert_eq!(chunks.len(), 1);
    }
}
