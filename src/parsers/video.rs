//! Video parser: demux audio to 16 kHz mono, transcribe as with audio (§4.1).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::parsers::media;
use crate::parsers::Parser;
use crate::traits::TranscribeParams;
use crate::traits::Transcriber;
use crate::types::Chunk;

pub struct VideoParser {
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl VideoParser {
    pub fn new(transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        Self { transcriber }
    }
}

#[async_trait]
impl Parser for VideoParser {
    async fn parse(&self, path: &Path) -> Vec<Chunk> {
        let Some(transcriber) = self.transcriber.clone() else {
            return vec![Chunk::new(
                format!(
                    "Video file: {}",
                    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
                ),
                path,
            )
            .with_meta("type", "music")];
        };

        let owned_path = path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || media::decode_mono_16k(&owned_path)).await;

        let samples = match decoded {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => return vec![Chunk::error(path, e)],
            Err(e) => return vec![Chunk::error(path, format!("demux task panicked: {e}"))],
        };

        let duration_secs = samples.len() as f64 / media::TARGET_SAMPLE_RATE as f64;
        let transcript = if duration_secs > media::WINDOWING_THRESHOLD_SECS {
            media::transcribe_windowed(&samples, transcriber.as_ref()).await
        } else {
            let tmp = match media::write_temp_wav(&samples) {
                Ok(p) => p,
                Err(e) => return vec![Chunk::error(path, e)],
            };
            let result = transcriber.transcribe(&tmp, &TranscribeParams::default()).await;
            let _ = std::fs::remove_file(&tmp);
            result
        };

        match transcript {
            Ok(text) if !text.trim().is_empty() => {
                vec![Chunk::new(text, path).with_meta("type", "transcription")]
            }
            Ok(_) => vec![Chunk::error(path, "transcription produced no text")],
            Err(e) => vec![Chunk::error(path, e)],
        }
    }
}
