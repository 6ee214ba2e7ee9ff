//! Shared decode/resample/windowing helpers for the audio and video
//! parsers — both ultimately transcribe a 16 kHz mono PCM stream (§4.1).

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::parsers::dedupe_word_overlap;
use crate::traits::TranscribeParams;
use crate::traits::Transcriber;

pub const WINDOW_SECS: f64 = 30.0;
pub const OVERLAP_SECS: f64 = 5.0;
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const MAX_OVERLAP_WORDS: usize = 20;
pub const WINDOWING_THRESHOLD_SECS: f64 = WINDOW_SECS;

/// Decode the first audio track of `path` to mono f32 samples at
/// `TARGET_SAMPLE_RATE`, resampling if the source rate differs. Works for
/// both audio-only containers and the audio track of a video container.
pub fn decode_mono_16k(path: &std::path::Path) -> Result<Vec<f32>, String> {
    let file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| e.to_string())?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| "no decodable audio track".to_string())?
        .clone();

    let source_rate = track.codec_params.sample_rate.unwrap_or(TARGET_SAMPLE_RATE);
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| e.to_string())?;

    let mut mono_samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(_)) => break,
            Err(e) => return Err(e.to_string()),
        };
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.to_string()),
        };
        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        for frame in buf.samples().chunks(channels.max(1)) {
            let sum: f32 = frame.iter().sum();
            mono_samples.push(sum / frame.len().max(1) as f32);
        }
    }

    if source_rate == TARGET_SAMPLE_RATE {
        Ok(mono_samples)
    } else {
        resample(&mono_samples, source_rate, TARGET_SAMPLE_RATE)
    }
}

pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, String> {
    use rubato::Resampler;

    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = rubato::SincFixedIn::<f32>::new(
        ratio,
        2.0,
        rubato::SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: rubato::SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: rubato::WindowFunction::BlackmanHarris2,
        },
        samples.len(),
        1,
    )
    .map_err(|e| e.to_string())?;

    let output = resampler
        .process(&[samples.to_vec()], None)
        .map_err(|e| e.to_string())?;
    Ok(output.into_iter().next().unwrap_or_default())
}

pub fn write_temp_wav(samples: &[f32]) -> crate::error::Result<std::path::PathBuf> {
    let tmp_path = std::env::temp_dir().join(format!("ataraxai-window-{}.wav", uuid::Uuid::new_v4()));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&tmp_path, spec)
        .map_err(|e| crate::error::RetrievalErr::parse_error(&tmp_path, e))?;
    for &sample in samples {
        let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(clamped)
            .map_err(|e| crate::error::RetrievalErr::parse_error(&tmp_path, e))?;
    }
    writer
        .finalize()
        .map_err(|e| crate::error::RetrievalErr::parse_error(&tmp_path, e))?;
    Ok(tmp_path)
}

/// Transcribe `samples` (already mono 16 kHz) by splitting it into
/// overlapping windows, transcribing each independently, and stitching
/// the results with word-overlap removal (§4.1).
pub async fn transcribe_windowed(
    samples: &[f32],
    transcriber: &dyn Transcriber,
) -> crate::error::Result<String> {
    let window_len = (WINDOW_SECS * TARGET_SAMPLE_RATE as f64) as usize;
    let step_len = ((WINDOW_SECS - OVERLAP_SECS) * TARGET_SAMPLE_RATE as f64) as usize;

    let mut transcript = String::new();
    let mut start = 0usize;
    while start < samples.len() {
        let end = (start + window_len).min(samples.len());
        let window_path = write_temp_wav(&samples[start..end])?;

        let params = TranscribeParams::default();
        let window_text = transcriber.transcribe(&window_path, &params).await?;
        let _ = std::fs::remove_file(&window_path);

        if transcript.is_empty() {
            transcript.push_str(window_text.trim());
        } else {
            let deduped = dedupe_word_overlap(&transcript, &window_text, MAX_OVERLAP_WORDS);
            if !deduped.is_empty() {
                transcript.push(' ');
                transcript.push_str(&deduped);
            }
        }

        if end == samples.len() {
            break;
        }
        start += step_len;
    }

    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_of_empty_input_is_empty() {
        assert!(resample(&[], 44_100, TARGET_SAMPLE_RATE).unwrap().is_empty());
    }

    #[test]
    fn resample_identity_rate_still_runs() {
        let samples = vec![0.0f32; 1000];
        let result = resample(&samples, TARGET_SAMPLE_RATE, TARGET_SAMPLE_RATE);
        assert!(result.is_ok());
    }
}
