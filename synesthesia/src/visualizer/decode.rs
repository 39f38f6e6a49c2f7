//! Decoding audio binaries into mono samples.
//!
//! [`SymphoniaDecoder`] is the default and covers MP3, FLAC, AAC/M4A, Ogg
//! Vorbis, WebM/Matroska and WAV. RIFF/WAVE input is read with [`WavDecoder`].

use hound::{SampleFormat, WavReader};
use std::io::{Cursor, ErrorKind};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::errors::DecodeError;

/// Decoded mono PCM in `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Samples per second.
    pub sample_rate: u32,
    /// Interleaved channels averaged down to one.
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    /// Creates decoded audio from mono samples.
    #[must_use]
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    /// Playback length in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Turns an audio binary into samples for analysis and playback.
#[cfg_attr(test, mockall::automock)]
pub trait AudioDecoder: Send + Sync {
    /// Decodes `bytes` declared as `mime_type`.
    fn decode(&self, bytes: &[u8], mime_type: &str) -> Result<DecodedAudio, DecodeError>;
}

/// RIFF/WAVE decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl WavDecoder {
    /// Media types this decoder accepts.
    pub const MIME_TYPES: [&'static str; 4] =
        ["audio/wav", "audio/x-wav", "audio/wave", "audio/vnd.wave"];

    /// Returns true if `mime_type` is a WAVE type.
    #[must_use]
    pub fn supports(mime_type: &str) -> bool {
        let wanted = essence(mime_type);
        Self::MIME_TYPES
            .iter()
            .any(|m| m.eq_ignore_ascii_case(wanted))
    }
}

/// Media type without parameters.
fn essence(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or_default().trim()
}

impl AudioDecoder for WavDecoder {
    fn decode(&self, bytes: &[u8], mime_type: &str) -> Result<DecodedAudio, DecodeError> {
        if !Self::supports(mime_type) {
            return Err(DecodeError::Unsupported {
                mime_type: mime_type.to_string(),
            });
        }
        let reader =
            WavReader::new(Cursor::new(bytes)).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| DecodeError::Malformed(e.to_string()))?,
            SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| DecodeError::Malformed(e.to_string()))?
            }
        };
        if interleaved.is_empty() {
            return Err(DecodeError::Empty);
        }

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        Ok(DecodedAudio::new(spec.sample_rate, samples))
    }
}

/// Container/codec decoder backed by symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    /// File extension used as a format detection hint for `mime_type`.
    #[must_use]
    pub fn extension_hint(mime_type: &str) -> Option<&'static str> {
        let ext = match essence(mime_type).to_ascii_lowercase().as_str() {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/flac" | "audio/x-flac" => "flac",
            "audio/ogg" | "audio/vorbis" => "ogg",
            "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
            "audio/aac" | "audio/aacp" => "aac",
            "audio/webm" => "webm",
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => "wav",
            _ => return None,
        };
        Some(ext)
    }

    fn unsupported(mime_type: &str) -> DecodeError {
        DecodeError::Unsupported {
            mime_type: mime_type.to_string(),
        }
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8], mime_type: &str) -> Result<DecodedAudio, DecodeError> {
        if WavDecoder::supports(mime_type) {
            return WavDecoder.decode(bytes, mime_type);
        }

        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(bytes.to_vec())),
            MediaSourceStreamOptions::default(),
        );
        let mut hint = Hint::new();
        hint.mime_type(essence(mime_type));
        if let Some(ext) = Self::extension_hint(mime_type) {
            hint.with_extension(ext);
        }

        let detected = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| match e {
                SymphoniaError::Unsupported(_) => Self::unsupported(mime_type),
                other => DecodeError::Malformed(other.to_string()),
            })?;
        let mut format = detected.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Self::unsupported(mime_type))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or_default();

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| match e {
                SymphoniaError::Unsupported(_) => Self::unsupported(mime_type),
                other => DecodeError::Malformed(other.to_string()),
            })?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(reason)) => {
                    debug!(reason, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            };
            let spec = *decoded.spec();
            sample_rate = spec.rate;
            let channels = spec.channels.count().max(1);

            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            samples.extend(
                buffer
                    .samples()
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
            );
        }

        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(DecodedAudio::new(sample_rate, samples))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    /// Encodes 16-bit PCM into an in-memory WAVE file.
    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_mono_pcm16() {
        let bytes = wav_bytes(8000, 1, &[0, 16384, -16384, i16::MAX]);
        let decoded = WavDecoder.decode(&bytes, "audio/wav").unwrap();
        assert_eq!(decoded.sample_rate, 8000);
        assert_eq!(decoded.samples.len(), 4);
        assert!((decoded.samples[1] - 0.5).abs() < 1e-4);
        assert!((decoded.samples[2] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_decode_downmixes_stereo() {
        let bytes = wav_bytes(44100, 2, &[16384, 0, -16384, -16384]);
        let decoded = WavDecoder.decode(&bytes, "audio/x-wav").unwrap();
        assert_eq!(decoded.samples.len(), 2);
        assert!((decoded.samples[0] - 0.25).abs() < 1e-4);
        assert!((decoded.samples[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_decode_float_samples() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0.25_f32).unwrap();
            writer.write_sample(-1.0_f32).unwrap();
            writer.finalize().unwrap();
        }
        let decoded = WavDecoder.decode(cursor.get_ref(), "audio/wav").unwrap();
        assert_eq!(decoded.samples, vec![0.25, -1.0]);
    }

    #[test]
    fn test_rejects_other_types() {
        let err = WavDecoder.decode(b"ID3", "audio/mpeg").unwrap_err();
        assert_eq!(
            err,
            DecodeError::Unsupported {
                mime_type: "audio/mpeg".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_garbage_and_empty() {
        assert!(matches!(
            WavDecoder.decode(b"not a wave", "audio/wav"),
            Err(DecodeError::Malformed(_))
        ));
        let empty = wav_bytes(8000, 1, &[]);
        assert_eq!(WavDecoder.decode(&empty, "audio/wav"), Err(DecodeError::Empty));
    }

    #[test]
    fn test_supports_parameters_and_case() {
        assert!(WavDecoder::supports("audio/WAV"));
        assert!(WavDecoder::supports("audio/wav; codecs=1"));
        assert!(!WavDecoder::supports("audio/ogg"));
    }

    /// Four 256-sample FLAC frames at 8 kHz: a square wave of +/-16384
    /// switching sign every four samples.
    pub(crate) const SQUARE_FLAC: &[u8] = include_bytes!("../../tests/fixtures/square.flac");

    #[test]
    fn test_symphonia_decodes_flac() {
        let decoded = SymphoniaDecoder.decode(SQUARE_FLAC, "audio/flac").unwrap();
        assert_eq!(decoded.sample_rate, 8000);
        assert_eq!(decoded.samples.len(), 1024);

        let peak = decoded.samples[0];
        assert!(peak > 0.0);
        for (n, sample) in decoded.samples.iter().enumerate() {
            let expected = if (n / 4) % 2 == 0 { peak } else { -peak };
            assert!((sample - expected).abs() < 1e-6, "sample {n} was {sample}");
        }
    }

    #[test]
    fn test_symphonia_detects_format_without_hint() {
        let decoded = SymphoniaDecoder
            .decode(SQUARE_FLAC, "application/octet-stream")
            .unwrap();
        assert_eq!(decoded.samples.len(), 1024);
    }

    #[test]
    fn test_symphonia_routes_wave_to_hound() {
        let bytes = wav_bytes(8000, 1, &[0, 16384, -16384]);
        let decoded = SymphoniaDecoder.decode(&bytes, "audio/wav").unwrap();
        assert_eq!(decoded, WavDecoder.decode(&bytes, "audio/wav").unwrap());
    }

    #[test]
    fn test_symphonia_rejects_unknown_payload() {
        let err = SymphoniaDecoder
            .decode(b"definitely not audio at all", "audio/mpeg")
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Unsupported { .. } | DecodeError::Malformed(_)
        ));
    }

    #[test]
    fn test_extension_hints() {
        assert_eq!(SymphoniaDecoder::extension_hint("audio/mpeg"), Some("mp3"));
        assert_eq!(SymphoniaDecoder::extension_hint("audio/FLAC"), Some("flac"));
        assert_eq!(
            SymphoniaDecoder::extension_hint("audio/ogg; codecs=vorbis"),
            Some("ogg")
        );
        assert_eq!(SymphoniaDecoder::extension_hint("audio/midi"), None);
    }

    #[test]
    fn test_duration() {
        let audio = DecodedAudio::new(100, vec![0.0; 250]);
        assert!((audio.duration_secs() - 2.5).abs() < f64::EPSILON);
    }
}
