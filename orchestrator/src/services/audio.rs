//! PCM audio clips and per-connection cursors
//!
//! Clips hold 16-bit mono samples at the target rate and are cheap to share;
//! each connection streams through its own [`ClipCursor`].

use shared::{ProcessId, Settings, process_info};
use std::f64::consts::PI;
use std::path::Path;
use std::sync::Arc;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{AudioSource, AudioSourceFactory};

#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Arc<[i16]>,
    sample_rate: u32,
    chunk_samples: usize,
}

impl AudioClip {
    pub fn new(samples: Vec<i16>, sample_rate: u32, chunk_duration_ms: u64) -> Self {
        let chunk_samples = ((sample_rate as u64 * chunk_duration_ms) / 1000).max(1) as usize;
        Self {
            samples: samples.into(),
            sample_rate,
            chunk_samples,
        }
    }

    /// The configured audio file, or a sine wave when none is set
    pub fn from_settings(settings: &Settings) -> OrchestratorResult<Self> {
        match &settings.audio_file {
            Some(path) => {
                let clip = Self::from_wav_file(path, settings.sample_rate, settings.chunk_duration_ms)?;
                process_info!(
                    ProcessId::current(),
                    "🎵 Loaded {} ({:.2}s, {} chunks)",
                    path.display(),
                    clip.duration(),
                    clip.total_chunks()
                );
                Ok(clip)
            }
            None => Ok(Self::sine_wave(
                settings.default_audio_frequency,
                settings.default_audio_duration,
                settings.sample_rate,
                settings.chunk_duration_ms,
            )),
        }
    }

    /// Half-amplitude sine tone
    pub fn sine_wave(frequency: f64, seconds: f64, sample_rate: u32, chunk_duration_ms: u64) -> Self {
        let count = (sample_rate as f64 * seconds.max(0.0)) as usize;
        let step = if count > 1 { seconds / (count - 1) as f64 } else { 0.0 };
        let samples = (0..count)
            .map(|i| {
                let t = i as f64 * step;
                ((2.0 * PI * frequency * t).sin() * 0.5 * i16::MAX as f64) as i16
            })
            .collect();
        Self::new(samples, sample_rate, chunk_duration_ms)
    }

    /// Little-endian 16-bit PCM; a trailing odd byte is dropped
    pub fn from_pcm_bytes(bytes: &[u8], sample_rate: u32, chunk_duration_ms: u64) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, sample_rate, chunk_duration_ms)
    }

    /// 16-bit PCM WAV, downmixed to mono and resampled to `target_rate`
    pub fn from_wav_file(path: &Path, target_rate: u32, chunk_duration_ms: u64) -> OrchestratorResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_wav_bytes(&bytes, target_rate, chunk_duration_ms)
    }

    /// In-memory variant of [`AudioClip::from_wav_file`]
    pub fn from_wav_bytes(bytes: &[u8], target_rate: u32, chunk_duration_ms: u64) -> OrchestratorResult<Self> {
        let wav = parse_wav(bytes)?;

        let mono = downmix(&wav.samples, wav.channels);
        let samples = if wav.sample_rate == target_rate {
            mono
        } else {
            resample_linear(&mono, wav.sample_rate, target_rate)
        };
        Ok(Self::new(samples, target_rate, chunk_duration_ms))
    }

    /// WAV when the bytes carry a RIFF header, raw little-endian PCM otherwise
    pub fn from_upload(bytes: &[u8], sample_rate: u32, chunk_duration_ms: u64) -> OrchestratorResult<Self> {
        if bytes.starts_with(b"RIFF") {
            Self::from_wav_bytes(bytes, sample_rate, chunk_duration_ms)
        } else {
            Ok(Self::from_pcm_bytes(bytes, sample_rate, chunk_duration_ms))
        }
    }

    pub fn chunk_duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.chunk_samples as u64 * 1000 / self.sample_rate as u64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_samples * 2
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn total_chunks(&self) -> usize {
        self.samples.len().div_ceil(self.chunk_samples)
    }

    pub fn cursor(&self) -> ClipCursor {
        ClipCursor {
            clip: self.clone(),
            position: 0,
        }
    }
}

impl AudioSourceFactory for AudioClip {
    fn open(&self) -> Box<dyn AudioSource> {
        Box::new(self.cursor())
    }
}

/// Position within a shared clip
#[derive(Debug, Clone)]
pub struct ClipCursor {
    clip: AudioClip,
    position: usize,
}

impl AudioSource for ClipCursor {
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        let samples = &self.clip.samples;
        if self.position >= samples.len() {
            return None;
        }
        let end = (self.position + self.clip.chunk_samples).min(samples.len());

        let mut chunk = Vec::with_capacity(self.clip.chunk_size_bytes());
        for sample in &samples[self.position..end] {
            chunk.extend_from_slice(&sample.to_le_bytes());
        }
        // Zero-pad the final chunk
        chunk.resize(self.clip.chunk_size_bytes(), 0);

        self.position = end;
        Some(chunk)
    }

    fn restart(&mut self) {
        self.position = 0;
    }
}

struct WavData {
    channels: u16,
    sample_rate: u32,
    samples: Vec<i16>,
}

fn parse_wav(bytes: &[u8]) -> OrchestratorResult<WavData> {
    fn u16_at(bytes: &[u8], at: usize) -> Option<u16> {
        Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
    }
    fn u32_at(bytes: &[u8], at: usize) -> Option<u32> {
        Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
    }

    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(OrchestratorError::audio("not a RIFF/WAVE file"));
    }

    let mut format: Option<(u16, u16, u32, u16)> = None;
    let mut data: Option<&[u8]> = None;
    let mut offset = 12;

    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32_at(bytes, offset + 4).unwrap_or(0) as usize;
        let body_start = offset + 8;
        let body_end = (body_start + size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => {
                let tag = u16_at(body, 0).ok_or_else(|| OrchestratorError::audio("truncated fmt chunk"))?;
                let channels = u16_at(body, 2).unwrap_or(0);
                let rate = u32_at(body, 4).unwrap_or(0);
                let bits = u16_at(body, 14).unwrap_or(0);
                format = Some((tag, channels, rate, bits));
            }
            b"data" => data = Some(body),
            _ => {}
        }

        // Chunks are word aligned
        offset = body_start + size + (size & 1);
    }

    let (tag, channels, sample_rate, bits) = format.ok_or_else(|| OrchestratorError::audio("missing fmt chunk"))?;
    // 1 = PCM, 0xFFFE = WAVE_FORMAT_EXTENSIBLE
    if tag != 1 && tag != 0xFFFE {
        return Err(OrchestratorError::audio(format!("unsupported WAV format tag {tag}")));
    }
    if bits != 16 {
        return Err(OrchestratorError::audio(format!("only 16-bit PCM is supported, got {bits}-bit")));
    }
    if channels == 0 || sample_rate == 0 {
        return Err(OrchestratorError::audio("invalid channel count or sample rate"));
    }
    let data = data.ok_or_else(|| OrchestratorError::audio("missing data chunk"))?;

    let samples = data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(WavData {
        channels,
        sample_rate,
        samples,
    })
}

fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let ratio = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let index = (pos.floor() as usize).min(last);
            let next = (index + 1).min(last);
            let frac = pos - index as f64;
            let value = samples[index] as f64 * (1.0 - frac) + samples[next] as f64 * frac;
            value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

/// Minimal 16-bit PCM WAV encoder, used to produce fixture files
pub fn encode_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}
