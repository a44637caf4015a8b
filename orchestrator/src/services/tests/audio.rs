use crate::services::audio::{AudioClip, encode_wav};
use crate::traits::{AudioSource, AudioSourceFactory};
use shared::Settings;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_wav(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_default_chunk_is_960_samples() {
    let settings = Settings::default();
    let clip = AudioClip::from_settings(&settings).unwrap();

    assert_eq!(clip.chunk_size_bytes(), 1920);
    assert_eq!(clip.chunk_size_bytes(), settings.chunk_size_bytes());
    assert_eq!(clip.sample_rate(), 16000);
    assert_eq!(clip.len_samples(), 80_000);
    assert!((clip.duration() - 5.0).abs() < 1e-9);
}

#[test]
fn test_sine_wave_stays_within_half_amplitude() {
    let clip = AudioClip::sine_wave(440.0, 0.1, 16000, 60);
    let mut cursor = clip.cursor();
    let mut peak = 0i32;
    while let Some(chunk) = cursor.next_chunk() {
        for pair in chunk.chunks_exact(2) {
            peak = peak.max((i16::from_le_bytes([pair[0], pair[1]]) as i32).abs());
        }
    }
    assert!(peak > 0);
    assert!(peak <= i16::MAX as i32 / 2 + 1);
}

#[test]
fn test_last_chunk_is_zero_padded() {
    // 1000 samples at 960 per chunk: one full chunk and 40 samples
    let clip = AudioClip::new(vec![7i16; 1000], 16000, 60);
    let mut cursor = clip.cursor();

    assert_eq!(clip.total_chunks(), 2);
    let first = cursor.next_chunk().unwrap();
    let last = cursor.next_chunk().unwrap();
    assert_eq!(first.len(), 1920);
    assert_eq!(last.len(), 1920);
    assert_eq!(i16::from_le_bytes([last[78], last[79]]), 7);
    assert!(last[80..].iter().all(|&b| b == 0));
    assert!(cursor.next_chunk().is_none());
}

#[test]
fn test_cursor_restart_and_independence() {
    let clip = AudioClip::new((0..2000).map(|i| i as i16).collect(), 16000, 60);
    let mut a = clip.open();
    let mut b = clip.open();

    let first = a.next_chunk().unwrap();
    a.next_chunk().unwrap();
    assert_eq!(b.next_chunk().unwrap(), first);

    a.restart();
    assert_eq!(a.next_chunk().unwrap(), first);
}

#[test]
fn test_pcm_bytes_drop_trailing_odd_byte() {
    let clip = AudioClip::from_pcm_bytes(&[1, 0, 2, 0, 9], 16000, 60);
    assert_eq!(clip.len_samples(), 2);
}

#[test]
fn test_wav_stereo_is_downmixed() {
    // Two stereo frames: (100, 300) and (-100, -300)
    let file = write_wav(&encode_wav(&[100, 300, -100, -300], 2, 16000));
    let clip = AudioClip::from_wav_file(file.path(), 16000, 60).unwrap();

    assert_eq!(clip.len_samples(), 2);
    let chunk = clip.cursor().next_chunk().unwrap();
    assert_eq!(i16::from_le_bytes([chunk[0], chunk[1]]), 200);
    assert_eq!(i16::from_le_bytes([chunk[2], chunk[3]]), -200);
}

#[test]
fn test_wav_is_resampled_to_target_rate() {
    let file = write_wav(&encode_wav(&vec![1000i16; 8000], 1, 8000));
    let clip = AudioClip::from_wav_file(file.path(), 16000, 60).unwrap();

    assert_eq!(clip.sample_rate(), 16000);
    assert_eq!(clip.len_samples(), 16000);
    assert!((clip.duration() - 1.0).abs() < 1e-9);
}

#[test]
fn test_wav_rejects_non_pcm16() {
    let mut bytes = encode_wav(&[0i16; 4], 1, 16000);
    // bits per sample lives at byte 34
    bytes[34] = 8;
    let file = write_wav(&bytes);
    assert!(AudioClip::from_wav_file(file.path(), 16000, 60).is_err());

    let file = write_wav(b"not a wav file at all");
    assert!(AudioClip::from_wav_file(file.path(), 16000, 60).is_err());
}

#[test]
fn test_settings_audio_file_is_loaded() {
    let file = write_wav(&encode_wav(&vec![0i16; 1600], 1, 16000));
    let settings = Settings {
        audio_file: Some(file.path().to_path_buf()),
        ..Settings::default()
    };
    let clip = AudioClip::from_settings(&settings).unwrap();
    assert_eq!(clip.len_samples(), 1600);
    assert_eq!(clip.total_chunks(), 2);
}

#[test]
fn test_upload_detects_wav_or_raw_pcm() {
    let wav = encode_wav(&vec![5i16; 960], 1, 16000);
    let from_wav = AudioClip::from_upload(&wav, 16000, 60).unwrap();
    assert_eq!(from_wav.len_samples(), 960);

    let raw = vec![0u8; 3840];
    let from_raw = AudioClip::from_upload(&raw, 16000, 60).unwrap();
    assert_eq!(from_raw.len_samples(), 1920);
    assert_eq!(from_raw.total_chunks(), 2);
    assert_eq!(from_raw.chunk_duration_ms(), 60);
}
