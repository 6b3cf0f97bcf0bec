use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::AppError;

pub const TRIM_FRAME_LENGTH: usize = 2048;
pub const TRIM_HOP_LENGTH: usize = 512;
pub const TRIM_TOP_DB: f32 = 60.0;

/// Convert audio samples to WAV format
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AppError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Vec::new();
    {
        let cursor = Cursor::new(&mut buffer);
        let mut writer = WavWriter::new(cursor, spec)
            .map_err(|e| AppError::TtsError(format!("Failed to create WAV writer: {}", e)))?;

        for &sample in samples {
            let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| AppError::TtsError(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| AppError::TtsError(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(buffer)
}

/// Strip leading and trailing silence.
///
/// Frames are centered on multiples of `hop_length` with zero padding at the
/// edges. A frame is kept when its mean power is within `top_db` decibels of
/// the loudest frame. Returns the span from the first kept frame to the end
/// of the last one.
pub fn trim_silence(samples: &[f32], top_db: f32, frame_length: usize, hop_length: usize) -> &[f32] {
    if samples.is_empty() || frame_length == 0 || hop_length == 0 {
        return samples;
    }

    // prefix[i] = sum of squares of samples[..i]
    let mut prefix = Vec::with_capacity(samples.len() + 1);
    prefix.push(0.0f64);
    let mut acc = 0.0f64;
    for &s in samples {
        acc += f64::from(s) * f64::from(s);
        prefix.push(acc);
    }

    let half = frame_length / 2;
    let n_frames = 1 + samples.len() / hop_length;
    let power: Vec<f64> = (0..n_frames)
        .map(|i| {
            let center = i * hop_length;
            let lo = center.saturating_sub(half).min(samples.len());
            let hi = (center + frame_length - half).min(samples.len());
            (prefix[hi] - prefix[lo]) / frame_length as f64
        })
        .collect();

    const AMIN: f64 = 1e-10;
    let reference = power.iter().copied().fold(AMIN, f64::max);
    let ref_db = 10.0 * reference.log10();
    let is_loud = |p: f64| 10.0 * p.max(AMIN).log10() - ref_db > -f64::from(top_db);

    let first = power.iter().position(|&p| is_loud(p));
    let last = power.iter().rposition(|&p| is_loud(p));

    match (first, last) {
        (Some(first), Some(last)) => {
            let start = (first * hop_length).min(samples.len());
            let end = ((last + 1) * hop_length).min(samples.len());
            &samples[start..end]
        }
        _ => &samples[..0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_to_wav_empty() {
        let wav = samples_to_wav(&[], 24000).unwrap();
        // Should produce valid WAV header even for empty audio
        assert!(wav.starts_with(b"RIFF"));
    }

    #[test]
    fn test_samples_to_wav_valid() {
        let samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let wav = samples_to_wav(&samples, 24000).unwrap();
        assert!(wav.starts_with(b"RIFF"));
        assert_eq!(&wav[8..12], b"WAVE");
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.len() as usize, samples.len());
    }

    #[test]
    fn test_samples_to_wav_header_rate_and_clamp() {
        let wav = samples_to_wav(&[2.0, -3.0], 24000).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24000);
        assert_eq!(reader.spec().channels, 1);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn trims_silence_around_tone() {
        let mut samples = vec![0.0f32; 8192];
        samples.extend((0..4096).map(|i| (i as f32 * 0.1).sin() * 0.8));
        samples.extend(vec![0.0f32; 8192]);

        let trimmed = trim_silence(&samples, TRIM_TOP_DB, TRIM_FRAME_LENGTH, TRIM_HOP_LENGTH);
        assert!(trimmed.len() < samples.len());
        assert!(trimmed.len() >= 4096);
        // Leading and trailing silence beyond one frame is gone
        assert!(trimmed.len() <= 4096 + 2 * TRIM_FRAME_LENGTH);
    }

    #[test]
    fn trim_keeps_loud_signal_intact() {
        let samples: Vec<f32> = (0..10_000).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let trimmed = trim_silence(&samples, TRIM_TOP_DB, TRIM_FRAME_LENGTH, TRIM_HOP_LENGTH);
        assert_eq!(trimmed.len(), samples.len());
    }

    #[test]
    fn trim_handles_empty_input() {
        let trimmed = trim_silence(&[], TRIM_TOP_DB, TRIM_FRAME_LENGTH, TRIM_HOP_LENGTH);
        assert!(trimmed.is_empty());
    }
}
