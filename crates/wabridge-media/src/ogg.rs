//! Ogg Opus voice-note analysis.
//!
//! Walks the container page by page to find the last granule position and
//! the codec parameters in the `OpusHead` header, derives the clip duration
//! from them, and synthesizes the 64-byte waveform preview the platform
//! renders next to voice notes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum OggError {
    #[error("not a valid Ogg file (missing OggS signature)")]
    MissingSignature,
}

/// Length of the synthesized waveform preview.
pub const WAVEFORM_LEN: usize = 64;

/// Duration bounds accepted for a voice note, in seconds.
pub const MIN_DURATION_SECS: u32 = 1;
pub const MAX_DURATION_SECS: u32 = 300;

#[derive(Debug, Clone)]
pub struct OpusAnalysis {
    /// Clip duration in seconds, clamped to `[1, 300]`.
    pub seconds: u32,
    /// 64 bytes, each in `[0, 100]`. Deterministic for a given duration.
    pub waveform: Vec<u8>,
}

/// Analyze raw Ogg Opus bytes.
///
/// Duration comes from `ceil((last_granule - pre_skip) / sample_rate)`. When
/// no page carries a granule position the size-based estimate of roughly
/// 2000 bytes per second is used instead.
pub fn analyze_ogg_opus(data: &[u8]) -> Result<OpusAnalysis, OggError> {
    if data.len() < 4 || &data[0..4] != b"OggS" {
        return Err(OggError::MissingSignature);
    }

    let mut last_granule: u64 = 0;
    let mut sample_rate: u32 = 48_000;
    let mut pre_skip: u16 = 0;
    let mut found_opus_head = false;

    let mut i = 0usize;
    while i < data.len() {
        if i + 27 >= data.len() {
            break;
        }
        if &data[i..i + 4] != b"OggS" {
            i += 1;
            continue;
        }

        let granule_pos = u64::from_le_bytes(data[i + 6..i + 14].try_into().unwrap());
        let page_seq = u32::from_le_bytes(data[i + 18..i + 22].try_into().unwrap());
        let num_segments = data[i + 26] as usize;

        if i + 27 + num_segments >= data.len() {
            break;
        }
        let segment_table = &data[i + 27..i + 27 + num_segments];
        let page_size = 27 + num_segments + segment_table.iter().map(|&s| s as usize).sum::<usize>();

        // OpusHead lives in one of the first two pages.
        if !found_opus_head && page_seq <= 1 {
            let page = &data[i..(i + page_size).min(data.len())];
            if let Some(head) = find_subslice(page, b"OpusHead") {
                // OpusHead: magic(8) version(1) channels(1) pre_skip(2 LE)
                // sample_rate(4 LE) ...
                if head + 16 <= page.len() {
                    pre_skip = u16::from_le_bytes(page[head + 10..head + 12].try_into().unwrap());
                    sample_rate =
                        u32::from_le_bytes(page[head + 12..head + 16].try_into().unwrap());
                    found_opus_head = true;
                    debug!(sample_rate, pre_skip, "found OpusHead");
                }
            }
        }

        if granule_pos != 0 {
            last_granule = granule_pos;
        }

        i += page_size;
    }

    if !found_opus_head {
        warn!("OpusHead not found, using default codec parameters");
    }

    let seconds = if last_granule > 0 {
        let samples = last_granule.saturating_sub(u64::from(pre_skip));
        (samples as f64 / f64::from(sample_rate.max(1))).ceil() as u32
    } else {
        warn!("no granule position found, estimating duration from size");
        (data.len() as f64 / 2000.0) as u32
    };
    let seconds = seconds.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS);

    let waveform = placeholder_waveform(seconds);
    debug!(
        size = data.len(),
        seconds,
        waveform = waveform.len(),
        "analyzed Ogg Opus voice note"
    );

    Ok(OpusAnalysis { seconds, waveform })
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Synthesize a plausible waveform preview for a voice note.
///
/// Two sinusoids plus noise, faded in and out with a half-sine envelope,
/// seeded by the duration so the preview is stable across retries.
fn placeholder_waveform(seconds: u32) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(u64::from(seconds));
    let mut waveform = vec![0u8; WAVEFORM_LEN];

    let base_amplitude = 35.0;
    let frequency_factor = f64::from(seconds.min(120)) / 30.0;

    for (idx, sample) in waveform.iter_mut().enumerate() {
        let pos = idx as f64 / WAVEFORM_LEN as f64;

        let mut val = base_amplitude * (pos * std::f64::consts::PI * frequency_factor * 8.0).sin();
        val += (base_amplitude / 2.0) * (pos * std::f64::consts::PI * frequency_factor * 16.0).sin();
        val += (rng.gen::<f64>() - 0.5) * 15.0;

        let fade_in_out = (pos * std::f64::consts::PI).sin();
        val *= 0.7 + 0.3 * fade_in_out;
        val += 50.0;

        *sample = val.clamp(0.0, 100.0) as u8;
    }

    waveform
}
