//! Standard MIDI File encoding
//!
//! Writes a single-track, format 1 file at 96 ticks per quarter note:
//! tempo, 4/4 time signature and track name meta-events, then one
//! Note-On/Note-Off pair per note, then end-of-track.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoopError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Ticks per quarter note written in the header
pub const TICKS_PER_QUARTER: u16 = 96;

/// Velocity of every Note-On
pub const NOTE_ON_VELOCITY: u8 = 100;

/// Track name meta-event text
pub const DEFAULT_TRACK_NAME: &str = "LoopArchitect";

/// Largest value a MIDI variable-length quantity can carry
pub const MAX_VLQ: u32 = 0x0FFF_FFFF;

/// Largest tempo the 3-byte tempo meta-event can carry (µs per quarter)
const MAX_TEMPO_US: u32 = 0x00FF_FFFF;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;

// ============================================================================
// Note events
// ============================================================================

/// One transcribed note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI note number; 0 means "no pitch" and is never encoded
    pub midi_pitch: u8,
    /// Start time in seconds from the start of the stem
    pub start_sec: f64,
    /// Duration in seconds
    pub duration_sec: f64,
}

// ============================================================================
// Variable-length quantities
// ============================================================================

/// Encode a MIDI variable-length quantity
///
/// Seven bits per byte, most significant group first, with the high bit
/// set on every byte except the last.
///
/// # Errors
/// `MidiEncoding` if `value` exceeds [`MAX_VLQ`]
pub fn encode_vlq(value: u32) -> Result<Vec<u8>> {
    if value > MAX_VLQ {
        return Err(LoopError::MidiEncoding {
            reason: format!("delta time {} exceeds 28 bits", value),
        });
    }

    let mut bytes = vec![(value & 0x7F) as u8];
    let mut rest = value >> 7;
    while rest > 0 {
        bytes.push(((rest & 0x7F) as u8) | 0x80);
        rest >>= 7;
    }
    bytes.reverse();
    Ok(bytes)
}

// ============================================================================
// Encoder
// ============================================================================

/// Encodes note lists at a fixed tempo
#[derive(Debug, Clone)]
pub struct MidiEncoder {
    bpm: f64,
    tempo_us: u32,
    track_name: String,
}

impl MidiEncoder {
    /// Create an encoder for the given tempo
    ///
    /// Tempos outside the range of the 3-byte tempo meta-event (below about
    /// 3.58 BPM) are clamped to it. Ticks then follow the clamped tempo, so
    /// note times in seconds are preserved.
    ///
    /// # Errors
    /// `MidiEncoding` if `bpm` is not a positive finite number
    pub fn new(bpm: f64) -> Result<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(LoopError::MidiEncoding {
                reason: format!("tempo must be positive, got {} BPM", bpm),
            });
        }

        let exact_us = (60_000_000.0 / bpm) as u64;
        let tempo_us = exact_us.clamp(1, MAX_TEMPO_US as u64) as u32;
        let bpm = if tempo_us as u64 == exact_us {
            bpm
        } else {
            let clamped = 60_000_000.0 / tempo_us as f64;
            log::warn!(
                "{} BPM does not fit a MIDI tempo event, writing {:.3} BPM",
                bpm,
                clamped
            );
            clamped
        };

        Ok(Self {
            bpm,
            tempo_us,
            track_name: DEFAULT_TRACK_NAME.to_string(),
        })
    }

    /// Tempo written to the file, in beats per minute
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Replace the track name meta-event text
    pub fn with_track_name(mut self, name: impl Into<String>) -> Self {
        self.track_name = name.into();
        self
    }

    /// Seconds per tick at this tempo
    pub fn seconds_per_tick(&self) -> f64 {
        60.0 / (self.bpm * TICKS_PER_QUARTER as f64)
    }

    /// Encode notes into a complete Standard MIDI File
    ///
    /// Notes are sorted by start time (stable, so detection order breaks
    /// ties). Pitch-0 notes are skipped. A note that starts before the
    /// previous note ended is written with a zero delta, and every note
    /// lasts at least one tick.
    pub fn encode(&self, notes: &[NoteEvent]) -> Result<Vec<u8>> {
        let mut ordered: Vec<&NoteEvent> = notes.iter().collect();
        ordered.sort_by(|a, b| {
            a.start_sec
                .partial_cmp(&b.start_sec)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut track = Vec::new();
        self.write_header_events(&mut track)?;

        let spt = self.seconds_per_tick();
        let mut current_tick: u64 = 0;

        for note in ordered {
            if note.midi_pitch == 0 {
                continue;
            }
            if note.midi_pitch > 127 {
                return Err(LoopError::MidiEncoding {
                    reason: format!("note number {} out of range", note.midi_pitch),
                });
            }

            let target_tick = to_ticks(note.start_sec, spt);
            let duration_ticks = to_ticks(note.duration_sec, spt).max(1);

            write_vlq(&mut track, target_tick.saturating_sub(current_tick))?;
            track.extend_from_slice(&[NOTE_ON, note.midi_pitch, NOTE_ON_VELOCITY]);
            current_tick = current_tick.max(target_tick);

            write_vlq(&mut track, duration_ticks)?;
            track.extend_from_slice(&[NOTE_OFF, note.midi_pitch, 0x00]);
            current_tick += duration_ticks;
        }

        // End of track
        track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        let mut file = Vec::with_capacity(22 + track.len());
        file.extend_from_slice(b"MThd");
        file.extend_from_slice(&6_u32.to_be_bytes());
        file.extend_from_slice(&1_u16.to_be_bytes()); // format 1
        file.extend_from_slice(&1_u16.to_be_bytes()); // one track
        file.extend_from_slice(&TICKS_PER_QUARTER.to_be_bytes());

        file.extend_from_slice(b"MTrk");
        file.extend_from_slice(&(track.len() as u32).to_be_bytes());
        file.extend_from_slice(&track);

        Ok(file)
    }

    /// Encode and write to `path`
    pub fn write(&self, notes: &[NoteEvent], path: &Path) -> Result<()> {
        let bytes = self.encode(notes)?;
        std::fs::write(path, bytes)?;
        log::debug!("Wrote {} notes to {}", notes.len(), path.display());
        Ok(())
    }

    fn write_header_events(&self, track: &mut Vec<u8>) -> Result<()> {
        // Tempo
        track.extend_from_slice(&[0x00, 0xFF, 0x51, 0x03]);
        track.extend_from_slice(&self.tempo_us.to_be_bytes()[1..]);

        // 4/4, 24 clocks per click, 8 32nds per quarter
        track.extend_from_slice(&[0x00, 0xFF, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08]);

        // Track name
        let name = self.track_name.as_bytes();
        track.extend_from_slice(&[0x00, 0xFF, 0x03]);
        write_vlq(track, name.len() as u64)?;
        track.extend_from_slice(name);

        Ok(())
    }
}

/// Encode notes at `bpm` with the default track name
pub fn encode_midi(notes: &[NoteEvent], bpm: f64) -> Result<Vec<u8>> {
    MidiEncoder::new(bpm)?.encode(notes)
}

/// Encode notes at `bpm` and write them to `path`
pub fn write_midi_file(notes: &[NoteEvent], bpm: f64, path: &Path) -> Result<()> {
    MidiEncoder::new(bpm)?.write(notes, path)
}

fn to_ticks(seconds: f64, seconds_per_tick: f64) -> u64 {
    let ticks = (seconds / seconds_per_tick).round();
    if ticks.is_finite() && ticks > 0.0 {
        ticks as u64
    } else {
        0
    }
}

fn write_vlq(out: &mut Vec<u8>, value: u64) -> Result<()> {
    let value = u32::try_from(value).map_err(|_| LoopError::MidiEncoding {
        reason: format!("delta time {} exceeds 28 bits", value),
    })?;
    out.extend(encode_vlq(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;
    use test_case::test_case;

    fn note(pitch: u8, start: f64, duration: f64) -> NoteEvent {
        NoteEvent {
            midi_pitch: pitch,
            start_sec: start,
            duration_sec: duration,
        }
    }

    /// Bytes after the fixed header and meta-events, minus end-of-track
    fn note_events(bytes: &[u8]) -> &[u8] {
        let meta_len = 7 + 8 + 4 + DEFAULT_TRACK_NAME.len();
        &bytes[22 + meta_len..bytes.len() - 4]
    }

    #[test_case(0, &[0x00] ; "zero")]
    #[test_case(0x7F, &[0x7F] ; "one byte max")]
    #[test_case(0x80, &[0x81, 0x00] ; "two bytes min")]
    #[test_case(0x2000, &[0xC0, 0x00] ; "two bytes")]
    #[test_case(0x3FFF, &[0xFF, 0x7F] ; "two bytes max")]
    #[test_case(0x4000, &[0x81, 0x80, 0x00] ; "three bytes min")]
    #[test_case(0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F] ; "four bytes max")]
    fn test_encode_vlq(value: u32, expected: &[u8]) {
        assert_eq!(encode_vlq(value).unwrap(), expected.to_vec());
    }

    #[test]
    fn test_vlq_rejects_oversized() {
        assert!(encode_vlq(0x1000_0000).is_err());
    }

    #[test]
    fn test_single_note_file_is_byte_exact() {
        let bytes = encode_midi(&[note(60, 0.0, 0.5)], 120.0).unwrap();

        let mut expected = vec![
            b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 1, 0, 1, 0, 96, // header
            b'M', b'T', b'r', b'k', 0, 0, 0, 44, // track chunk
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // 500000 µs per quarter
            0x00, 0xFF, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08, // 4/4
            0x00, 0xFF, 0x03, 13,
        ];
        expected.extend_from_slice(b"LoopArchitect");
        expected.extend_from_slice(&[
            0x00, 0x90, 60, 100, // note on at tick 0
            0x60, 0x80, 60, 0, // note off 96 ticks later
            0x00, 0xFF, 0x2F, 0x00,
        ]);

        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_notes_are_sorted_and_deltas_relative() {
        let notes = [note(64, 1.0, 0.25), note(60, 0.0, 0.5)];
        let bytes = encode_midi(&notes, 120.0).unwrap();

        // 60: on @0, off +96; 64: on @192 (+96), off +48
        assert_eq!(
            note_events(&bytes),
            &[0x00, 0x90, 60, 100, 0x60, 0x80, 60, 0, 0x60, 0x90, 64, 100, 0x30, 0x80, 64, 0]
        );
    }

    #[test]
    fn test_pitch_zero_is_skipped() {
        let with_rest = encode_midi(&[note(0, 0.0, 1.0), note(62, 0.0, 0.5)], 120.0).unwrap();
        let without = encode_midi(&[note(62, 0.0, 0.5)], 120.0).unwrap();
        assert_eq!(with_rest, without);
    }

    #[test]
    fn test_zero_duration_promoted_to_one_tick() {
        let bytes = encode_midi(&[note(60, 0.0, 0.0)], 120.0).unwrap();
        assert_eq!(note_events(&bytes), &[0x00, 0x90, 60, 100, 0x01, 0x80, 60, 0]);
    }

    #[test]
    fn test_overlapping_notes_never_go_negative() {
        let notes = [note(60, 0.0, 1.0), note(62, 0.5, 0.5)];
        let bytes = encode_midi(&notes, 120.0).unwrap();
        // second note would start at tick 96, but the first ends at 192
        assert_eq!(
            note_events(&bytes),
            &[0x00, 0x90, 60, 100, 0x81, 0x40, 0x80, 60, 0, 0x00, 0x90, 62, 100, 0x60, 0x80, 62, 0]
        );
    }

    #[test]
    fn test_long_delta_uses_multibyte_vlq() {
        // 10 s at 120 BPM = 1920 ticks = 0x780 -> 0x8F 0x00
        let bytes = encode_midi(&[note(60, 10.0, 0.5)], 120.0).unwrap();
        assert_eq!(&note_events(&bytes)[..2], &[0x8F, 0x00]);
    }

    #[test]
    fn test_tempo_bytes_follow_bpm() {
        let bytes = encode_midi(&[], 90.0).unwrap();
        // 60_000_000 / 90 = 666_666 = 0x0A2C2A
        assert_eq!(&bytes[26..29], &[0x0A, 0x2C, 0x2A]);
    }

    #[test]
    fn test_invalid_tempo_rejected() {
        assert!(MidiEncoder::new(0.0).is_err());
        assert!(MidiEncoder::new(-120.0).is_err());
        assert!(MidiEncoder::new(f64::NAN).is_err());
    }

    #[test]
    fn test_slow_tempo_is_clamped() {
        let encoder = MidiEncoder::new(3.0).unwrap();
        assert!((encoder.bpm() - 60_000_000.0 / 16_777_215.0).abs() < 1e-9);

        // 1 s at the clamped tempo: 96 / 16.777215 = 5.72 -> 6 ticks
        let bytes = encoder.encode(&[note(60, 1.0, 1.0)]).unwrap();
        assert_eq!(&bytes[26..29], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(note_events(&bytes), &[0x06, 0x90, 60, 100, 0x06, 0x80, 60, 0]);
    }

    #[test]
    fn test_exact_tempo_is_not_clamped() {
        assert_eq!(MidiEncoder::new(95.0).unwrap().bpm(), 95.0);
    }

    #[test]
    fn test_custom_track_name_length() {
        let bytes = MidiEncoder::new(120.0)
            .unwrap()
            .with_track_name("Bass")
            .encode(&[])
            .unwrap();
        assert_eq!(&bytes[37..41], &[0x00, 0xFF, 0x03, 4]);
        assert_eq!(&bytes[41..45], b"Bass");
    }

    #[test]
    fn test_write_midi_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("melody.mid");
        write_midi_file(&[note(60, 0.0, 0.5)], 120.0, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
        assert_eq!(bytes.len(), 22 + 44);
    }
}
