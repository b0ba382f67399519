//! Waveform preview images
//!
//! A min/max envelope of the mono mix drawn as a filled SVG polygon.

use std::fmt::Write as _;
use std::path::Path;

use crate::engine::AudioBuffer;
use crate::error::Result;

/// Default image size in pixels
pub const PREVIEW_WIDTH: usize = 1200;
pub const PREVIEW_HEIGHT: usize = 200;

const BACKGROUND: &str = "#1e1e24";
const FOREGROUND: &str = "#4fc3f7";

/// Preview file name for a stem
pub fn preview_file_name(stem_name: &str) -> String {
    format!("{}_preview.svg", stem_name)
}

/// Per-column (min, max) of the mono mix
///
/// Columns beyond the clip length repeat silence.
pub fn waveform_envelope(buffer: &AudioBuffer, columns: usize) -> Vec<(f32, f32)> {
    let mono = buffer.to_mono();
    if mono.is_empty() || columns == 0 {
        return vec![(0.0, 0.0); columns];
    }

    (0..columns)
        .map(|c| {
            let start = c * mono.len() / columns;
            let end = ((c + 1) * mono.len() / columns).max(start + 1).min(mono.len());
            if start >= mono.len() {
                return (0.0, 0.0);
            }
            mono[start..end]
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)))
        })
        .collect()
}

/// Render the preview SVG document
pub fn render_waveform_svg(buffer: &AudioBuffer, width: usize, height: usize) -> String {
    let envelope = waveform_envelope(buffer, width);
    let mid = height as f32 / 2.0;
    let y = |v: f32| mid - v.clamp(-1.0, 1.0) * mid;

    let mut points = String::new();
    for (x, &(_, hi)) in envelope.iter().enumerate() {
        let _ = write!(points, "{},{:.2} ", x, y(hi));
    }
    for (x, &(lo, _)) in envelope.iter().enumerate().rev() {
        let _ = write!(points, "{},{:.2} ", x, y(lo));
    }

    format!(
        concat!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" ",
            "viewBox=\"0 0 {w} {h}\">\n",
            "  <rect width=\"{w}\" height=\"{h}\" fill=\"{bg}\"/>\n",
            "  <polygon points=\"{pts}\" fill=\"{fg}\" stroke=\"{fg}\" stroke-width=\"1\"/>\n",
            "</svg>\n"
        ),
        w = width,
        h = height,
        bg = BACKGROUND,
        fg = FOREGROUND,
        pts = points.trim_end()
    )
}

/// Write a preview image to `path`
pub fn write_waveform_preview(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    let svg = render_waveform_svg(buffer, PREVIEW_WIDTH, PREVIEW_HEIGHT);
    std::fs::write(path, svg)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;
    use tempfile::tempdir;

    #[test]
    fn test_envelope_of_tone() {
        let tone = generate_test_tone(100.0, 1.0, 8000);
        let envelope = waveform_envelope(&tone, 10);
        assert_eq!(envelope.len(), 10);
        for (lo, hi) in envelope {
            assert!(lo < -0.99 && hi > 0.99, "({}, {})", lo, hi);
        }
    }

    #[test]
    fn test_envelope_wider_than_clip() {
        let buffer = AudioBuffer::from_mono(vec![0.5, -0.5], 8000);
        let envelope = waveform_envelope(&buffer, 4);
        assert_eq!(envelope.len(), 4);
        assert_eq!(envelope[0], (0.5, 0.5));
        assert_eq!(envelope[3], (-0.5, -0.5));
    }

    #[test]
    fn test_svg_document() {
        let tone = generate_test_tone(100.0, 0.1, 8000);
        let svg = render_waveform_svg(&tone, 50, 20);
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("width=\"50\""));
        assert!(svg.contains("<polygon"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_write_preview() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(preview_file_name("bass"));
        write_waveform_preview(&generate_test_tone(60.0, 0.2, 8000), &path).unwrap();
        assert!(path.ends_with("bass_preview.svg"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("<svg"));
    }
}
