use crate::decoder::PixelFrame;
use crate::geometry::VideoGeometry;
use crate::Result;
use crossterm::style::{Color, ResetColor, SetBackgroundColor};
use crossterm::Command;
use image::{Rgb, RgbImage};
use log::trace;

/// Source taps contributing to one destination pixel along an axis
type Taps = Vec<(u32, f32)>;

/// Area-averaging weights for mapping `src` samples onto `dst` samples.
///
/// Each destination sample covers `src / dst` source samples; a source sample
/// contributes in proportion to how much of it lies inside that span.
fn area_taps(src: u32, dst: u32) -> Vec<Taps> {
    let scale = f64::from(src) / f64::from(dst);

    (0..dst)
        .map(|d| {
            let start = f64::from(d) * scale;
            let end = start + scale;
            let first = start.floor() as u32;
            let last = (end.ceil() as u32).min(src);

            (first..last)
                .filter_map(|s| {
                    let lo = start.max(f64::from(s));
                    let hi = end.min(f64::from(s + 1));
                    let coverage = hi - lo;
                    (coverage > 0.0).then(|| (s, (coverage / scale) as f32))
                })
                .collect()
        })
        .collect()
}

/// Resize a frame with area averaging
pub fn resize_area(frame: &PixelFrame, width: u32, height: u32) -> RgbImage {
    let x_taps = area_taps(frame.width, width);
    let y_taps = area_taps(frame.height, height);

    RgbImage::from_fn(width, height, |x, y| {
        let mut acc = [0f32; 3];
        for &(sy, wy) in &y_taps[y as usize] {
            for &(sx, wx) in &x_taps[x as usize] {
                let weight = wx * wy;
                let px = frame.pixel(sx, sy);
                for (channel, value) in acc.iter_mut().zip(px) {
                    *channel += f32::from(value) * weight;
                }
            }
        }
        Rgb(acc.map(|c| c.round().clamp(0.0, 255.0) as u8))
    })
}

/// Encodes frames as rows of truecolor background cells
#[derive(Debug, Default, Clone)]
pub struct FrameEncoder;

impl FrameEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a frame for the given geometry.
    ///
    /// Returns `geometry.video_height()` lines, each terminated by a color reset
    /// and a newline. Consecutive cells of the same color share one escape.
    pub fn encode(&self, frame: &PixelFrame, geometry: VideoGeometry) -> Result<Vec<String>> {
        let width = geometry.video_width();
        let height = geometry.video_height();
        let resized = resize_area(frame, width, height);

        trace!(
            "Encoding {}x{} frame into {}x{} cells",
            frame.width,
            frame.height,
            width,
            height
        );

        let mut lines = Vec::with_capacity(height as usize);
        for row in resized.rows() {
            // "\x1b[48;2;255;255;255m " is at most 20 bytes per cell
            let mut line = String::with_capacity(width as usize * 20 + 8);
            let mut previous = None;
            for &Rgb([r, g, b]) in row {
                if previous != Some((r, g, b)) {
                    SetBackgroundColor(Color::Rgb { r, g, b }).write_ansi(&mut line)?;
                    previous = Some((r, g, b));
                }
                line.push(' ');
            }
            ResetColor.write_ansi(&mut line)?;
            line.push('\n');
            lines.push(line);
        }

        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(width: u16, height: u16) -> VideoGeometry {
        VideoGeometry { width, height }
    }

    #[test]
    fn test_area_taps_sum_to_one() {
        for &(src, dst) in &[(1920, 160), (7, 3), (3, 7), (10, 10)] {
            for taps in area_taps(src, dst) {
                let total: f32 = taps.iter().map(|&(_, w)| w).sum();
                assert!((total - 1.0).abs() < 1e-4, "{}->{}: {}", src, dst, total);
            }
        }
    }

    #[test]
    fn test_resize_averages_blocks() {
        // Left half black, right half white, shrunk to two pixels
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&[0, 0, 0, 0, 0, 0, 255, 255, 255, 255, 255, 255]);
        }
        let frame = PixelFrame::new(data, 4, 4).unwrap();
        let resized = resize_area(&frame, 2, 1);
        assert_eq!(resized.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(resized.get_pixel(1, 0), &Rgb([255, 255, 255]));

        let single = resize_area(&frame, 1, 1);
        assert_eq!(single.get_pixel(0, 0), &Rgb([128, 128, 128]));
    }

    #[test]
    fn test_encode_line_layout() {
        let frame = PixelFrame::solid(8, 8, [10, 20, 30]);
        let lines = FrameEncoder::new().encode(&frame, geometry(2, 3)).unwrap();

        // Two rows of video plus one reserved status row
        assert_eq!(lines.len(), 2);
        for line in &lines {
            assert_eq!(line, "\x1b[48;2;10;20;30m    \x1b[0m\n");
        }
    }

    #[test]
    fn test_encode_emits_escape_on_color_change() {
        let mut data = Vec::new();
        data.extend_from_slice(&[255, 0, 0, 0, 0, 255]);
        let frame = PixelFrame::new(data, 2, 1).unwrap();
        let lines = FrameEncoder::new().encode(&frame, geometry(1, 2)).unwrap();

        assert_eq!(lines, vec!["\x1b[48;2;255;0;0m \x1b[48;2;0;0;255m \x1b[0m\n".to_string()]);
    }
}
