//! Media metadata extraction.
//!
//! Every field is required. A missing field is reported with its own error so the
//! caller can tell which piece of information the container lacks.

use crate::decoder::init_ffmpeg;
use crate::geometry::DisplayRatio;
use ffmpeg_next as ffmpeg;
use log::debug;
use std::path::{Path, PathBuf};

/// Metadata probing errors
#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("Failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: ffmpeg::Error,
    },

    #[error("No video stream found in '{0}'")]
    NoVideoStream(PathBuf),

    #[error("Unable to find video duration")]
    DurationMissing,

    #[error("Unable to find video frames number")]
    FrameCountMissing,

    #[error("Unable to find video resolution")]
    ResolutionMissing,

    #[error("Unable to find video frame rate")]
    FrameRateMissing,
}

/// Immutable facts about the video, probed once before playback
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    /// Duration in seconds
    pub duration: f64,
    pub frame_count: u64,
    pub display_ratio: DisplayRatio,
    /// Nominal frames per second
    pub fps: f64,
}

/// Parse a `HH:MM:SS.fffffffff` duration tag into seconds
pub fn parse_duration_tag(tag: &str) -> Option<f64> {
    let mut parts = tag.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some((hours * 60 + minutes) as f64 * 60.0 + seconds)
}

/// Frame rate from a rational, `None` when either side is not positive
pub fn frame_rate(numerator: i32, denominator: i32) -> Option<f64> {
    (numerator > 0 && denominator > 0).then(|| f64::from(numerator) / f64::from(denominator))
}

/// Parse a `W:H` aspect ratio string
pub fn parse_aspect_ratio(value: &str) -> Option<DisplayRatio> {
    let (width, height) = value.trim().split_once(':')?;
    let ratio = DisplayRatio::new(width.parse().ok()?, height.parse().ok()?);
    (ratio.width > 0 && ratio.height > 0).then_some(ratio)
}

/// Display aspect ratio from the coded size and sample aspect ratio, in lowest terms.
///
/// An unset sample aspect ratio (`0/x`) means square pixels.
pub fn display_ratio(width: u32, height: u32, sar: (i32, i32)) -> Option<DisplayRatio> {
    if width == 0 || height == 0 {
        return None;
    }

    let (sar_num, sar_den) = match sar {
        (n, d) if n > 0 && d > 0 => (n as u64, d as u64),
        _ => (1, 1),
    };

    let dar_width = u64::from(width) * sar_num;
    let dar_height = u64::from(height) * sar_den;
    let divisor = gcd(dar_width, dar_height);
    Some(DisplayRatio::new(
        u32::try_from(dar_width / divisor).ok()?,
        u32::try_from(dar_height / divisor).ok()?,
    ))
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn stream_duration(stream: &ffmpeg::Stream) -> Option<f64> {
    let duration = stream.duration();
    if duration != ffmpeg::ffi::AV_NOPTS_VALUE && duration > 0 {
        return Some(duration as f64 * f64::from(stream.time_base()));
    }
    stream
        .metadata()
        .get("DURATION")
        .and_then(parse_duration_tag)
}

fn stream_frame_count(stream: &ffmpeg::Stream) -> Option<u64> {
    let frames = stream.frames();
    if frames > 0 {
        return Some(frames as u64);
    }
    let metadata = stream.metadata();
    metadata
        .get("NUMBER_OF_FRAMES")
        .or_else(|| metadata.get("NUMBER_OF_FRAMES-eng"))
        .and_then(|value| value.trim().parse().ok())
}

/// Probe the best video stream of a media file
pub fn probe(path: &Path) -> Result<VideoMeta, MetadataError> {
    init_ffmpeg();

    let open_error = |source| MetadataError::Open {
        path: path.to_path_buf(),
        source,
    };

    let input_context = ffmpeg::format::input(&path).map_err(open_error)?;
    let stream = input_context
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| MetadataError::NoVideoStream(path.to_path_buf()))?;

    let duration = stream_duration(&stream).ok_or(MetadataError::DurationMissing)?;
    let frame_count = stream_frame_count(&stream).ok_or(MetadataError::FrameCountMissing)?;

    let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .and_then(|context| context.decoder().video())
        .map_err(|_| MetadataError::ResolutionMissing)?;
    let sar = decoder.aspect_ratio();
    let display_ratio = display_ratio(
        decoder.width(),
        decoder.height(),
        (sar.numerator(), sar.denominator()),
    )
    .ok_or(MetadataError::ResolutionMissing)?;

    let rate = stream.avg_frame_rate();
    let fps = frame_rate(rate.numerator(), rate.denominator())
        .ok_or(MetadataError::FrameRateMissing)?;

    let meta = VideoMeta {
        duration,
        frame_count,
        display_ratio,
        fps,
    };
    debug!("Probed '{}': {:?}", path.display(), meta);
    Ok(meta)
}
