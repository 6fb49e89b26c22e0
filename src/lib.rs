//! Term Player - plays video files as truecolor terminal cells
//!
//! Frames are fitted to the terminal with the source aspect ratio, paced against
//! a single wall clock while the audio track plays in the background, and drawn
//! as rows of background-colored spaces.

pub mod audio;
pub mod cli;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod geometry;
pub mod metadata;
pub mod renderer;
pub mod session;

pub use audio::{
    AudioError, AudioSink, CpalSink, NullSink, OutputFormat, PcmBuffer, PlaybackHandle,
};
pub use cli::Cli;
pub use clock::{should_render, Clock, FrameCursor, RenderDecision, SystemClock};
pub use config::PlayerConfig;
pub use decoder::{decode_audio, FrameSource, PixelFrame, VideoDecoder};
pub use encoder::FrameEncoder;
pub use geometry::{resolve, DisplayRatio, GeometryResolver, TerminalSize, VideoGeometry};
pub use metadata::{probe, MetadataError, VideoMeta};
pub use renderer::{Renderer, Terminal};
pub use session::{format_time, play_file, PlaybackSession, SessionState, SessionSummary};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types used throughout the application
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Video decoding error: {0}")]
    VideoDecoding(#[from] ffmpeg_next::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Playback interrupted")]
    Interrupted,
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Utility functions
pub mod utils {
    /// Format duration in a human-readable way
    pub fn format_duration(seconds: f64) -> String {
        let total_seconds = seconds as u64;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{}:{:02}", minutes, secs)
        }
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        decode_audio, format_time, play_file, probe, resolve, should_render, utils::*, AudioSink,
        Cli, Clock, DisplayRatio, FrameEncoder, FrameSource, MetadataError, NullSink,
        OutputFormat, PcmBuffer, PixelFrame, PlaybackHandle, PlaybackSession, PlayerConfig,
        PlayerError, Renderer, Result, SessionState, SessionSummary, SystemClock, Terminal,
        TerminalSize, VideoDecoder, VideoGeometry, VideoMeta,
    };
}
