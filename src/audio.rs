//! Background audio playback.
//!
//! Audio is started once before the first frame and stopped once on the way out.
//! The video loop never reads the audio position; it chases the wall clock instead.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error type for audio playback
#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("No audio output device available")]
    NoDevice,

    #[error("Unsupported sample width: {0} bytes")]
    UnsupportedSampleWidth(u16),

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("cpal default config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("cpal build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("cpal play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("cpal pause stream error: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),
}

/// Channel count and rate an output device plays at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

/// Raw interleaved PCM plus its format
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub data: Vec<u8>,
    pub channels: u16,
    /// Bytes per sample
    pub sample_width: u16,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(data: Vec<u8>, channels: u16, sample_width: u16, sample_rate: u32) -> Self {
        Self {
            data,
            channels,
            sample_width,
            sample_rate,
        }
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        let frame_bytes = usize::from(self.channels) * usize::from(self.sample_width);
        if frame_bytes == 0 {
            0
        } else {
            self.data.len() / frame_bytes
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Normalized interleaved sample at `index`, `None` past the end.
    ///
    /// 1-byte samples are unsigned, wider ones are signed little-endian.
    pub fn sample(&self, index: usize) -> Option<f32> {
        let width = usize::from(self.sample_width);
        let start = index.checked_mul(width)?;
        match self.data.get(start..start.checked_add(width)?)? {
            [b] => Some((f32::from(*b) - 128.0) / 128.0),
            [a, b] => Some(f32::from(i16::from_le_bytes([*a, *b])) / 32768.0),
            [a, b, c, d] => Some(i32::from_le_bytes([*a, *b, *c, *d]) as f32 / 2_147_483_648.0),
            _ => None,
        }
    }

    /// Check the buffer can be played as-is on a device with `format`
    pub fn check_format(&self, format: OutputFormat) -> Result<(), AudioError> {
        if !matches!(self.sample_width, 1 | 2 | 4) {
            return Err(AudioError::UnsupportedSampleWidth(self.sample_width));
        }
        if self.channels != format.channels || self.sample_rate != format.sample_rate {
            return Err(AudioError::InvalidFormat(format!(
                "{} channel(s) at {} Hz, device expects {} channel(s) at {} Hz",
                self.channels, self.sample_rate, format.channels, format.sample_rate
            )));
        }
        Ok(())
    }
}

/// Handle to audio playing in the background
pub trait PlaybackHandle {
    /// Stop playback. Calling it again after the first stop does nothing.
    fn stop(&mut self) -> Result<(), AudioError>;
}

/// Something that can start asynchronous playback of a PCM buffer.
///
/// `play` returns once the audio is actually playing.
pub trait AudioSink {
    fn play(&self, pcm: Arc<PcmBuffer>) -> Result<Box<dyn PlaybackHandle>, AudioError>;
}

/// Sink that plays nothing, used when audio is disabled or absent
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

struct NullPlayback;

impl PlaybackHandle for NullPlayback {
    fn stop(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

impl AudioSink for NullSink {
    fn play(&self, _pcm: Arc<PcmBuffer>) -> Result<Box<dyn PlaybackHandle>, AudioError> {
        debug!("Audio disabled, skipping playback");
        Ok(Box::new(NullPlayback))
    }
}

/// Sink on the default cpal output device, in the device's default format
pub struct CpalSink {
    device: cpal::Device,
    config: cpal::StreamConfig,
}

impl CpalSink {
    /// Open the default output device and read its preferred format
    pub fn default_output() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let config = cpal::StreamConfig::from(device.default_output_config()?);
        debug!(
            "Audio device: {} channel(s) at {} Hz",
            config.channels, config.sample_rate.0
        );
        Ok(Self { device, config })
    }

    /// Format PCM must be decoded to before it is handed to `play`
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat {
            channels: self.config.channels,
            sample_rate: self.config.sample_rate.0,
        }
    }
}

/// Running cpal stream. Dropping the stream ends playback.
pub struct CpalPlayback {
    stream: Option<cpal::Stream>,
    stopped: Arc<AtomicBool>,
}

impl PlaybackHandle for CpalPlayback {
    fn stop(&mut self) -> Result<(), AudioError> {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(stream) = self.stream.take() {
            let paused = stream.pause();
            drop(stream);
            paused?;
            debug!("Audio stream stopped");
        }
        Ok(())
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl AudioSink for CpalSink {
    fn play(&self, pcm: Arc<PcmBuffer>) -> Result<Box<dyn PlaybackHandle>, AudioError> {
        pcm.check_format(self.output_format())?;

        let stopped = Arc::new(AtomicBool::new(false));
        let callback_stopped = Arc::clone(&stopped);
        let callback_pcm = Arc::clone(&pcm);
        let mut position = 0usize;

        // Samples are converted as the device asks for them
        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if callback_stopped.load(Ordering::Relaxed) {
                    data.fill(0.0);
                    return;
                }
                for slot in data.iter_mut() {
                    *slot = match callback_pcm.sample(position) {
                        Some(sample) => {
                            position += 1;
                            sample
                        }
                        None => 0.0,
                    };
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )?;
        stream.play()?;

        debug!(
            "Audio playback started: {} channel(s) at {} Hz, {:.2}s",
            pcm.channels,
            pcm.sample_rate,
            pcm.duration_secs()
        );

        Ok(Box::new(CpalPlayback {
            stream: Some(stream),
            stopped,
        }))
    }
}
