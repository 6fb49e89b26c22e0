use crate::audio::{OutputFormat, PcmBuffer};
use crate::{PlayerError, Result};
use ffmpeg_next as ffmpeg;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Decoded RGB frame in source resolution
#[derive(Debug, Clone)]
pub struct PixelFrame {
    /// Tightly packed RGB24 data, `width * height * 3` bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PixelFrame {
    /// Wrap packed RGB data, checking its length against the dimensions
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(PlayerError::InvalidFrame(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Frame filled with a single color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            data,
            width,
            height,
        }
    }

    /// RGB triple at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

/// Lazy, finite sequence of frames in presentation order.
///
/// `Ok(None)` is the normal end of the stream, `Err` is a decode fault.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<PixelFrame>>;
}

impl<F: FrameSource + ?Sized> FrameSource for Box<F> {
    fn next_frame(&mut self) -> Result<Option<PixelFrame>> {
        (**self).next_frame()
    }
}

pub(crate) fn init_ffmpeg() {
    match ffmpeg::init() {
        Ok(_) => debug!("FFmpeg initialized successfully"),
        Err(e) => debug!("FFmpeg init error: {:?}", e),
    }
}

/// Video decoder that extracts RGB frames from a media file
pub struct VideoDecoder {
    input_context: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    eof_sent: bool,
}

impl VideoDecoder {
    /// Open the best video stream of a file
    pub fn new(path: &Path) -> Result<Self> {
        init_ffmpeg();

        debug!("Opening video file: {}", path.display());
        let input_context = ffmpeg::format::input(&path)?;

        let stream = input_context
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| {
                PlayerError::Decode(format!("No video stream found in '{}'", path.display()))
            })?;
        let stream_index = stream.index();

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        info!(
            "Found video stream {} ({}x{}) in '{}'",
            stream_index,
            decoder.width(),
            decoder.height(),
            path.display()
        );

        Ok(Self {
            input_context,
            stream_index,
            decoder,
            scaler: None,
            eof_sent: false,
        })
    }

    /// Feed the decoder one more packet, or EOF once the container is drained
    fn feed(&mut self) -> Result<()> {
        let packet = self
            .input_context
            .packets()
            .next()
            .map(|(stream, packet)| (stream.index(), packet));

        match packet {
            Some((index, packet)) if index == self.stream_index => {
                self.decoder.send_packet(&packet)?;
            }
            Some(_) => {}
            None => {
                self.decoder.send_eof()?;
                self.eof_sent = true;
            }
        }
        Ok(())
    }

    /// Convert a decoded frame to packed RGB24
    fn convert_frame(&mut self, frame: &ffmpeg::frame::Video) -> Result<PixelFrame> {
        let width = frame.width();
        let height = frame.height();

        let stale = self
            .scaler
            .as_ref()
            .map(|s| s.input().width != width || s.input().height != height)
            .unwrap_or(true);
        if stale {
            self.scaler = Some(ffmpeg::software::scaling::Context::get(
                frame.format(),
                width,
                height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )?);
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if let Some(ref mut scaler) = self.scaler {
            scaler.run(frame, &mut rgb_frame)?;
        }

        // Rows may be padded past width * 3
        let stride = rgb_frame.stride(0);
        let row_bytes = width as usize * 3;
        let plane = rgb_frame.data(0);
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in plane.chunks(stride).take(height as usize) {
            data.extend_from_slice(&row[..row_bytes]);
        }

        PixelFrame::new(data, width, height)
    }
}

impl FrameSource for VideoDecoder {
    fn next_frame(&mut self) -> Result<Option<PixelFrame>> {
        let mut decoded_frame = ffmpeg::frame::Video::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(()) => return self.convert_frame(&decoded_frame).map(Some),
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::ffi::EAGAIN => {
                    if self.eof_sent {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(e.into()),
            }

            self.feed()?;
        }
    }
}

/// Decode the whole audio track of a file to packed signed 16-bit PCM.
///
/// With a `target` the samples are resampled to its channel count and rate,
/// otherwise the source format is kept. Returns `Ok(None)` when the file has no
/// audio stream and `PlayerError::Interrupted` once `interrupt` is set.
pub fn decode_audio(
    path: &Path,
    target: Option<OutputFormat>,
    interrupt: &AtomicBool,
) -> Result<Option<PcmBuffer>> {
    init_ffmpeg();

    let mut input_context = ffmpeg::format::input(&path)?;
    let stream = match input_context.streams().best(ffmpeg::media::Type::Audio) {
        Some(stream) => stream,
        None => {
            warn!("No audio stream in '{}', playing silently", path.display());
            return Ok(None);
        }
    };
    let stream_index = stream.index();

    let mut decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?
        .decoder()
        .audio()?;

    let source_rate = decoder.rate();
    let mut source_layout = decoder.channel_layout();
    if source_layout.is_empty() {
        source_layout = ffmpeg::ChannelLayout::default(i32::from(decoder.channels() as u16));
    }

    let target = target.unwrap_or(OutputFormat {
        channels: decoder.channels() as u16,
        sample_rate: source_rate,
    });
    let target_layout = ffmpeg::ChannelLayout::default(i32::from(target.channels));
    let target_sample = ffmpeg::format::Sample::I16(ffmpeg::format::sample::Type::Packed);

    let mut resampler = ffmpeg::software::resampling::Context::get(
        decoder.format(),
        source_layout,
        source_rate,
        target_sample,
        target_layout,
        target.sample_rate,
    )?;

    debug!(
        "Decoding audio stream {}: {} Hz -> {} channel(s) at {} Hz",
        stream_index, source_rate, target.channels, target.sample_rate
    );

    let mut pcm = PcmBuffer::new(Vec::new(), target.channels, 2, target.sample_rate);
    let mut decoded = ffmpeg::frame::Audio::empty();

    // Room for one converted frame plus whatever the resampler is holding back
    let capacity = |samples: usize| {
        samples * target.sample_rate as usize / source_rate.max(1) as usize + 1024
    };

    let mut drain = |decoder: &mut ffmpeg::decoder::Audio, pcm: &mut PcmBuffer| -> Result<()> {
        while decoder.receive_frame(&mut decoded).is_ok() {
            if decoded.channel_layout().is_empty() {
                decoded.set_channel_layout(source_layout);
            }
            let mut converted = ffmpeg::frame::Audio::new(
                target_sample,
                capacity(decoded.samples()),
                target_layout,
            );
            resampler.run(&decoded, &mut converted)?;
            append_packed(pcm, &converted);
        }
        Ok(())
    };

    for (stream, packet) in input_context.packets() {
        if interrupt.load(Ordering::SeqCst) {
            return Err(PlayerError::Interrupted);
        }
        if stream.index() == stream_index {
            decoder.send_packet(&packet)?;
            drain(&mut decoder, &mut pcm)?;
        }
    }
    decoder.send_eof()?;
    drain(&mut decoder, &mut pcm)?;

    loop {
        let mut tail = ffmpeg::frame::Audio::new(target_sample, capacity(0), target_layout);
        resampler.flush(&mut tail)?;
        if tail.samples() == 0 {
            break;
        }
        append_packed(&mut pcm, &tail);
    }

    info!(
        "Decoded {:.2}s of audio ({} bytes)",
        pcm.duration_secs(),
        pcm.data.len()
    );
    Ok(Some(pcm))
}

fn append_packed(pcm: &mut PcmBuffer, frame: &ffmpeg::frame::Audio) {
    let bytes = frame.samples() * usize::from(pcm.channels) * usize::from(pcm.sample_width);
    let plane = frame.data(0);
    pcm.data.extend_from_slice(&plane[..bytes.min(plane.len())]);
}
