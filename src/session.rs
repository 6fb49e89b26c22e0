//! Playback session: drives the frame loop against a shared clock.
//!
//! The session moves through `Idle -> Starting -> Playing -> Stopping -> Stopped`.
//! Terminal restoration and the audio stop run exactly once on the way to
//! `Stopped`, whichever way the loop ended.

use crate::audio::{AudioSink, CpalSink, NullSink, PcmBuffer, PlaybackHandle};
use crate::clock::{frame_duration, should_render, Clock, FrameCursor, SystemClock};
use crate::config::PlayerConfig;
use crate::decoder::{decode_audio, FrameSource, PixelFrame, VideoDecoder};
use crate::encoder::FrameEncoder;
use crate::geometry::GeometryResolver;
use crate::metadata::VideoMeta;
use crate::renderer::{Renderer, Terminal};
use crate::{PlayerError, Result};
use crossterm::{
    cursor::{MoveTo, MoveUp},
    queue,
    style::ResetColor,
    terminal::{Clear, ClearType},
};
use log::{debug, info, trace, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Playing,
    Stopping,
    Stopped,
}

/// Why playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Interrupted,
    Failed,
}

impl StopReason {
    fn from_outcome(outcome: &Result<()>) -> Self {
        match outcome {
            Ok(()) => StopReason::EndOfStream,
            Err(PlayerError::Interrupted) => StopReason::Interrupted,
            Err(_) => StopReason::Failed,
        }
    }

    /// An error stop leaves the screen alone so diagnostics stay visible
    fn clears_screen(self) -> bool {
        !matches!(self, StopReason::Failed)
    }
}

/// Playback statistics
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub frames_considered: u64,
    pub frames_rendered: u64,
    pub frames_dropped: u64,
    pub elapsed: Duration,
}

/// Format seconds as `MM:SS`, flooring both parts. Minutes are not capped.
pub fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor();
    let rest = (seconds - minutes * 60.0).floor();
    format!("{:02}:{:02}", minutes as u64, rest as u64)
}

/// Build the status line: centered `elapsed/total`, `FPS: x.xx` right-justified
/// into the remaining width.
pub fn status_line(elapsed: f64, duration: f64, fps: f64, width: usize) -> String {
    let time = format!("{}/{}", format_time(elapsed), format_time(duration));
    let mut line = format!("{:^width$}", time, width = width)
        .trim_end()
        .to_string();
    let fps = format!("FPS: {:.2}", fps);
    let remaining = width.saturating_sub(line.len());
    line.push_str(&format!("{:>remaining$}", fps, remaining = remaining));
    line
}

/// Orchestrates one playback of a video onto a terminal
pub struct PlaybackSession<S: FrameSource, T: Terminal, C: Clock> {
    source: S,
    terminal: T,
    clock: C,
    meta: VideoMeta,
    geometry: GeometryResolver,
    encoder: FrameEncoder,
    frame_duration: Duration,
    cursor: FrameCursor,
    state: SessionState,
    start_time: Duration,
    audio: Option<Box<dyn PlaybackHandle>>,
    interrupt: Arc<AtomicBool>,
    show_status: bool,
    frames_rendered: u64,
}

impl<S: FrameSource, T: Terminal, C: Clock> PlaybackSession<S, T, C> {
    /// Create a new idle session
    pub fn new(source: S, terminal: T, clock: C, meta: VideoMeta) -> Result<Self> {
        if !(meta.fps.is_finite() && meta.fps > 0.0) {
            return Err(PlayerError::InvalidConfig(format!(
                "Frame rate must be positive, got {}",
                meta.fps
            )));
        }

        Ok(Self {
            source,
            terminal,
            clock,
            geometry: GeometryResolver::new(meta.display_ratio),
            encoder: FrameEncoder::new(),
            frame_duration: frame_duration(meta.fps),
            meta,
            cursor: FrameCursor::default(),
            state: SessionState::Idle,
            start_time: Duration::ZERO,
            audio: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            show_status: true,
            frames_rendered: 0,
        })
    }

    /// Share an interrupt flag; setting it aborts the frame loop
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Enable or disable the status line (its row stays reserved either way)
    pub fn with_status_line(mut self, show: bool) -> Self {
        self.show_status = show;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    /// Play the whole video, starting `pcm` on `sink` alongside it
    pub fn run(&mut self, sink: &dyn AudioSink, pcm: Arc<PcmBuffer>) -> Result<SessionSummary> {
        let outcome = self.start(sink, pcm).and_then(|()| self.play_loop());
        let reason = StopReason::from_outcome(&outcome);
        self.stop(reason);

        let summary = self.summary();
        info!(
            "Playback ended ({:?}): {} rendered, {} dropped, {:.1}s",
            reason,
            summary.frames_rendered,
            summary.frames_dropped,
            summary.elapsed.as_secs_f64()
        );
        outcome.map(|()| summary)
    }

    pub fn summary(&self) -> SessionSummary {
        let considered = self.cursor.index();
        SessionSummary {
            frames_considered: considered,
            frames_rendered: self.frames_rendered,
            frames_dropped: considered - self.frames_rendered,
            elapsed: self.elapsed(),
        }
    }

    fn elapsed(&self) -> Duration {
        match self.state {
            SessionState::Idle => Duration::ZERO,
            _ => self.clock.now().saturating_sub(self.start_time),
        }
    }

    fn start(&mut self, sink: &dyn AudioSink, pcm: Arc<PcmBuffer>) -> Result<()> {
        self.state = SessionState::Starting;
        self.start_time = self.clock.now();

        self.terminal.hide_cursor()?;
        queue!(self.terminal, Clear(ClearType::All), MoveTo(0, 0))?;
        self.terminal.flush()?;

        self.audio = Some(sink.play(pcm)?);
        // Frame 0 is due when the audio is actually playing
        self.start_time = self.clock.now();
        self.state = SessionState::Playing;
        debug!("Playback started at {:.1} fps", self.meta.fps);
        Ok(())
    }

    fn play_loop(&mut self) -> Result<()> {
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return Err(PlayerError::Interrupted);
            }

            let frame = match self.source.next_frame()? {
                Some(frame) => frame,
                None => {
                    debug!("End of video stream");
                    return Ok(());
                }
            };

            self.present(&frame)?;
        }
    }

    /// Sleep-then-draw or drop one frame
    fn present(&mut self, frame: &PixelFrame) -> Result<()> {
        let geometry = self.geometry.resolve(self.terminal.size()?.pixel_space());
        let decision = should_render(
            self.cursor.index(),
            self.frame_duration,
            self.start_time,
            self.clock.now(),
        );

        if !decision.sleep.is_zero() {
            self.clock.sleep(decision.sleep);
        }
        self.cursor.advance();

        if !decision.render {
            trace!("Dropped frame {}", self.cursor.index() - 1);
            return Ok(());
        }
        if self.interrupt.load(Ordering::SeqCst) {
            return Err(PlayerError::Interrupted);
        }

        let lines = self.encoder.encode(frame, geometry)?;
        let rows = u16::try_from(geometry.video_height() + 1).unwrap_or(u16::MAX);
        queue!(self.terminal, MoveUp(rows))?;
        for line in &lines {
            self.terminal.write_all(line.as_bytes())?;
        }

        self.frames_rendered += 1;
        queue!(self.terminal, ResetColor)?;
        if self.show_status {
            let line = status_line(
                self.elapsed().as_secs_f64(),
                self.meta.duration,
                self.current_fps(),
                geometry.video_width() as usize,
            );
            self.terminal.write_all(line.as_bytes())?;
        }
        self.terminal.write_all(b"\n")?;
        self.terminal.flush()?;
        Ok(())
    }

    /// Presented frames per second, nominal rate until a second has passed
    fn current_fps(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            self.meta.fps
        } else {
            self.frames_rendered as f64 / elapsed
        }
    }

    /// Restore the terminal and stop audio. Runs once; later calls do nothing.
    fn stop(&mut self, reason: StopReason) {
        if matches!(self.state, SessionState::Idle | SessionState::Stopped) {
            return;
        }
        self.state = SessionState::Stopping;
        debug!("Stopping playback: {:?}", reason);

        if let Err(e) = self.restore_terminal(reason.clears_screen()) {
            warn!("Failed to restore terminal: {}", e);
        }

        if let Some(mut audio) = self.audio.take() {
            if let Err(e) = audio.stop() {
                warn!("Failed to stop audio playback: {}", e);
            }
        }

        self.state = SessionState::Stopped;
    }

    fn restore_terminal(&mut self, clear: bool) -> Result<()> {
        queue!(self.terminal, ResetColor)?;
        self.terminal.show_cursor()?;
        if clear {
            queue!(self.terminal, Clear(ClearType::All))?;
        }
        self.terminal.flush()?;
        Ok(())
    }
}

impl<S: FrameSource, T: Terminal, C: Clock> Drop for PlaybackSession<S, T, C> {
    fn drop(&mut self) {
        // Only reached with a live session if `run` unwound
        self.stop(StopReason::Failed);
    }
}

/// Play a media file on stdout with its audio track.
///
/// Audio is decoded fully, in the output device's format, before the terminal
/// is touched. `interrupt` aborts the decode, or playback after the terminal is
/// restored, with `PlayerError::Interrupted`.
pub fn play_file(
    path: &Path,
    meta: VideoMeta,
    config: &PlayerConfig,
    interrupt: Arc<AtomicBool>,
) -> Result<SessionSummary> {
    let audio = if config.audio {
        let sink = CpalSink::default_output()?;
        decode_audio(path, Some(sink.output_format()), &interrupt)?.map(|pcm| (sink, pcm))
    } else {
        None
    };

    let source = VideoDecoder::new(path)?;
    let mut session = PlaybackSession::new(source, Renderer::stdout(), SystemClock::new(), meta)?
        .with_interrupt(interrupt)
        .with_status_line(config.status_line);

    match audio {
        Some((sink, pcm)) => session.run(&sink, Arc::new(pcm)),
        None => session.run(&NullSink, Arc::new(PcmBuffer::new(Vec::new(), 0, 0, 0))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioError;
    use crate::geometry::{DisplayRatio, TerminalSize};
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::io::{self, Write};
    use std::rc::Rc;

    /// Clock that only moves when slept on or advanced by hand
    #[derive(Clone, Default)]
    struct ManualClock {
        now: Rc<Cell<Duration>>,
        step: Duration,
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            let now = self.now.get();
            self.now.set(now + self.step);
            now
        }

        fn sleep(&self, duration: Duration) {
            self.now.set(self.now.get() + duration);
        }
    }

    #[derive(Default)]
    struct MockTerminal {
        output: Vec<u8>,
        size: (u16, u16),
        hidden: u32,
        shown: u32,
        flushes: u32,
    }

    impl Write for MockTerminal {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    impl Terminal for MockTerminal {
        fn size(&self) -> io::Result<TerminalSize> {
            Ok(self.size.into())
        }

        fn hide_cursor(&mut self) -> io::Result<()> {
            self.hidden += 1;
            Ok(())
        }

        fn show_cursor(&mut self) -> io::Result<()> {
            self.shown += 1;
            Ok(())
        }
    }

    impl MockTerminal {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }
    }

    enum Item {
        Frame,
        Fault,
        Interrupt,
    }

    struct ScriptedSource {
        items: VecDeque<Item>,
        interrupt: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(items: Vec<Item>, interrupt: Arc<AtomicBool>) -> Self {
            Self {
                items: items.into(),
                interrupt,
            }
        }

        fn frames(count: usize) -> Vec<Item> {
            (0..count).map(|_| Item::Frame).collect()
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<PixelFrame>> {
            loop {
                match self.items.pop_front() {
                    Some(Item::Frame) => {
                        return Ok(Some(PixelFrame::solid(32, 18, [200, 100, 50])))
                    }
                    Some(Item::Fault) => {
                        return Err(PlayerError::Decode("corrupt packet".into()))
                    }
                    Some(Item::Interrupt) => self.interrupt.store(true, Ordering::SeqCst),
                    None => return Ok(None),
                }
            }
        }
    }

    #[derive(Default)]
    struct CountingSink {
        started: Rc<Cell<u32>>,
        stopped: Rc<Cell<u32>>,
    }

    struct CountingHandle(Rc<Cell<u32>>);

    impl PlaybackHandle for CountingHandle {
        fn stop(&mut self) -> std::result::Result<(), AudioError> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    impl AudioSink for CountingSink {
        fn play(
            &self,
            _pcm: Arc<PcmBuffer>,
        ) -> std::result::Result<Box<dyn PlaybackHandle>, AudioError> {
            self.started.set(self.started.get() + 1);
            Ok(Box::new(CountingHandle(Rc::clone(&self.stopped))))
        }
    }

    struct BrokenSink;

    impl AudioSink for BrokenSink {
        fn play(
            &self,
            _pcm: Arc<PcmBuffer>,
        ) -> std::result::Result<Box<dyn PlaybackHandle>, AudioError> {
            Err(AudioError::NoDevice)
        }
    }

    /// Sink whose stream takes a while to come up
    struct SlowSink {
        clock: ManualClock,
        startup: Duration,
    }

    impl AudioSink for SlowSink {
        fn play(
            &self,
            _pcm: Arc<PcmBuffer>,
        ) -> std::result::Result<Box<dyn PlaybackHandle>, AudioError> {
            self.clock.sleep(self.startup);
            Ok(Box::new(CountingHandle(Rc::new(Cell::new(0)))))
        }
    }

    fn meta() -> VideoMeta {
        VideoMeta {
            duration: 75.0,
            frame_count: 3,
            display_ratio: DisplayRatio::new(16, 9),
            fps: 25.0,
        }
    }

    fn pcm() -> Arc<PcmBuffer> {
        Arc::new(PcmBuffer::new(vec![0; 16], 2, 2, 44_100))
    }

    fn session(
        items: Vec<Item>,
        clock: ManualClock,
    ) -> PlaybackSession<ScriptedSource, MockTerminal, ManualClock> {
        let interrupt = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource::new(items, Arc::clone(&interrupt));
        let terminal = MockTerminal {
            size: (32, 10),
            ..Default::default()
        };
        PlaybackSession::new(source, terminal, clock, meta())
            .unwrap()
            .with_interrupt(interrupt)
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00");
        assert_eq!(format_time(75.0), "01:15");
        assert_eq!(format_time(3661.0), "61:01");
        assert_eq!(format_time(59.99), "00:59");
    }

    #[test]
    fn test_status_line_layout() {
        let line = status_line(75.0, 130.0, 25.0, 40);
        assert_eq!(line.len(), 40);
        assert!(line.trim_start().starts_with("01:15/02:10"));
        assert!(line.ends_with("FPS: 25.00"));

        // Narrow widths never truncate
        assert_eq!(status_line(0.0, 0.0, 30.0, 4), "00:00/00:00FPS: 30.00");
    }

    #[test]
    fn test_end_of_stream_teardown() {
        let sink = CountingSink::default();
        let mut session = session(ScriptedSource::frames(3), ManualClock::default());

        let summary = session.run(&sink, pcm()).unwrap();

        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(summary.frames_considered, 3);
        assert_eq!(sink.started.get(), 1);
        assert_eq!(sink.stopped.get(), 1);
        let terminal = session.terminal();
        assert_eq!(terminal.hidden, 1);
        assert_eq!(terminal.shown, 1);
        assert!(terminal.text().ends_with("\x1b[0m\x1b[2J"));
    }

    #[test]
    fn test_interrupt_teardown_clears_and_propagates() {
        let sink = CountingSink::default();
        let items = vec![Item::Frame, Item::Interrupt, Item::Frame];
        let mut session = session(items, ManualClock::default());

        let result = session.run(&sink, pcm());

        assert!(matches!(result, Err(PlayerError::Interrupted)));
        assert_eq!(sink.stopped.get(), 1);
        assert_eq!(session.terminal().shown, 1);
        assert!(session.terminal().text().ends_with("\x1b[2J"));
    }

    #[test]
    fn test_error_teardown_keeps_screen() {
        let sink = CountingSink::default();
        let items = vec![Item::Frame, Item::Fault, Item::Frame];
        let mut session = session(items, ManualClock::default());

        let result = session.run(&sink, pcm());

        assert!(matches!(result, Err(PlayerError::Decode(_))));
        assert_eq!(sink.stopped.get(), 1);
        assert_eq!(session.terminal().shown, 1);
        assert!(session.terminal().text().ends_with("\x1b[0m"));
    }

    #[test]
    fn test_teardown_runs_once_even_when_dropped() {
        let sink = CountingSink::default();
        let stopped = Rc::clone(&sink.stopped);
        {
            let mut session = session(ScriptedSource::frames(1), ManualClock::default());
            session.run(&sink, pcm()).unwrap();
        }
        assert_eq!(stopped.get(), 1);
    }

    #[test]
    fn test_audio_failure_restores_terminal() {
        let mut session = session(ScriptedSource::frames(1), ManualClock::default());

        let result = session.run(&BrokenSink, pcm());

        assert!(matches!(result, Err(PlayerError::Audio(AudioError::NoDevice))));
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.terminal().hidden, 1);
        assert_eq!(session.terminal().shown, 1);
    }

    #[test]
    fn test_on_schedule_frames_are_rendered() {
        // Each clock read costs 1ms, so frames after the first are ahead of schedule
        let clock = ManualClock {
            step: Duration::from_millis(1),
            ..Default::default()
        };
        let mut session = session(ScriptedSource::frames(4), clock);

        let summary = session.run(&NullSink, pcm()).unwrap();

        assert_eq!(summary.frames_considered, 4);
        // Frame 0 is always due on arrival
        assert_eq!(summary.frames_dropped, 1);
        assert_eq!(summary.frames_rendered, 3);

        let text = session.terminal().text();
        // 32x10 terminal resolves to 16x9: 32 pixel columns, 8 rows + status
        assert_eq!(text.matches("\x1b[9A").count(), 3);
        assert_eq!(text.matches("\x1b[0m\n").count(), 3 * 8);
        assert!(text.contains("FPS: 25.00"));
    }

    #[test]
    fn test_late_frames_are_dropped() {
        // Every clock read jumps a full second, so the schedule is never met
        let clock = ManualClock {
            step: Duration::from_secs(1),
            ..Default::default()
        };
        let mut session = session(ScriptedSource::frames(5), clock);

        let summary = session.run(&NullSink, pcm()).unwrap();

        assert_eq!(summary.frames_considered, 5);
        assert_eq!(summary.frames_rendered, 0);
        assert!(!session.terminal().text().contains("\x1b[48;2"));
    }

    #[test]
    fn test_status_line_can_be_hidden() {
        let clock = ManualClock {
            step: Duration::from_millis(1),
            ..Default::default()
        };
        let mut session = session(ScriptedSource::frames(2), clock).with_status_line(false);

        session.run(&NullSink, pcm()).unwrap();

        assert!(!session.terminal().text().contains("FPS"));
    }

    #[test]
    fn test_rejects_non_positive_fps() {
        let interrupt = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource::new(Vec::new(), interrupt);
        let meta = VideoMeta { fps: 0.0, ..meta() };
        let session =
            PlaybackSession::new(source, MockTerminal::default(), ManualClock::default(), meta);
        assert!(session.is_err());
    }

    #[test]
    fn test_schedule_starts_when_audio_is_playing() {
        let clock = ManualClock::default();
        let sink = SlowSink {
            clock: clock.clone(),
            startup: Duration::from_millis(500),
        };
        let mut session = session(ScriptedSource::frames(25), clock);

        let summary = session.run(&sink, pcm()).unwrap();

        assert_eq!(summary.frames_considered, 25);
        // Only frame 0, due the instant audio starts, is dropped
        assert_eq!(summary.frames_dropped, 1);
        assert_eq!(summary.frames_rendered, 24);
    }
}
