use crate::geometry::TerminalSize;
use crossterm::{
    cursor::{Hide, Show},
    queue,
};
use log::debug;
use std::io::{self, stdout, BufWriter, Stdout, Write};

/// Output device the playback session draws on
pub trait Terminal: Write {
    /// Current size in character cells
    fn size(&self) -> io::Result<TerminalSize>;

    fn hide_cursor(&mut self) -> io::Result<()>;

    fn show_cursor(&mut self) -> io::Result<()>;
}

/// Buffered crossterm terminal. Nothing reaches the device until `flush`.
pub struct Renderer<W: Write = Stdout> {
    out: BufWriter<W>,
}

impl Renderer<Stdout> {
    /// Renderer on the process stdout
    pub fn stdout() -> Self {
        Self::new(stdout())
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: BufWriter::with_capacity(1 << 17, out),
        }
    }

    /// Get the underlying writer
    pub fn get_ref(&self) -> &W {
        self.out.get_ref()
    }
}

impl<W: Write> Write for Renderer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.out.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<W: Write> Terminal for Renderer<W> {
    fn size(&self) -> io::Result<TerminalSize> {
        let (columns, rows) = crossterm::terminal::size()?;
        Ok(TerminalSize::new(columns, rows))
    }

    fn hide_cursor(&mut self) -> io::Result<()> {
        queue!(self.out, Hide)?;
        debug!("Cursor hidden");
        Ok(())
    }

    fn show_cursor(&mut self) -> io::Result<()> {
        queue!(self.out, Show)?;
        debug!("Cursor shown");
        Ok(())
    }
}
