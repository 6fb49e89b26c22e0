use log::trace;

/// Display aspect ratio as reported by the media source (not necessarily reduced)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRatio {
    pub width: u32,
    pub height: u32,
}

impl DisplayRatio {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Terminal size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub columns: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }

    /// Space left for two-column pixels: half the columns, all the rows
    pub fn pixel_space(self) -> Self {
        Self {
            columns: self.columns / 2,
            rows: self.rows,
        }
    }
}

impl From<(u16, u16)> for TerminalSize {
    fn from((columns, rows): (u16, u16)) -> Self {
        Self { columns, rows }
    }
}

/// Resolved display box in terminal cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoGeometry {
    pub width: u16,
    pub height: u16,
}

impl VideoGeometry {
    /// Pixel columns of the resized frame. Two cells make one roughly square pixel.
    pub fn video_width(&self) -> u32 {
        u32::from(self.width) * 2
    }

    /// Pixel rows of the resized frame. The last terminal row holds the status line.
    pub fn video_height(&self) -> u32 {
        u32::from(self.height).saturating_sub(1).max(1)
    }
}

/// Compute the largest box that fits the terminal with exactly the given ratio.
///
/// Width and height are each snapped down to a multiple of their ratio component
/// and the side that is "ahead" is shrunk by one until both sides describe the same
/// number of ratio units. If no exact match exists before a side reaches zero, the
/// terminal size is returned unchanged.
pub fn resolve(ratio: DisplayRatio, terminal: TerminalSize) -> VideoGeometry {
    let fallback = VideoGeometry {
        width: terminal.columns.max(1),
        height: terminal.rows.max(1),
    };

    if ratio.width == 0 || ratio.height == 0 {
        return fallback;
    }

    let mut width = u32::from(terminal.columns);
    let mut height = u32::from(terminal.rows);

    while width > 0 && height > 0 {
        width -= width % ratio.width;
        height -= height % ratio.height;
        if width == 0 || height == 0 {
            break;
        }

        let width_units = width / ratio.width;
        let height_units = height / ratio.height;
        if width_units == height_units {
            // Both values are bounded by the u16 terminal size.
            return VideoGeometry {
                width: width as u16,
                height: height as u16,
            };
        }

        if width_units > height_units {
            width -= 1;
        } else {
            height -= 1;
        }
    }

    trace!(
        "No exact {}:{} fit in {}x{}, using full terminal",
        ratio.width,
        ratio.height,
        terminal.columns,
        terminal.rows
    );
    fallback
}

/// Geometry resolver that only recomputes when the terminal size changes
#[derive(Debug, Clone)]
pub struct GeometryResolver {
    ratio: DisplayRatio,
    cached: Option<(TerminalSize, VideoGeometry)>,
}

impl GeometryResolver {
    pub fn new(ratio: DisplayRatio) -> Self {
        Self { ratio, cached: None }
    }

    /// Resolve geometry for the current terminal size
    pub fn resolve(&mut self, terminal: TerminalSize) -> VideoGeometry {
        match self.cached {
            Some((size, geometry)) if size == terminal => geometry,
            _ => {
                let geometry = resolve(self.ratio, terminal);
                trace!(
                    "Terminal {}x{} -> video box {}x{}",
                    terminal.columns,
                    terminal.rows,
                    geometry.width,
                    geometry.height
                );
                self.cached = Some((terminal, geometry));
                geometry
            }
        }
    }
}
