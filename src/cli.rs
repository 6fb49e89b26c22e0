use crate::config::PlayerConfig;
use crate::geometry::DisplayRatio;
use crate::metadata::parse_aspect_ratio;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the video file to play
    #[arg(long = "mp4-file", value_name = "PATH")]
    pub mp4_file: PathBuf,

    /// JSON configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Play video only, without the audio track
    #[arg(long)]
    pub no_audio: bool,

    /// Hide the elapsed time / FPS status line
    #[arg(long)]
    pub no_status: bool,

    /// Override the display aspect ratio (e.g. 4:3)
    #[arg(long, value_name = "W:H", value_parser = parse_ratio_arg)]
    pub aspect: Option<DisplayRatio>,

    /// Show video information only (don't play)
    #[arg(long)]
    pub info_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_ratio_arg(value: &str) -> Result<DisplayRatio, String> {
    parse_aspect_ratio(value).ok_or_else(|| format!("'{}' is not a W:H ratio", value))
}

impl Cli {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<(), String> {
        if !self.mp4_file.exists() {
            return Err(format!(
                "Video file does not exist: {}",
                self.mp4_file.display()
            ));
        }

        if !self.mp4_file.is_file() {
            return Err(format!("Not a file: {}", self.mp4_file.display()));
        }

        if let Some(config) = &self.config {
            if !config.is_file() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        Ok(())
    }

    /// Apply command line overrides on top of a loaded configuration
    pub fn apply_to(&self, mut config: PlayerConfig) -> PlayerConfig {
        if self.no_audio {
            config.audio = false;
        }
        if self.no_status {
            config.status_line = false;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_mp4_file() {
        assert!(Cli::try_parse_from(["term-player"]).is_err());

        let cli = Cli::try_parse_from(["term-player", "--mp4-file", "movie.mp4"]).unwrap();
        assert_eq!(cli.mp4_file, PathBuf::from("movie.mp4"));
        assert!(!cli.no_audio);
        assert!(cli.aspect.is_none());
    }

    #[test]
    fn test_aspect_override() {
        let cli =
            Cli::try_parse_from(["term-player", "--mp4-file", "a.mp4", "--aspect", "4:3"]).unwrap();
        assert_eq!(cli.aspect, Some(DisplayRatio::new(4, 3)));

        let wide = Cli::try_parse_from(["term-player", "--mp4-file", "a.mp4", "--aspect", "wide"]);
        assert!(wide.is_err());
    }

    #[test]
    fn test_validate_missing_file() {
        let cli = Cli::try_parse_from(["term-player", "--mp4-file", "nonexistent.mp4"]).unwrap();
        let err = cli.validate().unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "term-player",
            "--mp4-file",
            "a.mp4",
            "--no-audio",
            "--no-status",
        ])
        .unwrap();
        let config = cli.apply_to(PlayerConfig::default());
        assert!(!config.audio);
        assert!(!config.status_line);
    }
}
