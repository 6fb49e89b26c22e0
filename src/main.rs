use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use term_player::{play_file, probe, Cli, PlayerConfig, PlayerError};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let cli = Cli::parse();

    // Validate CLI arguments
    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    // Set up logging level
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    info!("Starting Term Player v{}", term_player::VERSION);

    let config = match &cli.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    let config = cli.apply_to(config);

    // Metadata problems are fatal before the terminal is touched
    let mut meta = probe(&cli.mp4_file)
        .with_context(|| format!("Failed to read metadata of {}", cli.mp4_file.display()))?;
    if let Some(aspect) = cli.aspect {
        meta.display_ratio = aspect;
    }

    if cli.info_only {
        println!("Video Information:");
        println!("  File: {}", cli.mp4_file.display());
        println!(
            "  Aspect Ratio: {}:{}",
            meta.display_ratio.width, meta.display_ratio.height
        );
        println!("  Frame Rate: {:.2} FPS", meta.fps);
        println!("  Frames: {}", meta.frame_count);
        println!(
            "  Duration: {} ({:.2} seconds)",
            term_player::utils::format_duration(meta.duration),
            meta.duration
        );
        return Ok(());
    }

    if !atty::is(atty::Stream::Stdout) {
        warn!("stdout is not a terminal, output will be raw escape sequences");
    }

    info!("Playing: {}", cli.mp4_file.display());

    let interrupt = Arc::new(AtomicBool::new(false));
    let path = cli.mp4_file.clone();
    let flag = Arc::clone(&interrupt);
    let mut playback =
        tokio::task::spawn_blocking(move || play_file(&path, meta, &config, flag));

    let outcome = tokio::select! {
        joined = &mut playback => joined,
        _ = tokio::signal::ctrl_c() => {
            interrupt.store(true, Ordering::SeqCst);
            playback.await
        }
    }
    .context("Playback task panicked")?;

    match outcome {
        Ok(summary) => {
            info!(
                "Playback finished. Rendered {} of {} frames",
                summary.frames_rendered, summary.frames_considered
            );
            Ok(())
        }
        Err(PlayerError::Interrupted) => {
            info!("Playback interrupted");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
