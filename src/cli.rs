use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clipgif")]
#[command(author, version, about = "Convert video clips into animated GIFs")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a video file into an animated GIF
    Convert(ConvertArgs),

    /// Start the web server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input video file
    pub input: PathBuf,

    /// Output GIF file
    pub output: PathBuf,

    /// Output width in pixels; smaller sources are not upscaled [default: 480]
    #[arg(long)]
    pub width: Option<u32>,

    /// Output frame rate [default: 10]
    #[arg(long)]
    pub fps: Option<u32>,

    /// Trim start, seconds or HH:MM:SS[.fff]
    #[arg(long)]
    pub start: Option<String>,

    /// Trim duration, seconds or HH:MM:SS[.fff]
    #[arg(long)]
    pub duration: Option<String>,

    /// 0 loops forever, 1 plays once more then stops [default: 0]
    #[arg(long = "loop", value_parser = clap::value_parser!(u8).range(0..=1))]
    pub loop_mode: Option<u8>,

    /// Replace the output file if it exists
    #[arg(long)]
    pub overwrite: bool,
}
