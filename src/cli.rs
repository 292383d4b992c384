use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::effect::EffectMode;

#[derive(Parser, Debug)]
#[command(name = "bassquake", about = "Shake video frames in time with the bass")]
pub struct Cli {
    /// Config file (defaults to ./bassquake.toml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play the video's audio once and list the detected bass hits
    Detect(DetectArgs),
    /// Detect hits, then re-render the video with the shake baked in
    Export(ExportArgs),
}

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Input video file
    pub input: PathBuf,

    /// Shake mode used for the live pass
    #[arg(long, value_enum)]
    pub mode: Option<EffectMode>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Seed for the shake jitter
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Input video file
    pub input: PathBuf,

    /// Output video file
    #[arg(short, long, default_value = "shaken.mp4")]
    pub output: PathBuf,

    /// Shake mode baked into the export
    #[arg(long, value_enum)]
    pub mode: Option<EffectMode>,

    /// Seed for the shake jitter (same seed, same export)
    #[arg(long)]
    pub seed: Option<u64>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_defaults() {
        let cli = Cli::parse_from(["bassquake", "export", "clip.mp4"]);
        let Command::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.output, PathBuf::from("shaken.mp4"));
        assert_eq!(args.crf, 18);
        assert_eq!(args.mode, None);
        assert!(cli.config.is_none());
    }

    #[test]
    fn detect_flags() {
        let cli = Cli::parse_from([
            "bassquake", "detect", "clip.mp4", "--mode", "continuous", "--json", "-c", "my.toml",
        ]);
        let Command::Detect(args) = cli.command else {
            panic!("expected detect");
        };
        assert_eq!(args.mode, Some(EffectMode::Continuous));
        assert!(args.json);
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
    }
}
