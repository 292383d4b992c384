mod audio;
mod cli;
mod clock;
mod config;
mod detect;
mod effect;
mod encode;
mod error;
mod export;
mod media;
mod render;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;

use audio::spectrum::AnalyserSampler;
use cli::{Cli, Command, DetectArgs, ExportArgs};
use clock::ScriptedClock;
use config::{Config, EffectConfig};
use detect::ledger::BassHit;
use effect::EffectMode;
use encode::{EncoderSettings, FfmpegEncoder, RecordingSpec};
use error::MediaError;
use export::ExportPipeline;
use media::frames::FfmpegFrameReader;
use media::player::OfflinePlayer;
use media::MediaInfo;
use session::{run_detection_pass, PassReport, Session};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = load_settings(cli.config.as_deref());

    match cli.command {
        Command::Detect(args) => detect(args, config),
        Command::Export(args) => export(args, config),
    }
}

/// Explicit --config path, or auto-detect bassquake.toml / global config.
fn load_settings(explicit: Option<&Path>) -> Config {
    let Some(path) = config::resolve_config_path(explicit) else {
        return Config::default();
    };
    match config::load_config(&path) {
        Some(cfg) => {
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => {
            log::warn!("Failed to load config from {}", path.display());
            Config::default()
        }
    }
}

#[derive(Serialize)]
struct DetectSummary<'a> {
    input: &'a Path,
    duration: f64,
    fps: f64,
    mode: EffectMode,
    report: &'a PassReport,
    hits: Vec<&'a BassHit>,
}

fn detect(args: DetectArgs, config: Config) -> Result<()> {
    let effect = EffectConfig {
        mode: args.mode.unwrap_or(config.effect.mode),
        seed: args.seed.or(config.effect.seed),
    };
    let (info, mut session) = open_session(&args.input, &config, &effect)?;
    if !session.detection_enabled() {
        anyhow::bail!("No usable audio track in {}; nothing to detect", args.input.display());
    }

    let report = detection_pass(&mut session, &info)?;

    if args.json {
        let summary = DetectSummary {
            input: &args.input,
            duration: info.duration,
            fps: info.fps,
            mode: effect.mode,
            report: &report,
            hits: session.ledger().iter().collect(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{} bass hits in {}:", report.hits, args.input.display());
        for hit in session.ledger().iter() {
            println!("  {:>9.3}s", hit.time);
        }
        println!(
            "{} of {} frames shaken ({:?} mode)",
            report.shaken_frames, report.frames, effect.mode
        );
    }
    Ok(())
}

fn export(mut args: ExportArgs, config: Config) -> Result<()> {
    // Merge: config values apply only when CLI is at its default
    if args.codec == "libx264" { args.codec = config.output.codec.clone(); }
    if args.pix_fmt == "yuv420p" { args.pix_fmt = config.output.pix_fmt.clone(); }
    if args.crf == 18 { args.crf = config.output.crf; }
    if args.bitrate.is_none() { args.bitrate = config.output.bitrate.clone(); }

    let effect = EffectConfig {
        mode: args.mode.unwrap_or(config.effect.mode),
        seed: args.seed.or(config.effect.seed),
    };

    log::info!("bassquake - bass-synced shake export");
    log::info!("Input: {}", args.input.display());
    log::info!("Output: {}", args.output.display());
    log::info!("Mode: {:?}", effect.mode);

    let (info, mut session) = open_session(&args.input, &config, &effect)?;
    detection_pass(&mut session, &info)?;

    let spec = RecordingSpec {
        output: args.output.clone(),
        width: info.width,
        height: info.height,
        fps: info.fps,
        audio_source: info.has_audio.then(|| args.input.clone()),
    };
    let mut encoder = FfmpegEncoder::new(EncoderSettings {
        codec: args.codec,
        pix_fmt: args.pix_fmt,
        crf: args.crf,
        bitrate: args.bitrate,
        audio_bitrate: config.output.audio_bitrate.clone(),
    });
    let mut player = OfflinePlayer::new(FfmpegFrameReader::new(&args.input, &info), &info);

    let pb = frame_progress(&info);
    let mut pipeline = ExportPipeline::new().with_progress(pb.clone());
    let outcome = pipeline
        .run(&mut player, &mut encoder, &mut session, &spec)
        .with_context(|| format!("Export of {} failed", args.input.display()))?;
    pb.finish_with_message("Export complete");

    log::info!(
        "Done! Output: {} ({} frames, {} shaken, audio={})",
        outcome.artifact.path.display(),
        outcome.frames,
        outcome.shaken_frames,
        outcome.artifact.has_audio
    );
    Ok(())
}

/// Probe the input and load its audio into a fresh session. A file that
/// cannot be opened is an error; a file whose audio cannot be analysed
/// yields a session with detection disabled.
fn open_session(
    input: &Path,
    config: &Config,
    effect: &EffectConfig,
) -> Result<(MediaInfo, Session<AnalyserSampler>)> {
    let info = media::probe::probe(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;

    let sampler = if info.has_audio {
        log::info!("Decoding audio...");
        match audio::decode::decode_audio(input) {
            Ok(audio) => Some(AnalyserSampler::new(audio, &config.analyser)),
            Err(e @ MediaError::SourceUnavailable { .. }) => {
                return Err(e).with_context(|| format!("Failed to open {}", input.display()));
            }
            Err(e) => {
                log::warn!("Audio pipeline setup failed: {}", e);
                None
            }
        }
    } else {
        log::warn!("{} has no audio stream", input.display());
        None
    };

    let mut session = Session::new(effect);
    session.load(sampler);
    Ok((info, session))
}

/// Detection only needs media time, so the pass runs on a frameless clock
/// at the video's frame rate.
fn detection_pass(session: &mut Session<AnalyserSampler>, info: &MediaInfo) -> Result<PassReport> {
    if !session.detection_enabled() {
        return Ok(PassReport::default());
    }
    log::info!("Detecting bass hits...");
    let pb = frame_progress(info);
    let mut clock = ScriptedClock::playing(0.0, info.duration, info.fps);
    let report = run_detection_pass(session, &mut clock, Some(&pb)).context("Detection pass failed")?;
    pb.finish_with_message("Detection complete");
    Ok(report)
}

fn frame_progress(info: &MediaInfo) -> ProgressBar {
    let total_frames = (info.duration * info.fps).round() as u64;
    let pb = ProgressBar::new(total_frames);
    match ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
    {
        Ok(style) => pb.set_style(style.progress_chars("=>-")),
        Err(e) => log::debug!("Progress template rejected: {}", e),
    }
    pb
}
