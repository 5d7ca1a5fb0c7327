use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use vencoder_core::capabilities::{check_version, probe_codecs, probe_pixel_formats};
use vencoder_core::config::{load_config, validate_config, OverwritePolicy, VencoderConfig};
use vencoder_core::convert::{plan_conversions, PlanOptions, Prompt};
use vencoder_core::jobs::{clear_queue, load_queue, save_queue, JobStatus, JsonFileStore};
use vencoder_core::params::{ParamPatch, Stage};
use vencoder_core::runner::{
    play_file, run_batch, BatchSummary, CancelHandle, ProcessEvent, RunOptions, TracingNotifier,
};
use vencoder_core::scan::collect_inputs;
use vencoder_core::Session;

#[derive(Parser, Debug)]
#[command(name = "vencoder")]
#[command(about = "Build ffmpeg commands and run conversions", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// ffmpeg binary, overriding the configuration
    #[arg(long, value_name = "PATH", global = true)]
    ffmpeg: Option<String>,

    /// ffprobe binary, overriding the configuration
    #[arg(long, value_name = "PATH", global = true)]
    ffprobe: Option<String>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the video and audio codecs ffmpeg can encode
    Codecs {
        /// Show every video codec, not only the common ones
        #[arg(long)]
        all: bool,
    },
    /// List the pixel formats ffmpeg can output
    PixFmts,
    /// Print the command the given settings produce
    Command(EncodeArgs),
    /// Convert files or directories with the given settings
    Convert {
        #[command(flatten)]
        encode: EncodeArgs,

        /// Directory converted files are written to
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// What to do when an output file exists
        #[arg(long, value_enum)]
        overwrite: Option<OverwriteArg>,

        /// Maximum number of conversions running at once
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Only queue the conversions; run them later with `resume`
        #[arg(long)]
        queue_only: bool,

        /// Open the log of a failed conversion
        #[arg(long)]
        open_logs: bool,

        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Run the conversions left in the queue
    Resume {
        /// Maximum number of conversions running at once
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Open the log of a failed conversion
        #[arg(long)]
        open_logs: bool,
    },
    /// Play a file with ffplay or the system's default player
    Preview {
        /// Use the system's default player even when ffplay is configured
        #[arg(long)]
        system_player: bool,

        file: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct EncodeArgs {
    /// Target video codec
    #[arg(long, default_value = "h264")]
    codec: String,

    /// Encoder for the codec; defaults to the codec's first encoder
    #[arg(long)]
    encoder: Option<String>,

    /// Rate control mode of the encoder (e.g. crf, 2pass, vbr-cq, icq)
    #[arg(long)]
    mode: Option<String>,

    /// Video bitrate in kbit/s
    #[arg(long, value_name = "KBPS")]
    bitrate: Option<u32>,

    /// Quality value of the current mode (CRF, QP, CQ...)
    #[arg(long)]
    quality: Option<u32>,

    /// Two-pass encode for encoders without their own rate control modes
    #[arg(long)]
    twopass: bool,

    /// Audio codec; the stream is copied when unset
    #[arg(long)]
    acodec: Option<String>,

    /// Audio bitrate in kbit/s
    #[arg(long, value_name = "KBPS")]
    abitrate: Option<u32>,

    #[arg(long, allow_negative_numbers = true)]
    preset: Option<String>,

    #[arg(long)]
    speed: Option<u32>,

    /// Hardware acceleration method for decoding
    #[arg(long)]
    hwaccel: Option<String>,

    #[arg(long, value_name = "FORMAT")]
    pix_fmt: Option<String>,

    /// Move the index to the front of mp4 outputs
    #[arg(long)]
    faststart: bool,

    /// Keep audio in the first pass of a two-pass encode
    #[arg(long)]
    keep_audio_first_pass: bool,

    /// Output extension instead of the codec's default container
    #[arg(long, value_name = "EXT")]
    ext: Option<String>,

    /// Raw flags placed before the input options
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    global_opts: Option<String>,

    /// Raw flags placed right before `-i`
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    input_opts: Option<String>,

    /// Raw flags placed before the output path
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    output_opts: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum OverwriteArg {
    Ask,
    Always,
    Never,
}

impl From<OverwriteArg> for OverwritePolicy {
    fn from(arg: OverwriteArg) -> Self {
        match arg {
            OverwriteArg::Ask => OverwritePolicy::Ask,
            OverwriteArg::Always => OverwritePolicy::Always,
            OverwriteArg::Never => OverwritePolicy::Never,
        }
    }
}

/// Asks on the terminal; anything but "y"/"yes" keeps the existing file
struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm_overwrite(&self, path: &Path) -> bool {
        eprint!("{} already exists. Overwrite? [y/N] ", path.display());
        let _ = std::io::stderr().flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };
    if let Some(ffmpeg) = cli.ffmpeg {
        config.ffmpeg_path = ffmpeg;
    }
    if let Some(ffprobe) = cli.ffprobe {
        config.ffprobe_path = ffprobe;
    }

    match cli.command {
        Commands::Codecs { all } => list_codecs(&config, all || config.show_all_codecs).await,
        Commands::PixFmts => {
            for format in probe_pixel_formats(&config.ffmpeg_path).await? {
                println!("{}", format);
            }
            Ok(())
        }
        Commands::Command(encode) => {
            let session = build_session(&config, &encode).await?;
            println!("{}", session.command());
            Ok(())
        }
        Commands::Convert {
            encode,
            output_dir,
            overwrite,
            jobs,
            queue_only,
            open_logs,
            inputs,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(policy) = overwrite {
                config.overwrite = policy.into();
            }
            if let Some(jobs) = jobs {
                config.max_concurrent_jobs = jobs;
            }
            validate_config(&config)?;

            convert(&config, &encode, &inputs).await?;
            if queue_only {
                info!("Queued; run `vencoder resume` to start");
                return Ok(());
            }
            resume(&config, open_logs).await
        }
        Commands::Preview {
            system_player,
            file,
        } => {
            let ffplay = (config.use_ffplay && !system_player)
                .then_some(config.ffplay_path.as_str());
            play_file(ffplay, &file).await
        }
        Commands::Resume { jobs, open_logs } => {
            if let Some(jobs) = jobs {
                config.max_concurrent_jobs = jobs;
            }
            validate_config(&config)?;
            resume(&config, open_logs).await
        }
    }
}

async fn list_codecs(config: &VencoderConfig, show_all: bool) -> Result<()> {
    match check_version(&config.ffmpeg_path).await {
        Ok(version) => info!("ffmpeg {}", version),
        Err(e) => warn!("Could not read ffmpeg version: {}", e),
    }

    let codecs = probe_codecs(&config.ffmpeg_path).await?;
    if codecs.anomalies > 0 {
        warn!("{} lines of the codec listing were not understood", codecs.anomalies);
    }

    println!("Video:");
    for codec in codecs.displayed_video(show_all) {
        println!(
            "  {:<12} {:<40} {}",
            codec.short_name,
            codec.description,
            codec.encoders.join(", ")
        );
    }
    println!("Audio:");
    for codec in &codecs.audio {
        println!(
            "  {:<12} {:<40} {}",
            codec.short_name,
            codec.description,
            codec.encoders.join(", ")
        );
    }
    Ok(())
}

async fn build_session(config: &VencoderConfig, args: &EncodeArgs) -> Result<Session> {
    let codecs = probe_codecs(&config.ffmpeg_path)
        .await
        .context("Failed to list ffmpeg codecs")?;
    let mut session = Session::new(codecs, &args.codec)?.with_program(&config.ffmpeg_path);

    if let Some(encoder) = &args.encoder {
        session.select_encoder(encoder)?;
    }
    if args.twopass {
        session.set_two_pass(true)?;
    }
    if let Some(mode) = &args.mode {
        session.set_mode(mode)?;
    }
    if let Some(bitrate) = args.bitrate {
        session.set_bitrate(bitrate);
    }
    if let Some(quality) = args.quality {
        session.set_quality(quality);
    }

    let mut patches = vec![
        ParamPatch::FastStart(args.faststart),
        ParamPatch::DoNotUseAn(args.keep_audio_first_pass),
    ];
    if let Some(acodec) = &args.acodec {
        patches.push(ParamPatch::Acodec(Some(acodec.clone())));
    }
    if let Some(abitrate) = args.abitrate {
        patches.push(ParamPatch::AudioBitrate(Some(abitrate)));
    }
    if let Some(preset) = &args.preset {
        patches.push(ParamPatch::Preset(Some(preset.clone())));
    }
    if let Some(speed) = args.speed {
        patches.push(ParamPatch::Speed(Some(speed)));
    }
    if let Some(hwaccel) = &args.hwaccel {
        patches.push(ParamPatch::HwAccel(Some(hwaccel.clone())));
    }
    if let Some(pix_fmt) = &args.pix_fmt {
        patches.push(ParamPatch::PixelFormat(Some(pix_fmt.clone())));
    }
    if let Some(ext) = &args.ext {
        patches.push(ParamPatch::CustomExt(Some(ext.clone())));
    }
    for (stage, text) in [
        (Stage::Global, &args.global_opts),
        (Stage::Input, &args.input_opts),
        (Stage::Output, &args.output_opts),
    ] {
        if let Some(text) = text {
            patches.push(ParamPatch::UserOpts {
                stage,
                text: text.clone(),
            });
        }
    }
    session.update_all(patches);

    if let Some(policy) = session.policy() {
        debug!(
            "{} in mode {} (modes: {})",
            policy.name(),
            policy.mode(),
            policy.modes().join(", ")
        );
    }
    Ok(session)
}

async fn convert(config: &VencoderConfig, args: &EncodeArgs, paths: &[PathBuf]) -> Result<()> {
    let inputs = collect_inputs(paths)?;
    if inputs.is_empty() {
        anyhow::bail!("No input files found");
    }

    let session = build_session(config, args).await?;
    info!("Command: {}", session.command());

    let options = PlanOptions {
        program: config.ffmpeg_path.clone(),
        ffprobe: config.ffprobe_path.clone(),
        output_dir: config.output_dir.clone(),
        overwrite: config.overwrite,
    };
    let plan = plan_conversions(session.params(), &inputs, &options, &StdinPrompt).await?;
    for (input, reason) in &plan.skipped {
        warn!("Skipped {}: {}", input.display(), reason);
    }
    if plan.entries.is_empty() {
        anyhow::bail!("Nothing to convert");
    }

    let mut store = JsonFileStore::new(&config.state_file);
    save_queue(&mut store, &plan.entries)
        .with_context(|| format!("Failed to save queue to {:?}", store.path()))?;
    info!("Queued {} conversions", plan.entries.len());
    Ok(())
}

async fn resume(config: &VencoderConfig, open_logs: bool) -> Result<()> {
    let mut store = JsonFileStore::new(&config.state_file);
    let entries = load_queue(&store)?;
    if entries.is_empty() {
        info!("Queue is empty");
        return Ok(());
    }

    let cancel = CancelHandle::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping conversions");
                cancel.cancel();
            }
        });
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let names = entries
        .iter()
        .map(|e| (e.id.clone(), e.input.display().to_string()))
        .collect::<HashMap<_, _>>();
    let reporter = tokio::spawn(report_events(rx, names));

    let options = RunOptions {
        max_concurrent_jobs: config.max_concurrent_jobs,
        log_dir: config.log_dir.clone(),
    };
    let notifier = Arc::new(TracingNotifier { open_logs });
    let summary = run_batch(entries.clone(), &options, notifier, tx, cancel).await?;
    let _ = reporter.await;

    // Cancelled conversions stay queued for the next resume
    let remaining: Vec<_> = entries
        .into_iter()
        .zip(&summary.jobs)
        .filter(|(_, job)| job.status == JobStatus::Cancelled)
        .map(|(entry, _)| entry)
        .collect();
    if remaining.is_empty() {
        clear_queue(&mut store)?;
    } else {
        save_queue(&mut store, &remaining)?;
        info!("{} conversions left in the queue", remaining.len());
    }

    finish(&summary)
}

async fn report_events(
    mut rx: mpsc::UnboundedReceiver<ProcessEvent>,
    names: HashMap<String, String>,
) {
    let mut last_reported: HashMap<String, u64> = HashMap::new();
    let name = |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());

    while let Some(event) = rx.recv().await {
        match event {
            ProcessEvent::Started { id } => info!("Started {}", name(&id)),
            ProcessEvent::Progress { id, record } => {
                // Report every whole ten percent
                let step = (record.percentage / 10.0).floor() as u64;
                if last_reported.get(&id) != Some(&step) {
                    last_reported.insert(id.clone(), step);
                    info!("{}: {:.1}%", name(&id), record.percentage);
                }
            }
            ProcessEvent::Stderr { id, line } => debug!("[{}] {}", id, line),
            ProcessEvent::Exit { id, code } => debug!("{} exited with {}", name(&id), code),
        }
    }
}

fn finish(summary: &BatchSummary) -> Result<()> {
    info!(
        "{} succeeded, {} failed, {} cancelled",
        summary.succeeded, summary.failed, summary.cancelled
    );
    if summary.all_succeeded() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} conversions did not succeed",
            summary.unsuccessful(),
            summary.total()
        )
    }
}
