mod size;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fitsize_core::toolchain::check_version;
use fitsize_core::{
    load_config, load_config_or_default, validate_config, CapabilitySnapshot, CompressionReport,
    CompressionRequest, Compressor, Config, ConversionResult, OutcomeStatus, ProcessRunner,
    QualityPreset, RasterCodec, ToolRunner,
};

use size::{format_size, parse_size};

/// Config file read when `--config` is not given.
const DEFAULT_CONFIG_PATH: &str = "fitsize.toml";

/// Progress channel capacity.
const PROGRESS_BUFFER_SIZE: usize = 64;

/// Compress images and videos to a target file size.
#[derive(Parser, Debug)]
#[command(name = "fitsize")]
#[command(version)]
#[command(about = "Compress images and videos to a target file size")]
#[command(long_about = "fitsize shrinks media files toward a byte budget.\n\n\
    Images (JPEG, WebP) are re-encoded at the highest quality that fits. Videos are\n\
    encoded with two-pass ffmpeg at a bitrate derived from the budget and duration.\n\n\
    EXAMPLES:\n    \
    fitsize compress photo.jpg --target 500K\n    \
    fitsize compress clip.mp4 --target 25M --encoder h264_nvenc\n    \
    fitsize preset clip.mov --level low\n    \
    fitsize convert photo.png --to webp")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "FITSIZE_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress a file toward a target size
    Compress {
        /// Input image or video
        input: PathBuf,

        /// Target size, e.g. 5000000, 500K, 25M
        #[arg(short, long, value_parser = parse_size)]
        target: u64,

        /// Preferred video encoder (see `fitsize encoders`)
        #[arg(short, long)]
        encoder: Option<String>,

        /// Output path (default: <stem>_compressed.<ext> next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compress at a fixed quality level
    Preset {
        input: PathBuf,

        /// high, medium or low
        #[arg(short, long, default_value = "medium")]
        level: QualityPreset,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert to another format of the same kind
    Convert {
        input: PathBuf,

        /// Target extension, e.g. webp or mkv
        #[arg(long)]
        to: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available video encoders
    Encoders,

    /// Check that ffmpeg is installed
    Check,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load(&cli)?;
    let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner::new());

    match cli.command {
        Command::Compress {
            input,
            target,
            encoder,
            output,
        } => {
            let compressor = Arc::new(
                Compressor::probe(config, runner, Arc::new(RasterCodec::new())).await,
            );

            let mut request = CompressionRequest::new(&input, target)?;
            if let Some(encoder) = encoder {
                request = request.with_encoder(encoder);
            }
            if let Some(output) = output {
                request = request.with_output_path(output);
            }

            let report = compress(compressor, request, !cli.json).await?;
            print_report(&report, cli.json)?;
            if report.outcome.status == OutcomeStatus::Failed {
                bail!(
                    "compression failed: {}",
                    report.outcome.diagnostic.as_deref().unwrap_or("no output")
                );
            }
        }
        Command::Preset {
            input,
            level,
            output,
        } => {
            let compressor =
                Compressor::probe(config, runner, Arc::new(RasterCodec::new())).await;
            let result = compressor
                .compress_preset(&input, level, output)
                .await
                .with_context(|| format!("Failed to compress {:?}", input))?;
            print_conversion(&result, cli.json)?;
        }
        Command::Convert { input, to, output } => {
            let compressor =
                Compressor::probe(config, runner, Arc::new(RasterCodec::new())).await;
            let result = compressor
                .convert(&input, &to, output)
                .await
                .with_context(|| format!("Failed to convert {:?} to .{}", input, to))?;
            print_conversion(&result, cli.json)?;
        }
        Command::Encoders => {
            let snapshot = CapabilitySnapshot::probe(runner.as_ref(), &config.toolchain).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                if !snapshot.toolchain_available {
                    println!("ffmpeg not found; video compression is unavailable");
                }
                for encoder in snapshot.encoders() {
                    println!("{:<12} {}", encoder.codec_identifier, encoder.display_name);
                }
            }
        }
        Command::Check => {
            let version = check_version(runner.as_ref(), &config.toolchain)
                .await
                .with_context(|| {
                    format!(
                        "ffmpeg is not usable at {:?}",
                        config.toolchain.ffmpeg_path
                    )
                })?;
            println!("{}", version);
        }
    }

    Ok(())
}

fn load(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None => load_config_or_default(DEFAULT_CONFIG_PATH.as_ref())
            .context("Failed to load configuration")?,
    };
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

/// Runs the pipeline on its own task and prints progress as it arrives.
async fn compress(
    compressor: Arc<Compressor>,
    request: CompressionRequest,
    show_progress: bool,
) -> Result<CompressionReport> {
    let (tx, mut rx) = mpsc::channel(PROGRESS_BUFFER_SIZE);
    let handle =
        tokio::spawn(async move { compressor.compress_with_progress(request, tx).await });

    while let Some(event) = rx.recv().await {
        if show_progress {
            println!("  {}", event.message());
        }
    }

    let report = handle.await.context("Compression task panicked")??;
    Ok(report)
}

fn print_report(report: &CompressionReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let outcome = &report.outcome;
    println!(
        "{} -> {} ({} / target {}, {:+.1}%)",
        outcome.status,
        outcome.output_path.display(),
        format_size(outcome.achieved_bytes),
        format_size(outcome.target_bytes),
        outcome.deviation_percent()
    );
    if let Some(quality) = outcome.quality {
        println!("quality: {}", quality);
    }
    if let Some(plan) = &report.bitrate_plan {
        println!(
            "video bitrate: {:.2} kbps, audio: {} kbps",
            plan.video_bitrate_kbps, plan.audio_bitrate_kbps
        );
    }
    if let Some(diagnostic) = &outcome.diagnostic {
        println!("note: {}", diagnostic);
    }
    Ok(())
}

fn print_conversion(result: &ConversionResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!(
            "{} ({} -> {}, {:.1}%)",
            result.output_path.display(),
            format_size(result.input_size_bytes),
            format_size(result.output_size_bytes),
            result.size_ratio_percent()
        );
    }
    Ok(())
}
