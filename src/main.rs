// Headless driver for the compression engine: compresses every file given on
// the command line to PNG, WebP and JPEG and reports the savings.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use pact_lib::commands::{open_image, save_image, session_snapshot, shutdown};
use pact_lib::core::{
    CjpegParams, CompressionStatus, CwebpParams, Engine, EngineConfig, FormatParameters,
    PngquantParams, SessionId, WebpPreset,
};
use pact_lib::processing::preflight;
use pact_lib::utils::FormatId;

#[derive(Parser)]
#[command(name = "pact")]
#[command(about = "Compress images to PNG, WebP and JPEG and compare the savings")]
#[command(version)]
struct Cli {
    /// Images to compress
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// JSON engine configuration (encoder paths, timeouts, temp dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// pngquant maximum quality (1-100)
    #[arg(long, default_value_t = PngquantParams::default().quality)]
    png_quality: u8,

    /// pngquant dithering level (0-1); omit for the encoder default
    #[arg(long)]
    png_dither: Option<f32>,

    /// Disable pngquant dithering
    #[arg(long, conflicts_with = "png_dither")]
    no_dither: bool,

    /// cwebp quality (1-100)
    #[arg(long, default_value_t = CwebpParams::default().quality)]
    webp_quality: u8,

    /// cwebp preset: default, photo, picture, drawing, icon, text
    #[arg(long, default_value = "default")]
    webp_preset: WebpPreset,

    /// cjpeg quality (1-100)
    #[arg(long, default_value_t = CjpegParams::default().quality)]
    jpeg_quality: u8,

    /// Kill an encoder after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Directory for intermediate artifacts
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Write the results next to each original (the original is backed up first)
    #[arg(long)]
    save: bool,

    /// Formats to write with --save, comma separated (default: every successful one)
    #[arg(long = "save-format", value_delimiter = ',', requires = "save")]
    save_formats: Vec<FormatId>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(timeout) = self.timeout_ms {
            config.encoder_timeout_ms = timeout;
        }
        if let Some(dir) = &self.temp_dir {
            config.temp_dir = dir.clone();
        }
        Ok(config)
    }

    fn parameters(&self) -> FormatParameters {
        let dither = if self.no_dither {
            None
        } else {
            self.png_dither.or(PngquantParams::default().dither)
        };
        FormatParameters {
            png: PngquantParams { quality: self.png_quality, dither },
            webp: CwebpParams { quality: self.webp_quality, preset: self.webp_preset },
            jpeg: CjpegParams { quality: self.jpeg_quality },
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    info!("=== pact starting ===");

    let config = cli.engine_config()?;
    let report = preflight(&config);

    let (engine, mut events) = Engine::new(&config, &report).await?;
    let result = run(&cli, &engine, &mut events).await;
    shutdown(&engine).await;
    result
}

async fn run(cli: &Cli, engine: &Engine, events: &mut pact_lib::core::EventReceiver) -> Result<()> {
    let formats = engine.available_formats();
    if formats.is_empty() {
        bail!("No encoders available");
    }
    let parameters = cli.parameters();

    let mut sessions: Vec<(SessionId, PathBuf)> = Vec::with_capacity(cli.files.len());
    let mut remaining: HashMap<SessionId, usize> = HashMap::new();
    for file in &cli.files {
        match open_image(engine, file, parameters).await {
            Ok(id) => {
                sessions.push((id, file.clone()));
                remaining.insert(id, formats.len());
            }
            Err(e) => warn!("Skipping {}: {}", file.display(), e),
        }
    }
    if sessions.is_empty() {
        bail!("None of the given files could be opened");
    }

    // One accepted result per format and session
    while !remaining.is_empty() {
        let Some(event) = events.recv().await else {
            bail!("Engine stopped before all results arrived");
        };
        debug!("Session {}: {}", event.session_id, event.summary());
        if let Some(left) = remaining.get_mut(&event.session_id) {
            *left = left.saturating_sub(1);
            if *left == 0 {
                remaining.remove(&event.session_id);
            }
        }
    }

    let mut failed_saves = 0;
    for (id, file) in &sessions {
        let snapshot = session_snapshot(engine, *id).await?;
        println!("{} ({} bytes)", file.display(), snapshot.original_size);
        for format in &snapshot.formats {
            let Some(result) = &format.result else { continue };
            match (&result.status, result.artifact_size(), format.savings) {
                (CompressionStatus::Succeeded, Some(size), Some(savings)) => {
                    let flag = if savings.warning { "  ! not smaller than original" } else { "" };
                    println!("  {:<5} {:>10} bytes  {:>8}{}", format.format, size, savings, flag);
                }
                (CompressionStatus::Failed { reason }, _, _) => {
                    println!("  {:<5} failed: {}", format.format, reason);
                }
                _ => {}
            }
        }

        if cli.save {
            let formats = (!cli.save_formats.is_empty()).then_some(cli.save_formats.as_slice());
            match save_image(engine, *id, formats).await {
                Ok(report) => {
                    for path in report.outputs() {
                        println!("  wrote {}", path.display());
                    }
                    if report.original_replaced {
                        println!("  original kept as {}", report.backup.display());
                    }
                }
                Err(e) => {
                    warn!("Save failed for {}: {}", file.display(), e);
                    failed_saves += 1;
                }
            }
        }
    }

    if failed_saves > 0 {
        bail!("{} of {} saves failed", failed_saves, sessions.len());
    }
    Ok(())
}
