//! BLOBWIRE CLI
//!
//! Chunked image and video transfer over message channels

mod config;
mod loopback;
mod progress;
mod sink;

use anyhow::Context;
use blobwire_core::RecordingInfo;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::Config;
use loopback::TransferSummary;
use progress::{TransferProgress, format_bytes, format_duration};
use sink::DirectorySink;

/// Default blob size for `send-video` (256 KiB)
const DEFAULT_BLOB_SIZE: usize = 256 * 1024;

/// BLOBWIRE - chunked asset transfer with sender backpressure
#[derive(Parser)]
#[command(name = "blobwire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transfer a file as an image asset over a loopback image channel
    SendImage {
        /// File to send
        #[arg(required = true)]
        file: PathBuf,

        /// Asset key (defaults to the file stem)
        #[arg(short, long)]
        key: Option<String>,

        /// Output directory (overrides the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Stream a file as a video recording over a loopback video channel
    SendVideo {
        /// File to send
        #[arg(required = true)]
        file: PathBuf,

        /// Asset key (defaults to the file stem)
        #[arg(short, long)]
        key: Option<String>,

        /// Output directory (overrides the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Container MIME type (guessed from the extension if omitted)
        #[arg(long)]
        mime: Option<String>,

        /// Bytes per recorder blob
        #[arg(long, default_value_t = DEFAULT_BLOB_SIZE)]
        blob_size: usize,

        /// Recording identifier (random if omitted)
        #[arg(long)]
        recording_id: Option<String>,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = &cli.command
    {
        let path = cli.config.clone().unwrap_or_else(Config::default_path);
        return init_config(&path, *force);
    }

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_or_default()?,
    };

    // Validate configuration
    config.validate()?;

    // Initialize logging
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt().with_env_filter(level).init();

    match cli.command {
        Commands::SendImage { file, key, output } => {
            send_image(&file, key, output, &config).await?;
        }
        Commands::SendVideo {
            file,
            key,
            output,
            mime,
            blob_size,
            recording_id,
        } => {
            let options = VideoOptions {
                key,
                output,
                mime,
                blob_size,
                recording_id,
            };
            send_video(&file, options, &config).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => show_config(&config)?,
            ConfigAction::Init { .. } => {}
        },
    }

    Ok(())
}

struct VideoOptions {
    key: Option<String>,
    output: Option<PathBuf>,
    mime: Option<String>,
    blob_size: usize,
    recording_id: Option<String>,
}

/// Transfer a file as one image
async fn send_image(
    file: &Path,
    key: Option<String>,
    output: Option<PathBuf>,
    config: &Config,
) -> anyhow::Result<()> {
    let bytes = read_asset(file).await?;
    let key = key.unwrap_or_else(|| default_key(file));
    let output = output.unwrap_or_else(|| config.output.directory.clone());

    tracing::info!(file = %file.display(), asset_key = %key, "sending image");

    println!("File: {}", file.display());
    println!("Size: {}", format_bytes(bytes.len() as u64));
    println!("Asset key: {key}");

    let sink = Arc::new(DirectorySink::new(&output)?);
    let summary =
        loopback::transfer_image(config.transfer.pump_config()?, &key, &bytes, sink.clone())
            .await?;

    print_summary(&summary, &sink)
}

/// Stream a file as a recording of fixed-size blobs
async fn send_video(file: &Path, options: VideoOptions, config: &Config) -> anyhow::Result<()> {
    let bytes = read_asset(file).await?;
    let key = options.key.unwrap_or_else(|| default_key(file));
    let output = options
        .output
        .unwrap_or_else(|| config.output.directory.clone());
    let mime = options
        .mime
        .unwrap_or_else(|| guess_mime(file).to_string());
    let recording_id = options
        .recording_id
        .unwrap_or_else(|| format!("rec-{:08x}", rand::random::<u32>()));

    tracing::info!(
        file = %file.display(),
        asset_key = %key,
        recording_id = %recording_id,
        mime_type = %mime,
        "sending video"
    );

    println!("File: {}", file.display());
    println!("Size: {}", format_bytes(bytes.len() as u64));
    println!("Recording: {recording_id} ({mime})");

    let sink = Arc::new(DirectorySink::new(&output)?);
    let progress = TransferProgress::new(bytes.len() as u64, &key);

    let result = loopback::transfer_video(
        config.transfer.pump_config()?,
        RecordingInfo::new(recording_id, key, mime),
        &bytes,
        options.blob_size,
        sink.clone(),
        |n| progress.advance(n),
    )
    .await;

    match result {
        Ok(summary) => {
            progress.finish_with_message(format!("Sent {} blobs", summary.blobs));
            print_summary(&summary, &sink)
        }
        Err(e) => {
            progress.abandon();
            Err(e)
        }
    }
}

/// Print the effective configuration as TOML
fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Write the default configuration to `path`
fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(path)?;
    println!("Configuration written to: {}", path.display());
    Ok(())
}

async fn read_asset(file: &Path) -> anyhow::Result<Vec<u8>> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))
}

fn print_summary(summary: &TransferSummary, sink: &DirectorySink) -> anyhow::Result<()> {
    println!(
        "Transferred {} chunks in {}",
        summary.chunks,
        format_duration(summary.elapsed)
    );
    tracing::debug!(
        frames = summary.receiver.frames_received,
        malformed = summary.receiver.frames_malformed,
        "receiver stats"
    );

    let written = sink.written();
    if written.is_empty() {
        anyhow::bail!(
            "Transfer finished but no asset was written to {}",
            sink.dir().display()
        );
    }
    for path in written {
        println!("Wrote: {}", path.display());
    }
    Ok(())
}

fn default_key(file: &Path) -> String {
    file.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "asset".to_string())
}

fn guess_mime(file: &Path) -> &'static str {
    match file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("webm") => "video/webm",
        Some("mp4" | "m4v") => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send_video() {
        let cli = Cli::parse_from([
            "blobwire",
            "send-video",
            "clip.webm",
            "--blob-size",
            "4096",
            "--key",
            "rear",
        ]);
        match cli.command {
            Commands::SendVideo {
                file,
                key,
                blob_size,
                mime,
                ..
            } => {
                assert_eq!(file, PathBuf::from("clip.webm"));
                assert_eq!(key.as_deref(), Some("rear"));
                assert_eq!(blob_size, 4096);
                assert!(mime.is_none());
            }
            _ => panic!("expected send-video"),
        }
    }

    #[test]
    fn test_default_key_and_mime() {
        assert_eq!(default_key(Path::new("/tmp/front.jpg")), "front");
        assert_eq!(guess_mime(Path::new("a.WEBM")), "video/webm");
        assert_eq!(guess_mime(Path::new("a.mp4")), "video/mp4");
        assert_eq!(guess_mime(Path::new("a")), "application/octet-stream");
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        assert!(init_config(&path, true).is_ok());
        assert!(Config::load(&path).is_ok());
    }
}
