mod catalog;
mod config;
mod digest;
mod error;
mod logging;
mod policy;
mod scanner;
mod settings;
mod sync;
mod transport;

use std::path::PathBuf;

use clap::Parser;

use crate::error::SyncError;
use crate::scanner::ClamdScreener;
use crate::transport::HttpTransport;

#[derive(Parser, Debug)]
#[command(
    name = "sd-embeddings-sync",
    version,
    about = "Sync Stable Diffusion textual-inversion embeddings from the sd-concepts-library"
)]
struct Args {
    /// Directory that receives the embedding files.
    #[arg(short = 'p', long = "embeddings-path")]
    embeddings_path: Option<PathBuf>,

    /// Directory that receives the preview images.
    #[arg(short = 'i', long = "image-path")]
    image_path: Option<PathBuf>,

    /// Settings file location (created with defaults when missing).
    #[arg(
        short = 'j',
        long = "settings-path",
        default_value = config::settings::DEFAULT_SETTINGS_FILE
    )]
    settings_path: PathBuf,

    /// Skip the remote catalog and sync only the current allow list.
    #[arg(long = "no-remote")]
    no_remote: bool,

    /// Log verbosity on stderr.
    #[arg(
        short = 'l',
        long = "log-level",
        default_value = config::settings::DEFAULT_LOG_LEVEL,
        value_parser = ["error", "warn", "info", "debug", "trace"]
    )]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = real_main(&args) {
        eprintln!("sd-embeddings-sync: fatal error: {e:?}");
        let code = e
            .downcast_ref::<SyncError>()
            .map(SyncError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn real_main(args: &Args) -> anyhow::Result<()> {
    logging::init_logging(&args.log_level)?;
    validate_args(args)?;

    let mut settings = settings::load(&args.settings_path)?;
    if let Some(path) = &args.embeddings_path {
        settings.embeddings_dir = path.clone();
    }
    if let Some(path) = &args.image_path {
        settings.embeddings_samples_dir = path.clone();
    }
    settings::ensure_dirs(&settings)?;

    let transport = HttpTransport::new();
    let screener = ClamdScreener::new();
    let stats = sync::run(&transport, &screener, &mut settings, !args.no_remote)?;

    // Overrides made on the command line are persisted alongside any
    // policy changes the run produced.
    settings::save(&args.settings_path, &settings)?;

    print!("{}", stats.summary());
    Ok(())
}

/// Paths given on the command line must already exist; the settings file
/// is the only thing this tool will create on its own.
fn validate_args(args: &Args) -> Result<(), SyncError> {
    if let Some(path) = &args.embeddings_path {
        if !path.is_dir() {
            return Err(SyncError::Config {
                message: format!("embeddings path {} is not a directory", path.display()),
            });
        }
    }
    if let Some(path) = &args.image_path {
        if !path.is_dir() {
            return Err(SyncError::Config {
                message: format!("image path {} is not a directory", path.display()),
            });
        }
    }
    if args.settings_path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(SyncError::Config {
            message: format!(
                "settings path {} must end in .json",
                args.settings_path.display()
            ),
        });
    }
    if args.settings_path.exists() && !args.settings_path.is_file() {
        return Err(SyncError::Config {
            message: format!(
                "settings path {} is not a regular file",
                args.settings_path.display()
            ),
        });
    }
    Ok(())
}
