use clap::Parser;
use indicatif::{MultiProgress, ProgressDrawTarget};
use miette::IntoDiagnostic;
use once_cell::sync::Lazy;
use tracing_subscriber::{filter::LevelFilter, util::SubscriberInitExt, EnvFilter};

mod commands;
mod options;
mod reporter;
mod writer;

/// Returns a global instance of [`indicatif::MultiProgress`].
///
/// Logging is routed through [`writer::IndicatifWriter`] which suspends the
/// progress bars returned by this function while a line is written.
pub fn global_multi_progress() -> MultiProgress {
    static GLOBAL_MP: Lazy<MultiProgress> = Lazy::new(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        mp
    });
    GLOBAL_MP.clone()
}

/// Stage, deduplicate and upload content addressed blobs
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Upload every file as its own blob
    UploadFiles(commands::upload::FilesOpt),

    /// Upload a directory tree as a single blob
    UploadDir(commands::upload::DirOpt),

    /// Archive several files together and upload them as a single blob
    UploadArchive(commands::upload::ArchiveOpt),

    /// Convert a zip archive and upload it as a single blob
    UploadZip(commands::upload::ZipOpt),

    /// Download a blob and restore it
    Fetch(commands::fetch::Opt),
}

/// Entry point of the `blobstage` cli.
#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()
        .into_diagnostic()?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer::IndicatifWriter::new(global_multi_progress()))
        .without_time()
        .finish()
        .try_init()
        .into_diagnostic()?;

    match cli.command {
        Commands::UploadFiles(opt) => commands::upload::files(opt).await,
        Commands::UploadDir(opt) => commands::upload::dir(opt).await,
        Commands::UploadArchive(opt) => commands::upload::archive(opt).await,
        Commands::UploadZip(opt) => commands::upload::zip(opt).await,
        Commands::Fetch(opt) => commands::fetch::fetch(opt).await,
    }
}
