use std::path::PathBuf;

use blobstage_digest::{parse_digest_from_hex, Sha256};
use miette::{Context, IntoDiagnostic};

use crate::options::{StoreOpt, UploadOpt};

#[derive(Debug, clap::Parser)]
pub struct Opt {
    /// The SHA-256 hash of the blob (hex)
    hash: String,

    /// Where to restore the blob. Directory blobs are extracted into this
    /// directory, file blobs are written to this path.
    destination: PathBuf,

    #[clap(flatten)]
    upload: UploadOpt,

    #[clap(flatten)]
    store: StoreOpt,
}

pub async fn fetch(opt: Opt) -> miette::Result<()> {
    let hash = parse_digest_from_hex::<Sha256>(opt.hash.trim())
        .ok_or_else(|| miette::miette!("'{}' is not a valid SHA-256 hash", opt.hash))?;

    let store = opt.store.open().await?;
    let config = opt.upload.config();

    let summary = blobstage_upload::fetch(&store, &config, &hash, &opt.destination)
        .await
        .into_diagnostic()
        .with_context(|| format!("failed to fetch {hash:x}"))?;

    let what = match &summary.unpacked {
        Some(unpacked) => format!(
            "{} files, {} directories, {} symlinks",
            unpacked.files, unpacked.directories, unpacked.symlinks
        ),
        None => format!("{} bytes", summary.uncompressed_size),
    };
    println!(
        "{} fetched {} to {} ({what})",
        console::style(console::Emoji("✔", "+")).green(),
        summary.key,
        opt.destination.display()
    );
    if let Some(skipped) = summary.unpacked.map(|unpacked| unpacked.skipped) {
        if skipped > 0 {
            tracing::warn!("skipped {skipped} unsupported entries");
        }
    }

    Ok(())
}
