use std::{path::PathBuf, sync::Arc};

use blobstage_archive::NamedPayload;
use blobstage_upload::{ItemReport, UploadItem, UploadMode, UploadStatus, Uploader};
use miette::IntoDiagnostic;

use crate::{
    global_multi_progress,
    options::{StoreOpt, UploadOpt},
    reporter::IndicatifReporter,
};

#[derive(Debug, clap::Parser)]
pub struct FilesOpt {
    /// The files to upload
    #[clap(required = true)]
    files: Vec<PathBuf>,

    #[clap(flatten)]
    upload: UploadOpt,

    #[clap(flatten)]
    store: StoreOpt,
}

#[derive(Debug, clap::Parser)]
pub struct DirOpt {
    /// The directory to upload
    directory: PathBuf,

    #[clap(flatten)]
    upload: UploadOpt,

    #[clap(flatten)]
    store: StoreOpt,
}

#[derive(Debug, clap::Parser)]
pub struct ArchiveOpt {
    /// The files to archive, stored under their file names
    #[clap(required = true)]
    files: Vec<PathBuf>,

    /// The label of the archive
    #[clap(long, default_value = "archive")]
    name: String,

    #[clap(flatten)]
    upload: UploadOpt,

    #[clap(flatten)]
    store: StoreOpt,
}

#[derive(Debug, clap::Parser)]
pub struct ZipOpt {
    /// The zip archive to upload
    zip: PathBuf,

    #[clap(flatten)]
    upload: UploadOpt,

    #[clap(flatten)]
    store: StoreOpt,
}

pub async fn files(opt: FilesOpt) -> miette::Result<()> {
    let items = opt.files.into_iter().map(UploadItem::file).collect();
    run(opt.store, opt.upload, items).await
}

pub async fn dir(opt: DirOpt) -> miette::Result<()> {
    run(opt.store, opt.upload, vec![UploadItem::directory(opt.directory)]).await
}

pub async fn archive(opt: ArchiveOpt) -> miette::Result<()> {
    let payloads = opt
        .files
        .iter()
        .map(|path| NamedPayload::from_path(path))
        .collect::<Result<Vec<_>, _>>()
        .into_diagnostic()?;
    let items = UploadItem::from_payloads(UploadMode::Directory, opt.name, payloads);
    run(opt.store, opt.upload, items).await
}

pub async fn zip(opt: ZipOpt) -> miette::Result<()> {
    run(opt.store, opt.upload, vec![UploadItem::zip(opt.zip)]).await
}

async fn run(store: StoreOpt, upload: UploadOpt, items: Vec<UploadItem>) -> miette::Result<()> {
    let store = store.open().await?;
    let config = upload.config();
    let reporter = Arc::new(IndicatifReporter::new(global_multi_progress()));

    let reports = Uploader::new(&store, &config)
        .with_reporter(reporter)
        .upload_batch(items)
        .await;

    for report in &reports {
        print_report(report);
    }

    let failed = reports.iter().filter(|report| report.is_err()).count();
    if failed > 0 {
        return Err(miette::miette!(
            "{failed} of {} items failed to upload",
            reports.len()
        ));
    }
    Ok(())
}

fn print_report(report: &ItemReport) {
    let marker = match &report.result {
        Ok(outcome) if outcome.status == UploadStatus::Uploaded => {
            console::style(console::Emoji("✔", "+")).green()
        }
        Ok(_) => console::style(console::Emoji("=", "=")).dim(),
        Err(_) => console::style(console::Emoji("✘", "x")).red(),
    };
    println!("{marker} {report}");
}
