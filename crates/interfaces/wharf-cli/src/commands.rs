use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use walkdir::WalkDir;
use wharf_core::paths::SitePath;
use wharf_pipeline::{HttpReleaseStore, UploadOptions, UploadRequest, Uploader};

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Walks the content root and returns forward-slash relative paths.
/// Dot-prefixed files and directories are skipped at any depth.
pub fn list_site_files(content_root: &Utf8Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(content_root)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.context("walking content directory")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8Path::from_path(entry.path())
            .with_context(|| format!("non UTF-8 path: {}", entry.path().display()))?;
        let rel = path
            .strip_prefix(content_root)
            .with_context(|| format!("path escapes content root: {path}"))?;
        let rel = SitePath::normalize(rel.as_str());
        ensure!(
            SitePath::verify_safe(&rel),
            "listed path escapes the content root: {rel}"
        );
        files.push(rel);
    }
    files.sort();
    Ok(files)
}

pub async fn cmd_deploy(
    project_root: Utf8PathBuf,
    public: Utf8PathBuf,
    version: String,
    api_url: String,
    batch_size: usize,
    gzip_level: u32,
    verbose: bool,
) -> Result<()> {
    let content_root = if public.is_absolute() {
        public
    } else {
        project_root.join(public)
    };
    println!(":: Deploying {} as {}", content_root, version);

    let files = list_site_files(&content_root)
        .with_context(|| format!("listing files under {content_root}"))?;
    if files.is_empty() {
        println!("   No files found under {}; nothing to do.", content_root);
        return Ok(());
    }
    println!("   Found {} files", files.len());

    let client = wharf_infra::net::default_http_client().context("Failed to build HTTP client")?;
    let store = HttpReleaseStore::new(client, &api_url).context("Invalid API url")?;

    let request = UploadRequest {
        version,
        project_root,
        content_root,
        files,
        options: UploadOptions {
            batch_size,
            gzip_level,
            ..UploadOptions::default()
        },
    };
    let uploader = Arc::new(Uploader::new(request, Arc::new(store)));

    // Interactive runs get a live spinner; verbose runs log status changes
    // as plain lines so they interleave cleanly with tracing output.
    let interactive = !verbose;
    let poll = if interactive {
        Duration::from_millis(200)
    } else {
        Duration::from_secs(2)
    };
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    if interactive {
        pb.enable_steady_tick(Duration::from_millis(100));
    } else {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut run = {
        let uploader = uploader.clone();
        tokio::spawn(async move { uploader.start().await })
    };
    let mut last = String::new();
    let outcome = loop {
        tokio::select! {
            res = &mut run => break res,
            _ = tokio::time::sleep(poll) => {
                let msg = uploader.status_message();
                if interactive {
                    pb.set_message(msg);
                } else if msg != last {
                    println!("   {msg}");
                    last = msg;
                }
            }
        }
    };
    let stats = match outcome.context("upload task panicked")? {
        Ok(stats) => {
            pb.finish_with_message("upload complete");
            stats
        }
        Err(err) => {
            pb.finish_and_clear();
            return Err(err.into());
        }
    };

    println!("\n:: Deploy Result");
    println!("   Files:    {}", stats.files_total);
    println!("   Uploaded: {}", stats.files_uploaded);
    println!("   Cached:   {}", stats.files_cached);
    println!("   Size:     {}", format_size(stats.bytes_total, DECIMAL));

    Ok(())
}
