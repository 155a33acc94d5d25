use wharf_infra::QueueStats;

fn progress(message: &str, current: u64, total: u64) -> String {
    let current = current.min(total);
    format!("{message} [{current}/{total}]")
}

/// Renders the pipeline's current phase from queue stats snapshots.
///
/// Populate progress is estimated as batches completed times the nominal
/// batch size, clamped to the file count; the final batch is usually
/// smaller than the rest.
pub fn status_message(
    hash: &QueueStats,
    populate: &QueueStats,
    upload: &QueueStats,
    total_files: u64,
    batch_size: u64,
) -> String {
    if !hash.finished {
        progress("hashing files", hash.complete, total_files)
    } else if !populate.finished {
        progress(
            "adding files to version",
            populate.complete.saturating_mul(batch_size),
            total_files,
        )
    } else if !upload.finished {
        progress("uploading new files", upload.complete, upload.total)
    } else {
        "upload complete".to_string()
    }
}
