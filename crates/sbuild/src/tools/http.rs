use std::fs::{self, File};
use std::path::Path;

use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::executor::ExecCtx;

use super::Downloader;

/// In-process HTTP(S) downloader, selected with `[tools] downloader = "builtin"`.
pub struct HttpDownloader;

impl Downloader for HttpDownloader {
    fn download(&self, ctx: &ExecCtx, url: &str, dest: &Path) -> Result<()> {
        ctx.step("download", || {
            ctx.log_line(&format!("GET {url} -> {}", dest.display()))?;
            fetch_to(url, dest).inspect_err(|e| {
                let _ = ctx.log_line(&format!("download failed: {e}"));
            })
        })
    }
}

fn fetch_to(url: &str, dest: &Path) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| Error::msg(format!("invalid download path: {}", dest.display())))?;
    fs::create_dir_all(parent)
        .map_err(|e| Error::msg(format!("failed to create {}: {e}", parent.display())))?;

    // No client-side timeout, same as every other external step.
    let client = reqwest::blocking::Client::builder()
        .timeout(None::<std::time::Duration>)
        .build()
        .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;
    let mut res = client
        .get(url)
        .send()
        .map_err(|e| Error::new(ErrorKind::CommandFailed, format!("HTTP GET {url} failed: {e}")))?;
    if !res.status().is_success() {
        return Err(Error::new(
            ErrorKind::CommandFailed,
            format!("HTTP GET {url} failed with status {}", res.status()),
        ));
    }

    let mut part = dest.as_os_str().to_os_string();
    part.push(".part");
    let part = std::path::PathBuf::from(part);
    let mut file = File::create(&part)
        .map_err(|e| Error::msg(format!("failed to create {}: {e}", part.display())))?;
    let copied = res.copy_to(&mut file).map_err(|e| {
        let _ = fs::remove_file(&part);
        Error::new(ErrorKind::CommandFailed, format!("HTTP body for {url} failed: {e}"))
    })?;
    drop(file);
    debug!(url, bytes = copied, "downloaded");

    fs::rename(&part, dest).map_err(|e| {
        Error::msg(format!(
            "failed to move {} -> {}: {e}",
            part.display(),
            dest.display()
        ))
    })
}
