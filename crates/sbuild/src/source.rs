//! Source acquisition and extraction.
//!
//! Archive sources land in `sources/<file name from URL>` and are unpacked into a fresh
//! `work/<id>`. Git sources are cloned to `sources/<id>` and built in place.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::executor::ExecCtx;
use crate::recipe::{Recipe, SourceOrigin};
use crate::session::Session;
use crate::tools::ArchiveKind;

/// Result of [`acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    /// Downloaded (or already present) archive, checksum verified when one is configured.
    Archive(PathBuf),
    /// Version-control checkout, used as the source tree directly.
    Checkout(PathBuf),
}

pub fn acquire(s: &Session, ctx: &ExecCtx, recipe: &Recipe) -> Result<Acquired> {
    let id = recipe.id();
    match recipe.origin() {
        SourceOrigin::Git(url) => {
            let dir = s.layout.source_checkout(&id);
            if dir.exists() {
                ctx.info(format!("git source exists, pulling: {}", dir.display()));
                s.tools.vcs.pull(ctx, &dir)?;
            } else {
                s.tools.vcs.clone_repo(ctx, url, &dir)?;
            }
            Ok(Acquired::Checkout(dir))
        }
        SourceOrigin::Archive(url) => {
            let file = s.layout.sources.join(archive_file_name(url)?);
            if file.exists() {
                ctx.info(format!("source exists: {}", file.display()));
            } else {
                s.tools.downloader.download(ctx, url, &file)?;
            }
            if let Some(expected) = recipe.checksum.as_deref() {
                verify_checksum(s, ctx, &file, expected)?;
            }
            Ok(Acquired::Archive(file))
        }
        SourceOrigin::Undefined => Err(Error::new(
            ErrorKind::SourceUndefined,
            "no source= or git= defined in recipe",
        )),
    }
}

// The archive stays on disk after a mismatch so it can be inspected.
fn verify_checksum(s: &Session, ctx: &ExecCtx, file: &Path, expected: &str) -> Result<()> {
    let got = s.tools.checksum.sha256(file)?;
    if !got.eq_ignore_ascii_case(expected.trim()) {
        if let Err(e) = ctx.log_line(&format!(
            "sha256 mismatch for {}: got={got} expected={expected}",
            file.display()
        )) {
            warn!(error = %e, "could not record checksum mismatch in package log");
        }
        return Err(Error::new(
            ErrorKind::ChecksumMismatch,
            format!("sha256 mismatch: got={got} expected={expected}"),
        ));
    }
    ctx.ok(format!("sha256 verified: {got}"));
    Ok(())
}

/// Final path segment of `url`, without query or fragment.
pub fn archive_file_name(url: &str) -> Result<String> {
    let trimmed = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end();
    let tail = trimmed.rsplit('/').next().unwrap_or_default();
    if tail.is_empty() || tail == "." || tail == ".." {
        return Err(Error::msg(format!(
            "cannot derive a file name from source URL '{url}'"
        )));
    }
    Ok(tail.to_string())
}

/// Produces the source tree for `recipe`: a wiped-and-recreated `work/<id>` for archives, the
/// checkout itself for git sources.
pub fn extract(s: &Session, ctx: &ExecCtx, recipe: &Recipe, acquired: &Acquired) -> Result<PathBuf> {
    match acquired {
        Acquired::Archive(file) => {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let kind = ArchiveKind::detect(name)?;
            let dest = s.layout.work_tree(&recipe.id());
            s.layout.remove_dir_all(&dest)?;
            fs::create_dir_all(&dest)
                .map_err(|e| Error::msg(format!("failed to create {}: {e}", dest.display())))?;
            debug!(archive = %file.display(), ?kind, dest = %dest.display(), "extracting");
            s.tools.extractor.extract(ctx, file, kind, &dest)?;
            Ok(dest)
        }
        Acquired::Checkout(dir) => {
            if !dir.is_dir() {
                return Err(Error::msg(format!(
                    "git source dir not found: {}",
                    dir.display()
                )));
            }
            ctx.ok(format!("using git source at {}", dir.display()));
            Ok(dir.clone())
        }
    }
}
