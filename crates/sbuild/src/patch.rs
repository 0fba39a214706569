//! Patch references: classification, caching and ordered application.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::ExecCtx;
use crate::recipe::Recipe;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchRef<'a> {
    /// `git+<url>`: every tracked `*.patch` file of the repository.
    Git(&'a str),
    /// `http://` or `https://`: a single patch file, downloaded once.
    Remote(&'a str),
    /// `file://<path>` or a bare path.
    Local(&'a Path),
}

impl<'a> PatchRef<'a> {
    pub fn classify(raw: &'a str) -> Self {
        if let Some(url) = raw.strip_prefix("git+") {
            PatchRef::Git(url)
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            PatchRef::Remote(raw)
        } else if let Some(path) = raw.strip_prefix("file://") {
            PatchRef::Local(Path::new(path))
        } else {
            PatchRef::Local(Path::new(raw))
        }
    }
}

/// Cache name for a reference: `patch-` plus a prefix of the SHA-256 of the raw string.
pub fn cache_key(raw: &str) -> String {
    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    format!("patch-{}", &digest[..16])
}

/// A resolved patch reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchSource {
    File(PathBuf),
    Repo(PathBuf),
}

pub fn acquire_patch(s: &Session, ctx: &ExecCtx, raw: &str) -> Result<PatchSource> {
    match PatchRef::classify(raw) {
        PatchRef::Git(url) => {
            let dir = s.layout.cache.join(cache_key(raw));
            if dir.exists() {
                s.tools.vcs.pull(ctx, &dir)?;
            } else {
                s.tools.vcs.clone_repo(ctx, url, &dir)?;
            }
            Ok(PatchSource::Repo(dir))
        }
        PatchRef::Remote(url) => {
            let file = s.layout.cache.join(format!("{}.patch", cache_key(raw)));
            if file.exists() {
                debug!(url, cached = %file.display(), "patch cached");
            } else {
                s.tools.downloader.download(ctx, url, &file)?;
            }
            Ok(PatchSource::File(file))
        }
        PatchRef::Local(path) => {
            // Relative paths are taken from the working root.
            let path = s.layout.root.join(path);
            if !path.is_file() {
                return Err(Error::msg(format!("patch not found: {}", path.display())));
            }
            Ok(PatchSource::File(path))
        }
    }
}

/// Applies the recipe's patches in listed order. The first failure stops the run; patches
/// already applied stay applied.
pub fn apply_patches(s: &Session, ctx: &ExecCtx, recipe: &Recipe, src_dir: &Path) -> Result<usize> {
    let mut applied = 0usize;
    for raw in &recipe.patches {
        let source = acquire_patch(s, ctx, raw).map_err(|e| {
            Error::new(e.kind(), format!("failed to acquire patch {raw}: {e}"))
        })?;
        match source {
            PatchSource::File(file) => {
                s.tools.patcher.apply(ctx, src_dir, &file)?;
                applied += 1;
            }
            PatchSource::Repo(repo) => {
                for rel in s.tools.vcs.tracked_files(ctx, &repo, "*.patch")? {
                    s.tools.patcher.apply(ctx, src_dir, &repo.join(rel))?;
                    applied += 1;
                }
            }
        }
    }
    if applied > 0 {
        ctx.ok(format!("applied {applied} patch(es)"));
    }
    Ok(applied)
}
