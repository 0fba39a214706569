use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::executor::ExecCtx;
use crate::tools::DependencyLinter;

/// ELF files under `staging` whose dependency check fails, relative to `staging`.
pub fn scan(ctx: &ExecCtx, linter: &dyn DependencyLinter, staging: &Path) -> Result<Vec<PathBuf>> {
    ctx.step("revdep", || {
        let mut broken = Vec::new();
        for entry in walkdir::WalkDir::new(staging).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
            if !entry.file_type().is_file() || !linter.is_elf(entry.path())? {
                continue;
            }
            if !linter.check(ctx, entry.path())? {
                ctx.log_line(&format!("Broken: {}", entry.path().display()))?;
                let rel = entry
                    .path()
                    .strip_prefix(staging)
                    .unwrap_or(entry.path())
                    .to_path_buf();
                broken.push(rel);
            }
        }
        Ok(broken)
    })
}
