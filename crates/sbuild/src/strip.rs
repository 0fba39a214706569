use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::ExecCtx;
use crate::tools::{Stripper, is_elf_file};

/// Strips every regular ELF file under `staging`. Returns the number of files stripped; a
/// missing strip program is a warning and strips nothing.
pub fn strip_tree(ctx: &ExecCtx, stripper: &dyn Stripper, staging: &Path) -> Result<usize> {
    if !stripper.available() {
        ctx.warn("strip not found, skipping");
        return Ok(0);
    }
    ctx.step("strip", || {
        let mut n = 0usize;
        for entry in walkdir::WalkDir::new(staging).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
            if !entry.file_type().is_file() || !is_elf_file(entry.path())? {
                continue;
            }
            stripper.strip(ctx, entry.path())?;
            n += 1;
        }
        debug!(staging = %staging.display(), stripped = n, "strip done");
        Ok(n)
    })
}
