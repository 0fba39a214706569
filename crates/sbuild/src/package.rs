use std::fs;
use std::path::PathBuf;

use crate::error::{Error, ErrorKind, Result, Stage};
use crate::executor::ExecCtx;
use crate::recipe::Recipe;
use crate::session::Session;

/// Archives `destdir/<id>` into `packages/<id>.tar.<ext>`.
pub fn pack(s: &Session, ctx: &ExecCtx, recipe: &Recipe) -> Result<PathBuf> {
    let id = recipe.id();
    let staging = s.layout.staging(&id);
    if !staging.is_dir() {
        return Err(Error::new(
            ErrorKind::NotStaged,
            format!("nothing to package for {id}: build/install first"),
        )
        .at(Stage::Package));
    }

    fs::create_dir_all(&s.layout.packages).map_err(|e| {
        Error::msg(format!("failed to create {}: {e}", s.layout.packages.display()))
            .at(Stage::Package)
    })?;
    let out = s.layout.packages.join(recipe.package_file_name());
    if let Err(e) = s.tools.archiver.pack(ctx, &staging, recipe.pack, &out) {
        let _ = fs::remove_file(&out);
        return Err(e.at(Stage::Package));
    }
    Ok(out)
}
