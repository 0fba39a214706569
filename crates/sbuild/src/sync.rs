use crate::error::{Result, Stage};
use crate::phase::{self, PhaseEnv};
use crate::recipe::Hooks;
use crate::session::Session;

pub const DEFAULT_MESSAGE: &str = "sbuild sync";

/// Commits and pushes the working root, then runs the global `postsync` hook.
pub fn sync(s: &Session, message: Option<&str>) -> Result<()> {
    let ctx = s.exec.with_log(s.layout.logs.join("sync.log"));
    let message = message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MESSAGE);
    s.tools
        .vcs
        .sync(&ctx, &s.layout.root, message)
        .map_err(|e| e.at(Stage::Sync))?;

    let hooks_file = s.layout.hooks_file();
    if !hooks_file.is_file() {
        return Ok(());
    }
    let hooks = Hooks::load(&hooks_file).map_err(|e| e.at(Stage::Sync))?;
    let env = PhaseEnv {
        destdir: s.layout.destdir.clone(),
        jobs: s.jobs(),
    };
    if let Err(e) = phase::run_phase(
        &ctx,
        &s.tools.shell,
        "postsync",
        &hooks.postsync,
        &s.layout.root,
        &env,
        None,
    ) {
        ctx.warn(format!("postsync hook failed: {e}"));
    }
    Ok(())
}
