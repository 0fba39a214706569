//! One function per CLI verb. Each returns the crate error, whose stage decides the exit code.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Error, ErrorKind, Result, Stage};
use crate::executor::ExecCtx;
use crate::phase::{self, PhaseEnv};
use crate::recipe::{self, Recipe};
use crate::registry::{self, Removal};
use crate::session::Session;
use crate::{package, patch, revdep, source, strip, ui};

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Strip even when the recipe says `strip=no`.
    pub force_strip: bool,
    /// Run the advisory dependency lint after recording.
    pub revdep: bool,
}

#[derive(Debug, Clone)]
pub struct Installed {
    pub id: String,
    pub staging: PathBuf,
    pub files: Vec<String>,
    pub broken: Vec<PathBuf>,
}

pub fn new_recipe(s: &Session, name: &str) -> Result<PathBuf> {
    let (path, created) = recipe::scaffold(&s.layout, name)?;
    if created {
        s.exec.ok(format!("created recipe scaffold at {}", path.display()));
    } else {
        s.exec.info(format!("recipe already exists: {}", path.display()));
    }
    Ok(path)
}

/// Human-readable summary of a recipe.
pub fn describe(r: &Recipe) -> Vec<String> {
    let mut out = vec![format!("{} {}", ui::heading(&r.name), r.version)];
    if !r.description.is_empty() {
        out.push(r.description.clone());
    }
    if !r.homepage.is_empty() {
        out.push(format!("homepage: {}", r.homepage));
    }
    if !r.license.is_empty() {
        out.push(format!("license:  {}", r.license));
    }
    if let Some(src) = r.source.as_deref() {
        out.push(format!("source:   {src}"));
    }
    if let Some(git) = r.git.as_deref() {
        out.push(format!("git:      {git}"));
    }
    if !r.patches.is_empty() {
        out.push(format!("patches:  {}", r.patches.len()));
    }
    let yn = |b: bool| if b { "yes" } else { "no" };
    out.push(format!(
        "strip: {}, fakeroot: {}, pack: {}",
        yn(r.strip),
        yn(r.fakeroot),
        r.pack.name()
    ));
    out
}

pub fn info(s: &Session, name: &str) -> Result<()> {
    let r = recipe::load_recipe(&s.layout, name)?;
    for line in describe(&r) {
        println!("{line}");
    }
    Ok(())
}

pub fn search(s: &Session, term: &str) -> Result<Vec<String>> {
    let hits = recipe::search(&s.layout, term)?;
    if hits.is_empty() {
        s.exec.warn("no matches");
    }
    for h in &hits {
        println!("{h}");
    }
    Ok(hits)
}

/// Fetch, extract and patch. Returns the source tree the phases run in.
pub fn prepare(s: &Session, ctx: &ExecCtx, r: &Recipe) -> Result<PathBuf> {
    let acquired = source::acquire(s, ctx, r).map_err(|e| e.at(Stage::Fetch))?;
    let src_dir = source::extract(s, ctx, r, &acquired).map_err(|e| e.at(Stage::Extract))?;
    patch::apply_patches(s, ctx, r, &src_dir).map_err(|e| e.at(Stage::Patch))?;
    Ok(src_dir)
}

pub fn fetch_extract_patch(s: &Session, name: &str) -> Result<PathBuf> {
    let r = recipe::load_recipe(&s.layout, name)?;
    let ctx = s.package_ctx(&r.id());
    let src_dir = prepare(s, &ctx, &r)?;
    ctx.ok(format!("fetch+extract+patch complete: {}", src_dir.display()));
    Ok(src_dir)
}

/// Full pipeline: prepare, fresh staging root, phases, optional strip, registry record and the
/// optional dependency lint.
pub fn build_install(s: &Session, name: &str, opts: BuildOptions) -> Result<Installed> {
    let r = recipe::load_recipe(&s.layout, name)?;
    let id = r.id();
    let ctx = s.package_ctx(&id);
    info!(id = id.as_str(), "build+install");

    let src_dir = prepare(s, &ctx, &r)?;

    let staging = s.layout.staging(&id);
    s.layout
        .remove_dir_all(&staging)
        .map_err(|e| e.at(Stage::Install))?;
    fs::create_dir_all(&staging).map_err(|e| {
        Error::msg(format!("failed to create {}: {e}", staging.display())).at(Stage::Install)
    })?;

    let env = PhaseEnv {
        destdir: staging.clone(),
        jobs: s.jobs(),
    };
    phase::run_pipeline(&ctx, &s.tools.shell, &s.tools.fakeroot, &r, &src_dir, &env)?;

    if opts.force_strip || r.strip {
        strip::strip_tree(&ctx, s.tools.stripper.as_ref(), &staging)
            .map_err(|e| e.at(Stage::Strip))?;
    }

    let files = registry::record(&s.layout, &r, &staging).map_err(|e| e.at(Stage::Record))?;

    let mut broken = Vec::new();
    if opts.revdep {
        match revdep::scan(&ctx, s.tools.linter.as_ref(), &staging) {
            Ok(b) if b.is_empty() => {}
            Ok(b) => {
                ctx.warn(format!("revdep found {} broken binaries (see log)", b.len()));
                broken = b;
            }
            Err(e) => ctx.warn(format!("revdep failed: {e}")),
        }
    }

    ctx.ok(format!("installed to DESTDIR: {}", staging.display()));
    Ok(Installed {
        id,
        staging,
        files,
        broken,
    })
}

pub fn package(s: &Session, name: &str) -> Result<PathBuf> {
    let r = recipe::load_recipe(&s.layout, name)?;
    let ctx = s.package_ctx(&r.id());
    let out = package::pack(s, &ctx, &r)?;
    ctx.ok(format!("package: {}", out.display()));
    Ok(out)
}

/// Undoes an install from its manifest, runs the recipe's `postremove` hook and drops the
/// registry entry.
pub fn remove(s: &Session, name: &str) -> Result<Removal> {
    let id = registry::find_entry(&s.layout, name)?;
    let ctx = s.package_ctx(&id);
    let removal = registry::remove_files(&s.layout, &id)?;
    ctx.ok(format!(
        "removed files from DESTDIR for {id}: {}",
        removal.removed
    ));

    let pkg = registry::package_name(&s.layout, &id);
    match recipe::load_recipe(&s.layout, &pkg) {
        Ok(r) if !r.hooks.postremove.trim().is_empty() => {
            let env = PhaseEnv {
                destdir: removal.staging.clone(),
                jobs: s.jobs(),
            };
            if let Err(e) = phase::run_phase(
                &ctx,
                &s.tools.shell,
                "postremove",
                &r.hooks.postremove,
                &s.layout.root,
                &env,
                None,
            ) {
                ctx.warn(format!("postremove hook failed: {e}"));
            }
        }
        Ok(_) => {}
        Err(e) => debug!(package = pkg.as_str(), error = %e, "no recipe for postremove hook"),
    }

    registry::delete_entry(&s.layout, &id)?;
    Ok(removal)
}

/// Explicit dependency lint. Broken binaries make this an error.
pub fn revdep(s: &Session, name: &str) -> Result<()> {
    let r = recipe::load_recipe(&s.layout, name)?;
    let id = r.id();
    let staging = s.layout.staging(&id);
    if !staging.is_dir() {
        return Err(Error::new(
            ErrorKind::NotStaged,
            format!("nothing installed in DESTDIR for {id}"),
        ));
    }
    let ctx = s.package_ctx(&id);
    let broken = revdep::scan(&ctx, s.tools.linter.as_ref(), &staging)
        .map_err(|e| e.at(Stage::Revdep))?;
    if broken.is_empty() {
        ctx.ok(format!("{id}: no broken binaries"));
        return Ok(());
    }
    for b in &broken {
        ctx.warn(format!("broken: /{}", b.display()));
    }
    Err(Error::new(
        ErrorKind::CommandFailed,
        format!(
            "{} binaries with unresolved dependencies in {id} (see log)",
            broken.len()
        ),
    )
    .at(Stage::Revdep))
}
