use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};
use crate::executor::ExecCtx;
use crate::recipe::PackFormat;

use super::{
    ArchiveExtractor, ArchiveKind, Archiver, DependencyLinter, Downloader, PatchTool, Stripper,
    VcsClient, program_on_path,
};

pub struct CurlDownloader {
    program: String,
}

impl CurlDownloader {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl Downloader for CurlDownloader {
    fn download(&self, ctx: &ExecCtx, url: &str, dest: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-L").arg("--fail").arg("-o").arg(dest).arg(url);
        let res = ctx.run_cmd("download", cmd);
        if res.is_err() && dest.exists() {
            // A partial file would be mistaken for a finished download next time.
            let _ = fs::remove_file(dest);
        }
        res
    }
}

pub struct GitClient {
    program: String,
}

impl GitClient {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    fn in_repo(&self, repo: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-C").arg(repo);
        cmd
    }
}

impl VcsClient for GitClient {
    fn clone_repo(&self, ctx: &ExecCtx, url: &str, dest: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("clone").arg(url).arg(dest);
        ctx.run_cmd("git clone", cmd)
    }

    fn pull(&self, ctx: &ExecCtx, repo: &Path) -> Result<()> {
        let mut cmd = self.in_repo(repo);
        cmd.arg("pull").arg("--rebase");
        ctx.run_cmd("git pull", cmd)
    }

    fn tracked_files(&self, ctx: &ExecCtx, repo: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        let mut cmd = self.in_repo(repo);
        cmd.arg("ls-files").arg("--").arg(pattern);
        let lines = ctx.capture_cmd("git ls-files", cmd)?;
        Ok(lines
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    fn sync(&self, ctx: &ExecCtx, repo: &Path, message: &str) -> Result<()> {
        let mut add = self.in_repo(repo);
        add.arg("add").arg("-A");
        ctx.run_cmd("git add", add)?;

        let mut commit = self.in_repo(repo);
        commit.arg("commit").arg("-m").arg(message);
        let out = ctx.probe_cmd("git commit", commit)?;
        if out.code != Some(0) {
            ctx.info("nothing committed (see log)");
        }

        let mut push = self.in_repo(repo);
        push.arg("push");
        ctx.run_cmd("git push", push)
    }
}

pub struct TarExtractor {
    tar: String,
    unzip: String,
}

impl TarExtractor {
    pub fn new(tar: &str, unzip: &str) -> Self {
        Self {
            tar: tar.to_string(),
            unzip: unzip.to_string(),
        }
    }

    fn extract_zip(&self, ctx: &ExecCtx, archive: &Path, dest: &Path) -> Result<()> {
        let parent = dest
            .parent()
            .ok_or_else(|| Error::msg(format!("invalid extract dir: {}", dest.display())))?;
        // Unpack next to dest so the final moves are plain renames on one filesystem.
        let tmp = tempfile::Builder::new()
            .prefix(".sbuild-unzip-")
            .tempdir_in(parent)
            .map_err(|e| Error::msg(format!("failed to create temp dir in {}: {e}", parent.display())))?;

        let mut cmd = Command::new(&self.unzip);
        cmd.arg("-q").arg(archive).arg("-d").arg(tmp.path());
        ctx.run_cmd("extract", cmd)?;

        strip_one_level(tmp.path(), dest)
    }
}

impl ArchiveExtractor for TarExtractor {
    fn extract(&self, ctx: &ExecCtx, archive: &Path, kind: ArchiveKind, dest: &Path) -> Result<()> {
        let Some(flag) = kind.tar_flag() else {
            return self.extract_zip(ctx, archive, dest);
        };
        let mut cmd = Command::new(&self.tar);
        cmd.arg(flag)
            .arg("-xf")
            .arg(archive)
            .arg("-C")
            .arg(dest)
            .arg("--strip-components=1");
        ctx.run_cmd("extract", cmd)
    }
}

/// Moves the children of every top-level directory in `unpacked` into `dest`, the equivalent of
/// tar's `--strip-components=1`. Top-level plain files are dropped.
pub fn strip_one_level(unpacked: &Path, dest: &Path) -> Result<()> {
    let entries = fs::read_dir(unpacked)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", unpacked.display())))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::msg(format!("read_dir error: {e}")))?;
        let ft = entry
            .file_type()
            .map_err(|e| Error::msg(format!("failed to stat {}: {e}", entry.path().display())))?;
        if !ft.is_dir() {
            continue;
        }
        let children = fs::read_dir(entry.path())
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", entry.path().display())))?;
        for child in children {
            let child = child.map_err(|e| Error::msg(format!("read_dir error: {e}")))?;
            merge_move(&child.path(), &dest.join(child.file_name()))?;
        }
    }
    Ok(())
}

fn merge_move(src: &Path, dst: &Path) -> Result<()> {
    if dst.is_dir() && src.is_dir() {
        let children = fs::read_dir(src)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", src.display())))?;
        for child in children {
            let child = child.map_err(|e| Error::msg(format!("read_dir error: {e}")))?;
            merge_move(&child.path(), &dst.join(child.file_name()))?;
        }
        return Ok(());
    }
    if dst.is_file() {
        fs::remove_file(dst)
            .map_err(|e| Error::msg(format!("failed to replace {}: {e}", dst.display())))?;
    }
    fs::rename(src, dst).map_err(|e| {
        Error::msg(format!(
            "failed to move {} -> {}: {e}",
            src.display(),
            dst.display()
        ))
    })
}

pub struct GnuPatch {
    program: String,
}

impl GnuPatch {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl PatchTool for GnuPatch {
    fn apply(&self, ctx: &ExecCtx, src_dir: &Path, patch: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-p1").arg("-i").arg(patch).current_dir(src_dir);
        ctx.run_cmd("apply patch", cmd)
    }
}

pub struct StripTool {
    program: String,
}

impl StripTool {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl Stripper for StripTool {
    fn available(&self) -> bool {
        program_on_path(&self.program)
    }

    fn strip(&self, ctx: &ExecCtx, file: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-s").arg(file);
        ctx.run_quiet("strip", cmd)
    }
}

pub struct TarArchiver {
    program: String,
}

impl TarArchiver {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl Archiver for TarArchiver {
    fn pack(&self, ctx: &ExecCtx, src_dir: &Path, format: PackFormat, dest: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(format.tar_flag())
            .arg("-C")
            .arg(src_dir)
            .arg("-cf")
            .arg(dest)
            .arg(".");
        ctx.run_cmd("package", cmd)
    }
}

pub struct LddLinter {
    program: String,
}

impl LddLinter {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl DependencyLinter for LddLinter {
    fn check(&self, ctx: &ExecCtx, binary: &Path) -> Result<bool> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(binary);
        let out = ctx.probe_cmd("ldd", cmd)?;
        Ok(out.code == Some(0))
    }
}
