//! Capability interfaces over the external programs sbuild drives.
//!
//! Every heavy operation (download, clone, extract, patch, strip, archive,
//! dependency check) goes through one of these traits. The default
//! implementations in [`system`] shell out with explicit argument lists;
//! tests and future in-process implementations plug in through [`Toolbox`].

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::{DownloaderKind, ToolsConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::executor::ExecCtx;
use crate::recipe::PackFormat;

pub mod http;
pub mod system;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarZstd,
    TarXz,
    TarBzip2,
    TarGzip,
    Zip,
}

impl ArchiveKind {
    pub fn detect(file_name: &str) -> Result<Self> {
        let f = file_name.to_ascii_lowercase();
        if f.ends_with(".tar.zst") || f.ends_with(".tzst") {
            Ok(ArchiveKind::TarZstd)
        } else if f.ends_with(".tar.xz") || f.ends_with(".txz") {
            Ok(ArchiveKind::TarXz)
        } else if f.ends_with(".tar.bz2") || f.ends_with(".tbz2") {
            Ok(ArchiveKind::TarBzip2)
        } else if f.ends_with(".tar.gz") || f.ends_with(".tgz") {
            Ok(ArchiveKind::TarGzip)
        } else if f.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else {
            Err(Error::new(
                ErrorKind::UnknownArchive,
                format!("unknown archive type: {file_name}"),
            ))
        }
    }

    /// Decompression flag handed to tar; `None` for zip.
    pub fn tar_flag(self) -> Option<&'static str> {
        match self {
            ArchiveKind::TarZstd => Some("--zstd"),
            ArchiveKind::TarXz => Some("-J"),
            ArchiveKind::TarBzip2 => Some("-j"),
            ArchiveKind::TarGzip => Some("-z"),
            ArchiveKind::Zip => None,
        }
    }
}

pub trait Downloader {
    fn download(&self, ctx: &ExecCtx, url: &str, dest: &Path) -> Result<()>;
}

pub trait VcsClient {
    fn clone_repo(&self, ctx: &ExecCtx, url: &str, dest: &Path) -> Result<()>;
    fn pull(&self, ctx: &ExecCtx, repo: &Path) -> Result<()>;
    /// Tracked files matching `pattern`, relative to `repo`, in the client's listing order.
    fn tracked_files(&self, ctx: &ExecCtx, repo: &Path, pattern: &str) -> Result<Vec<PathBuf>>;
    /// Stages everything, commits with `message` (an empty commit is tolerated) and pushes.
    fn sync(&self, ctx: &ExecCtx, repo: &Path, message: &str) -> Result<()>;
}

pub trait ArchiveExtractor {
    /// Unpacks `archive` into the existing, empty `dest`, dropping the archive's top-level directory.
    fn extract(&self, ctx: &ExecCtx, archive: &Path, kind: ArchiveKind, dest: &Path) -> Result<()>;
}

pub trait ChecksumProvider {
    fn sha256(&self, path: &Path) -> Result<String>;
}

pub trait PatchTool {
    /// Applies a unified diff to `src_dir` with one leading path component stripped.
    fn apply(&self, ctx: &ExecCtx, src_dir: &Path, patch: &Path) -> Result<()>;
}

pub trait Stripper {
    fn available(&self) -> bool;
    fn strip(&self, ctx: &ExecCtx, file: &Path) -> Result<()>;
}

pub trait Archiver {
    /// Archives the contents of `src_dir` (not the directory itself) into `dest`.
    fn pack(&self, ctx: &ExecCtx, src_dir: &Path, format: PackFormat, dest: &Path) -> Result<()>;
}

pub trait DependencyLinter {
    fn is_elf(&self, path: &Path) -> Result<bool> {
        is_elf_file(path)
    }

    /// `Ok(false)` when the dependency checker itself fails for `binary`.
    fn check(&self, ctx: &ExecCtx, binary: &Path) -> Result<bool>;
}

pub struct Sha256Checksum;

impl ChecksumProvider for Sha256Checksum {
    fn sha256(&self, path: &Path) -> Result<String> {
        sha256_file_hex(path)
    }
}

/// One implementation per capability, plus the shell and privilege wrapper used for phases.
pub struct Toolbox {
    pub downloader: Box<dyn Downloader>,
    pub vcs: Box<dyn VcsClient>,
    pub extractor: Box<dyn ArchiveExtractor>,
    pub checksum: Box<dyn ChecksumProvider>,
    pub patcher: Box<dyn PatchTool>,
    pub stripper: Box<dyn Stripper>,
    pub archiver: Box<dyn Archiver>,
    pub linter: Box<dyn DependencyLinter>,
    pub shell: String,
    pub fakeroot: String,
}

impl Toolbox {
    pub fn system(cfg: &ToolsConfig) -> Self {
        let downloader: Box<dyn Downloader> = match cfg.downloader {
            DownloaderKind::Curl => Box::new(system::CurlDownloader::new(&cfg.curl)),
            DownloaderKind::Builtin => Box::new(http::HttpDownloader),
        };
        Self {
            downloader,
            vcs: Box::new(system::GitClient::new(&cfg.git)),
            extractor: Box::new(system::TarExtractor::new(&cfg.tar, &cfg.unzip)),
            checksum: Box::new(Sha256Checksum),
            patcher: Box::new(system::GnuPatch::new(&cfg.patch)),
            stripper: Box::new(system::StripTool::new(&cfg.strip)),
            archiver: Box::new(system::TarArchiver::new(&cfg.tar)),
            linter: Box::new(system::LddLinter::new(&cfg.ldd)),
            shell: cfg.shell.clone(),
            fakeroot: cfg.fakeroot.clone(),
        }
    }
}

pub fn sha256_file_hex(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let mut file = File::open(path)
        .map_err(|e| Error::msg(format!("failed to open {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 1024 * 256];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Whether `path` starts with the ELF magic. A file the current user may not read counts as
/// not ELF.
pub fn is_elf_file(path: &Path) -> Result<bool> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            warn!(path = %path.display(), "unreadable file, treating as non-ELF");
            return Ok(false);
        }
        Err(e) => return Err(Error::msg(format!("failed to open {}: {e}", path.display()))),
    };
    let mut magic = [0u8; 4];
    match f.read_exact(&mut magic) {
        Ok(()) => Ok(magic == ELF_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(Error::msg(format!("failed to read {}: {e}", path.display()))),
    }
}

/// Resolves a program name the way the shell would: names with a slash are paths, others are
/// looked up in `PATH`.
pub fn program_on_path(program: &str) -> bool {
    if program.contains('/') {
        return Path::new(program).is_file();
    }
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(program);
        fs::metadata(&candidate)
            .map(|m| m.is_file())
            .unwrap_or(false)
    })
}
