#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};

use sbuild::config::SbuildConfig;
use sbuild::error::{Error, ErrorKind};
use sbuild::executor::{ChannelSink, ExecCtx};
use sbuild::recipe::PackFormat;
use sbuild::session::Session;
use sbuild::tools::{
    ArchiveExtractor, ArchiveKind, Archiver, DependencyLinter, Downloader, PatchTool,
    Sha256Checksum, Stripper, Toolbox, VcsClient,
};
use sbuild::workspace::Layout;

/// Ordered record of every fake tool call, e.g. `download https://...`.
#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
    pub fn push(&self, s: impl Into<String>) {
        self.0.lock().expect("calls lock").push(s.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().expect("calls lock").clone()
    }

    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

pub fn copy_tree(src: &Path, dst: &Path) {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.expect("walk fixture");
        let rel = entry.path().strip_prefix(src).expect("relative");
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).expect("mkdir");
        } else {
            fs::copy(entry.path(), &target).expect("copy");
        }
    }
}

/// Serves URLs from local files.
pub struct FakeDownloader {
    pub files: BTreeMap<String, PathBuf>,
    pub calls: Calls,
}

impl Downloader for FakeDownloader {
    fn download(&self, _ctx: &ExecCtx, url: &str, dest: &Path) -> sbuild::Result<()> {
        self.calls.push(format!("download {url}"));
        let Some(src) = self.files.get(url) else {
            return Err(Error::new(ErrorKind::CommandFailed, format!("404 {url}")));
        };
        fs::copy(src, dest)?;
        Ok(())
    }
}

/// "Clones" by copying a fixture directory registered for the URL.
pub struct FakeVcs {
    pub repos: BTreeMap<String, PathBuf>,
    pub calls: Calls,
}

impl VcsClient for FakeVcs {
    fn clone_repo(&self, _ctx: &ExecCtx, url: &str, dest: &Path) -> sbuild::Result<()> {
        self.calls.push(format!("clone {url}"));
        let Some(src) = self.repos.get(url) else {
            return Err(Error::new(ErrorKind::CommandFailed, format!("no repo {url}")));
        };
        copy_tree(src, dest);
        Ok(())
    }

    fn pull(&self, _ctx: &ExecCtx, repo: &Path) -> sbuild::Result<()> {
        self.calls.push(format!("pull {}", repo.display()));
        Ok(())
    }

    fn tracked_files(
        &self,
        _ctx: &ExecCtx,
        repo: &Path,
        _pattern: &str,
    ) -> sbuild::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(repo).sort_by_file_name() {
            let entry = entry.expect("walk repo");
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|e| e.to_str()) == Some("patch")
            {
                out.push(entry.path().strip_prefix(repo).expect("rel").to_path_buf());
            }
        }
        Ok(out)
    }

    fn sync(&self, _ctx: &ExecCtx, repo: &Path, message: &str) -> sbuild::Result<()> {
        self.calls.push(format!("sync {} {message}", repo.display()));
        Ok(())
    }
}

/// Treats an "archive" as a key into fixture source trees.
pub struct FakeExtractor {
    pub trees: BTreeMap<String, PathBuf>,
    pub calls: Calls,
}

impl ArchiveExtractor for FakeExtractor {
    fn extract(
        &self,
        _ctx: &ExecCtx,
        archive: &Path,
        _kind: ArchiveKind,
        dest: &Path,
    ) -> sbuild::Result<()> {
        let name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.calls.push(format!("extract {name}"));
        let src = self.trees.get(&name).expect("fixture tree for archive");
        copy_tree(src, dest);
        Ok(())
    }
}

/// Appends each patch's file name to `applied.txt`; a patch containing `FAIL` fails.
pub struct FakePatcher {
    pub calls: Calls,
}

impl PatchTool for FakePatcher {
    fn apply(&self, _ctx: &ExecCtx, src_dir: &Path, patch: &Path) -> sbuild::Result<()> {
        let name = patch
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.calls.push(format!("patch {name}"));
        let body = fs::read_to_string(patch)?;
        if body.contains("FAIL") {
            return Err(Error::new(
                ErrorKind::CommandFailed,
                "apply patch failed (exit code 1)",
            ));
        }
        let mut applied = fs::read_to_string(src_dir.join("applied.txt")).unwrap_or_default();
        applied.push_str(&name);
        applied.push('\n');
        fs::write(src_dir.join("applied.txt"), applied)?;
        Ok(())
    }
}

pub struct NoStrip;

impl Stripper for NoStrip {
    fn available(&self) -> bool {
        false
    }

    fn strip(&self, _ctx: &ExecCtx, _file: &Path) -> sbuild::Result<()> {
        Ok(())
    }
}

/// Records the name of every file it is asked to strip; `fail` makes each call fail.
pub struct RecordingStrip {
    pub calls: Calls,
    pub fail: bool,
}

impl Stripper for RecordingStrip {
    fn available(&self) -> bool {
        true
    }

    fn strip(&self, _ctx: &ExecCtx, file: &Path) -> sbuild::Result<()> {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.calls.push(format!("strip {name}"));
        if self.fail {
            return Err(Error::new(
                ErrorKind::CommandFailed,
                "strip failed (exit code 1)",
            ));
        }
        Ok(())
    }
}

/// Writes the sorted file list of the staging root instead of a real archive.
pub struct ListArchiver {
    pub calls: Calls,
}

impl Archiver for ListArchiver {
    fn pack(
        &self,
        _ctx: &ExecCtx,
        src_dir: &Path,
        format: PackFormat,
        dest: &Path,
    ) -> sbuild::Result<()> {
        self.calls.push(format!("pack {}", format.name()));
        let files = sbuild::registry::scan_staging(src_dir)?;
        fs::write(dest, files.join("\n"))?;
        Ok(())
    }
}

/// Reports any ELF whose path contains `broken` as unresolvable.
pub struct NameLinter;

impl DependencyLinter for NameLinter {
    fn check(&self, _ctx: &ExecCtx, binary: &Path) -> sbuild::Result<bool> {
        Ok(!binary.to_string_lossy().contains("broken"))
    }
}

pub struct Fixture {
    pub tmp: tempfile::TempDir,
    pub root: PathBuf,
    pub calls: Calls,
    pub downloads: BTreeMap<String, PathBuf>,
    pub repos: BTreeMap<String, PathBuf>,
    pub trees: BTreeMap<String, PathBuf>,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).expect("mkdir root");
        Self {
            tmp,
            root,
            calls: Calls::default(),
            downloads: BTreeMap::new(),
            repos: BTreeMap::new(),
            trees: BTreeMap::new(),
        }
    }

    /// Scratch area outside the working root.
    pub fn scratch(&self, rel: &str) -> PathBuf {
        let p = self.tmp.path().join("fixtures").join(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).expect("mkdir fixture parent");
        }
        p
    }

    pub fn write_recipe(&self, name: &str, body: &str) -> PathBuf {
        let dir = self.root.join("recipes").join(name);
        fs::create_dir_all(&dir).expect("mkdir recipe dir");
        let path = dir.join(format!("{name}.ini"));
        fs::write(&path, body).expect("write recipe");
        path
    }

    /// Registers `url` as a downloadable archive whose extraction yields `tree`. Returns the
    /// archive bytes' SHA-256.
    pub fn serve_archive(&mut self, url: &str, tree: &Path) -> String {
        let name = url.rsplit('/').next().expect("file name").to_string();
        let blob = self.scratch(&format!("blobs/{name}"));
        fs::write(&blob, format!("archive of {}", tree.display())).expect("write blob");
        let sum = sbuild::tools::sha256_file_hex(&blob).expect("hash blob");
        self.downloads.insert(url.to_string(), blob);
        self.trees.insert(name, tree.to_path_buf());
        sum
    }

    pub fn serve_file(&mut self, url: &str, path: &Path) {
        self.downloads.insert(url.to_string(), path.to_path_buf());
    }

    pub fn serve_repo(&mut self, url: &str, dir: &Path) {
        self.repos.insert(url.to_string(), dir.to_path_buf());
    }

    pub fn toolbox(&self) -> Toolbox {
        Toolbox {
            downloader: Box::new(FakeDownloader {
                files: self.downloads.clone(),
                calls: self.calls.clone(),
            }),
            vcs: Box::new(FakeVcs {
                repos: self.repos.clone(),
                calls: self.calls.clone(),
            }),
            extractor: Box::new(FakeExtractor {
                trees: self.trees.clone(),
                calls: self.calls.clone(),
            }),
            checksum: Box::new(Sha256Checksum),
            patcher: Box::new(FakePatcher {
                calls: self.calls.clone(),
            }),
            stripper: Box::new(NoStrip),
            archiver: Box::new(ListArchiver {
                calls: self.calls.clone(),
            }),
            linter: Box::new(NameLinter),
            shell: "sh".into(),
            fakeroot: "fakeroot".into(),
        }
    }

    pub fn session(&self) -> Session {
        self.session_with(Layout::with_defaults(&self.root), self.toolbox())
    }

    pub fn session_with(&self, layout: Layout, tools: Toolbox) -> Session {
        let (tx, _rx) = mpsc::channel();
        Session::new(
            layout,
            SbuildConfig::default(),
            tools,
            Arc::new(ChannelSink::new(tx)),
        )
        .expect("session")
    }
}

/// A tiny autotools-shaped source tree: `./configure` writes `config.out`, `build.sh` produces
/// the `foo` program.
pub fn foo_source_tree(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir).expect("mkdir source");
    let configure = dir.join("configure");
    fs::write(
        &configure,
        "#!/bin/sh\necho \"configured with $*\" > config.out\necho configure ran\n",
    )
    .expect("write configure");
    fs::set_permissions(&configure, fs::Permissions::from_mode(0o755)).expect("chmod");
    fs::write(
        dir.join("build.sh"),
        "printf '#!/bin/sh\\necho foo\\n' > foo\nchmod +x foo\n",
    )
    .expect("write build.sh");
    fs::create_dir_all(dir.join("doc")).expect("mkdir doc");
    fs::write(dir.join("doc/foo.1"), ".TH FOO 1\n").expect("write man page");
}

pub const FOO_PHASES: &str = r#"
[build]
config=./configure --prefix=/usr
build=sh build.sh
install=mkdir -p "$DESTDIR$PREFIX/bin" "$DESTDIR$PREFIX/share/man/man1" && cp foo "$DESTDIR$PREFIX/bin/foo" && cp doc/foo.1 "$DESTDIR$PREFIX/share/man/man1/foo.1"
"#;
