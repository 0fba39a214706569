use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind, Result};
use crate::workspace::Layout;

pub mod ini;

use ini::IniDoc;

/// Archive compression used by `package`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PackFormat {
    Zstd,
    Xz,
    #[default]
    Gzip,
}

impl PackFormat {
    /// Unknown or empty values fall back to gzip.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zst" | "zstd" => PackFormat::Zstd,
            "xz" => PackFormat::Xz,
            _ => PackFormat::Gzip,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            PackFormat::Zstd => "tar.zst",
            PackFormat::Xz => "tar.xz",
            PackFormat::Gzip => "tar.gz",
        }
    }

    pub fn tar_flag(self) -> &'static str {
        match self {
            PackFormat::Zstd => "--zstd",
            PackFormat::Xz => "-J",
            PackFormat::Gzip => "-z",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PackFormat::Zstd => "zst",
            PackFormat::Xz => "xz",
            PackFormat::Gzip => "gz",
        }
    }
}

/// Shell command lines for the five build phases. Empty means "skip".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Phases {
    pub preconfig: String,
    pub config: String,
    pub build: String,
    pub install: String,
    pub postinstall: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hooks {
    pub postremove: String,
    pub postsync: String,
}

impl Hooks {
    fn from_ini(doc: &IniDoc) -> Self {
        Self {
            postremove: doc.string("hooks", "postremove"),
            postsync: doc.string("hooks", "postsync"),
        }
    }

    /// Reads only the `[hooks]` section of a file (used for the global hooks file).
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
        Ok(Self::from_ini(&IniDoc::parse(&text)))
    }
}

/// Where a recipe's source comes from. A git URL wins over an archive URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin<'a> {
    Git(&'a str),
    Archive(&'a str),
    Undefined,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    pub homepage: String,
    pub description: String,
    pub license: String,
    pub source: Option<String>,
    pub git: Option<String>,
    pub checksum: Option<String>,
    pub patches: Vec<String>,
    pub strip: bool,
    pub fakeroot: bool,
    pub pack: PackFormat,
    pub phases: Phases,
    pub hooks: Hooks,
}

impl Recipe {
    pub fn parse(text: &str) -> Result<Self> {
        let doc = IniDoc::parse(text);
        let name = doc.non_empty("package", "name").ok_or_else(|| {
            Error::new(ErrorKind::RecipeInvalid, "recipe has no [package] name")
        })?;

        let patches = doc
            .get("package", "patches")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            name,
            version: doc.string("package", "version").trim().to_string(),
            homepage: doc.string("package", "homepage"),
            description: doc.string("package", "desc"),
            license: doc.string("package", "license"),
            source: doc.non_empty("package", "source"),
            git: doc.non_empty("package", "git"),
            checksum: doc
                .non_empty("package", "checksum")
                .map(|c| c.to_ascii_lowercase()),
            patches,
            strip: doc
                .get("package", "strip")
                .map(parse_truthy)
                .unwrap_or(false),
            fakeroot: doc
                .get("package", "fakeroot")
                .map(|v| !parse_falsy(v))
                .unwrap_or(true),
            pack: doc
                .get("package", "pack")
                .map(PackFormat::parse)
                .unwrap_or_default(),
            phases: Phases {
                preconfig: doc.string("build", "preconfig"),
                config: doc.string("build", "config"),
                build: doc.string("build", "build"),
                install: doc.string("build", "install"),
                postinstall: doc.string("build", "postinstall"),
            },
            hooks: Hooks::from_ini(&doc),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::msg(format!("failed to read recipe {}: {e}", path.display())))?;
        Self::parse(&text).map_err(|e| {
            Error::new(
                e.kind(),
                format!("invalid recipe {}: {e}", path.display()),
            )
        })
    }

    /// Package key, `name-version`.
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn origin(&self) -> SourceOrigin<'_> {
        if let Some(git) = self.git.as_deref() {
            SourceOrigin::Git(git)
        } else if let Some(url) = self.source.as_deref() {
            SourceOrigin::Archive(url)
        } else {
            SourceOrigin::Undefined
        }
    }

    pub fn package_file_name(&self) -> String {
        format!("{}.{}", self.id(), self.pack.extension())
    }
}

fn parse_truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_falsy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no")
}

/// Finds a recipe: `recipes/<name>/<name>.ini` first, then any `.ini` whose file name contains
/// `name`.
pub fn find_recipe(layout: &Layout, name: &str) -> Result<PathBuf> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::new(ErrorKind::Usage, "empty recipe name"));
    }
    let exact = layout.recipes.join(name).join(format!("{name}.ini"));
    if exact.is_file() {
        return Ok(exact);
    }
    recipe_files(layout)?
        .into_iter()
        .find(|p| file_name_of(p).contains(name))
        .ok_or_else(|| Error::new(ErrorKind::RecipeNotFound, format!("recipe not found: {name}")))
}

pub fn load_recipe(layout: &Layout, name: &str) -> Result<Recipe> {
    Recipe::load(&find_recipe(layout, name)?)
}

/// Recipe file names containing `term`, sorted.
pub fn search(layout: &Layout, term: &str) -> Result<Vec<String>> {
    let mut out: Vec<String> = recipe_files(layout)?
        .iter()
        .map(|p| file_name_of(p))
        .filter(|f| f.contains(term))
        .collect();
    out.sort();
    Ok(out)
}

fn recipe_files(layout: &Layout) -> Result<Vec<PathBuf>> {
    if !layout.recipes.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(&layout.recipes).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_ini = entry
            .path()
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext == "ini")
            .unwrap_or(false);
        if is_ini {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

fn file_name_of(p: &Path) -> String {
    p.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Writes `recipes/<name>/<name>.ini` from the template. Returns the path and whether it was
/// created (an existing recipe is left untouched).
pub fn scaffold(layout: &Layout, name: &str) -> Result<(PathBuf, bool)> {
    let name = name.trim();
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(Error::new(
            ErrorKind::Usage,
            format!("invalid recipe name '{name}'"),
        ));
    }
    let dir = layout.recipes.join(name);
    fs::create_dir_all(&dir)
        .map_err(|e| Error::msg(format!("failed to create {}: {e}", dir.display())))?;
    let path = dir.join(format!("{name}.ini"));
    if path.exists() {
        return Ok((path, false));
    }
    fs::write(&path, template(name))
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))?;
    Ok((path, true))
}

fn template(name: &str) -> String {
    format!(
        r#"# sbuild recipe
[package]
name={name}
version=1.0.0
homepage=https://example.org
license=MIT
desc=Short description.
# one of: source= (archive URL) or git= (repository URL)
source=
# git=
# sha256 of the source archive (source= only)
checksum=
# comma-separated: https://..., git+https://..., file:///path or a local path
patches=
strip=true
fakeroot=true
# zst | xz | gz
pack=zst

[build]
# Run in the extracted source tree with DESTDIR, PREFIX (/usr), JOBS and MAKEFLAGS set.
preconfig=
config=./configure --prefix=/usr
build=make -j$JOBS
install=make DESTDIR="$DESTDIR" install
postinstall=

[hooks]
postremove=
postsync=
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOO: &str = r#"
[package]
name=foo
version=1.0.0
desc="Foo tools"
source=https://example.org/foo-1.0.0.tar.gz
checksum=ABCDEF
patches= https://example.org/a.patch , git+https://example.org/p.git,,local.patch
strip=yes
fakeroot=no
pack=xz

[build]
config=./configure --prefix=/usr
build=make
install=make DESTDIR=$DESTDIR install

[hooks]
postremove=ldconfig
"#;

    #[test]
    fn parses_all_sections() {
        let r = Recipe::parse(FOO).expect("parse");
        assert_eq!(r.id(), "foo-1.0.0");
        assert_eq!(r.description, "Foo tools");
        assert_eq!(r.checksum.as_deref(), Some("abcdef"));
        assert_eq!(
            r.patches,
            vec![
                "https://example.org/a.patch",
                "git+https://example.org/p.git",
                "local.patch"
            ]
        );
        assert!(r.strip);
        assert!(!r.fakeroot);
        assert_eq!(r.pack, PackFormat::Xz);
        assert_eq!(r.phases.build, "make");
        assert_eq!(r.phases.preconfig, "");
        assert_eq!(r.hooks.postremove, "ldconfig");
        assert_eq!(
            r.origin(),
            SourceOrigin::Archive("https://example.org/foo-1.0.0.tar.gz")
        );
        assert_eq!(r.package_file_name(), "foo-1.0.0.tar.xz");
    }

    #[test]
    fn missing_name_is_invalid() {
        let err = Recipe::parse("[package]\nversion=1.0\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecipeInvalid);
        let err = Recipe::parse("[package]\nname=\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecipeInvalid);
    }

    #[test]
    fn defaults_for_minimal_recipe() {
        let r = Recipe::parse("[package]\nname=bar\n").expect("parse");
        assert!(!r.strip);
        assert!(r.fakeroot);
        assert_eq!(r.pack, PackFormat::Gzip);
        assert!(r.patches.is_empty());
        assert_eq!(r.origin(), SourceOrigin::Undefined);
    }

    #[test]
    fn git_wins_over_archive() {
        let r = Recipe::parse(
            "[package]\nname=baz\nsource=https://x/baz.tar.gz\ngit=https://x/baz.git\n",
        )
        .expect("parse");
        assert_eq!(r.origin(), SourceOrigin::Git("https://x/baz.git"));
    }

    #[test]
    fn unknown_pack_falls_back_to_gzip() {
        assert_eq!(PackFormat::parse("lz4"), PackFormat::Gzip);
        assert_eq!(PackFormat::parse("zstd"), PackFormat::Zstd);
    }

    #[test]
    fn lookup_prefers_exact_directory_then_substring() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = Layout::with_defaults(tmp.path());
        fs::create_dir_all(layout.recipes.join("libfoo")).expect("mkdir");
        fs::create_dir_all(layout.recipes.join("foo")).expect("mkdir");
        fs::write(layout.recipes.join("libfoo/libfoo.ini"), "[package]\nname=libfoo\n")
            .expect("write");
        fs::write(layout.recipes.join("foo/foo.ini"), "[package]\nname=foo\n").expect("write");

        let exact = find_recipe(&layout, "foo").expect("exact");
        assert_eq!(exact, layout.recipes.join("foo/foo.ini"));

        let fuzzy = find_recipe(&layout, "libf").expect("fuzzy");
        assert_eq!(fuzzy, layout.recipes.join("libfoo/libfoo.ini"));

        let err = find_recipe(&layout, "nothing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecipeNotFound);
        assert!(err.to_string().contains("recipe not found"));
    }

    #[test]
    fn search_lists_matching_file_names() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = Layout::with_defaults(tmp.path());
        scaffold(&layout, "zlib").expect("zlib");
        scaffold(&layout, "zstd").expect("zstd");
        scaffold(&layout, "bash").expect("bash");
        assert_eq!(
            search(&layout, "z").expect("search"),
            vec!["zlib.ini".to_string(), "zstd.ini".to_string()]
        );
        assert!(search(&layout, "perl").expect("search").is_empty());
    }

    #[test]
    fn scaffold_never_overwrites() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = Layout::with_defaults(tmp.path());
        let (path, created) = scaffold(&layout, "zlib").expect("scaffold");
        assert!(created);
        let r = Recipe::load(&path).expect("template parses");
        assert_eq!(r.name, "zlib");
        assert_eq!(r.pack, PackFormat::Zstd);

        fs::write(&path, "[package]\nname=zlib\nversion=9\n").expect("edit");
        let (_, created) = scaffold(&layout, "zlib").expect("scaffold again");
        assert!(!created);
        assert_eq!(Recipe::load(&path).expect("load").version, "9");
    }
}
