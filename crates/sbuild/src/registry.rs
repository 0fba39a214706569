//! Install registry under `.sbuild/installed/<id>/`.
//!
//! Each entry holds `meta.ini` (name, version, install time) and `manifest.txt`, one
//! `/`-prefixed path per line, relative to the package's staging root.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::recipe::Recipe;
use crate::recipe::ini::IniDoc;
use crate::workspace::Layout;

pub const META_FILE: &str = "meta.ini";
pub const MANIFEST_FILE: &str = "manifest.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub name: String,
    pub version: String,
    pub time: String,
}

impl Meta {
    fn render(&self) -> String {
        format!(
            "[package]\nname={}\nversion={}\ntime={}\n",
            self.name, self.version, self.time
        )
    }

    fn parse(text: &str) -> Self {
        let doc = IniDoc::parse(text);
        Self {
            name: doc.string("package", "name"),
            version: doc.string("package", "version"),
            time: doc.string("package", "time"),
        }
    }
}

/// Every regular file under `staging` (symlinks to regular files included), as sorted
/// `/`-prefixed relative paths.
pub fn scan_staging(staging: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(staging)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
        if !entry.path().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(staging)
            .map_err(|e| Error::msg(format!("failed to relativize {}: {e}", entry.path().display())))?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        out.push(format!("/{}", parts.join("/")));
    }
    Ok(out)
}

/// Writes the registry entry for `recipe` from the current contents of `staging`. A previous
/// entry for the same id is replaced.
pub fn record(layout: &Layout, recipe: &Recipe, staging: &Path) -> Result<Vec<String>> {
    let id = recipe.id();
    let entry = layout.registry_entry(&id);
    layout.remove_dir_all(&entry)?;
    fs::create_dir_all(&entry)
        .map_err(|e| Error::msg(format!("failed to create {}: {e}", entry.display())))?;

    let meta = Meta {
        name: recipe.name.clone(),
        version: recipe.version.clone(),
        time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };
    fs::write(entry.join(META_FILE), meta.render())
        .map_err(|e| Error::msg(format!("failed to write {META_FILE} for {id}: {e}")))?;

    let files = scan_staging(staging)?;
    let mut body = String::new();
    for f in &files {
        body.push_str(f);
        body.push('\n');
    }
    fs::write(entry.join(MANIFEST_FILE), body)
        .map_err(|e| Error::msg(format!("failed to write {MANIFEST_FILE} for {id}: {e}")))?;
    debug!(id = id.as_str(), files = files.len(), "registry entry recorded");
    Ok(files)
}

/// Sorted ids of all registry entries.
pub fn entries(layout: &Layout) -> Result<Vec<String>> {
    if !layout.registry.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let rd = fs::read_dir(&layout.registry)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", layout.registry.display())))?;
    for ent in rd {
        let ent = ent.map_err(|e| Error::msg(format!("read_dir error: {e}")))?;
        if ent.path().is_dir() {
            out.push(ent.file_name().to_string_lossy().into_owned());
        }
    }
    out.sort();
    Ok(out)
}

/// Resolves `name` to an entry id: an exact id first, else the first id starting with `name-`.
pub fn find_entry(layout: &Layout, name: &str) -> Result<String> {
    let ids = entries(layout)?;
    if let Some(id) = ids.iter().find(|id| id.as_str() == name) {
        return Ok(id.clone());
    }
    let prefix = format!("{name}-");
    ids.into_iter()
        .find(|id| id.starts_with(&prefix))
        .ok_or_else(|| {
            Error::new(
                ErrorKind::RegistryEntryMissing,
                format!("no registry entry for: {name}"),
            )
        })
}

pub fn read_meta(layout: &Layout, id: &str) -> Option<Meta> {
    let text = fs::read_to_string(layout.registry_entry(id).join(META_FILE)).ok()?;
    Some(Meta::parse(&text))
}

pub fn read_manifest(layout: &Layout, id: &str) -> Result<Vec<String>> {
    let path = layout.registry_entry(id).join(MANIFEST_FILE);
    let text = fs::read_to_string(&path).map_err(|e| {
        if e.kind() == IoErrorKind::NotFound {
            Error::new(ErrorKind::ManifestMissing, format!("manifest missing for: {id}"))
        } else {
            Error::msg(format!("failed to read {}: {e}", path.display()))
        }
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToOwned::to_owned)
        .collect())
}

/// Package name of an entry: `meta.ini` when readable, else the id up to its last `-`.
pub fn package_name(layout: &Layout, id: &str) -> String {
    if let Some(meta) = read_meta(layout, id)
        && !meta.name.trim().is_empty()
    {
        return meta.name;
    }
    match id.rfind('-') {
        Some(i) if i > 0 => id[..i].to_string(),
        _ => id.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Removal {
    pub id: String,
    pub staging: PathBuf,
    /// Manifest paths that existed and were deleted.
    pub removed: usize,
}

/// Deletes every manifest path from the entry's staging root, then the staging root itself.
/// The registry entry is left for [`delete_entry`].
pub fn remove_files(layout: &Layout, id: &str) -> Result<Removal> {
    let manifest = read_manifest(layout, id)?;
    let staging = layout.staging(id);
    let mut removed = 0usize;
    for line in &manifest {
        let rel = Path::new(line.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            warn!(id, path = line.as_str(), "skipping manifest path outside staging root");
            continue;
        }
        let path = staging.join(rel);
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::msg(format!(
                    "failed to remove {}: {e}",
                    path.display()
                )));
            }
        }
    }
    layout.remove_dir_all(&staging)?;
    Ok(Removal {
        id: id.to_string(),
        staging,
        removed,
    })
}

pub fn delete_entry(layout: &Layout, id: &str) -> Result<()> {
    layout.remove_dir_all(&layout.registry_entry(id))
}
