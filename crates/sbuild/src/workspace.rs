use std::fs;
use std::path::Component;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const STATE_DIR: &str = ".sbuild";

fn default_recipes_dir() -> String {
    "recipes".into()
}

fn default_sources_dir() -> String {
    "sources".into()
}

fn default_work_dir() -> String {
    "work".into()
}

fn default_destdir_dir() -> String {
    "destdir".into()
}

fn default_packages_dir() -> String {
    "packages".into()
}

fn default_logs_dir() -> String {
    "logs".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    #[serde(default = "default_recipes_dir")]
    pub recipes_dir: String,
    #[serde(default = "default_sources_dir")]
    pub sources_dir: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_destdir_dir")]
    pub destdir_dir: String,
    #[serde(default = "default_packages_dir")]
    pub packages_dir: String,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            recipes_dir: default_recipes_dir(),
            sources_dir: default_sources_dir(),
            work_dir: default_work_dir(),
            destdir_dir: default_destdir_dir(),
            packages_dir: default_packages_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

/// Directory layout of one working root. Built once per invocation and passed to every operation.
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub recipes: PathBuf,
    pub sources: PathBuf,
    pub work: PathBuf,
    pub destdir: PathBuf,
    pub packages: PathBuf,
    pub logs: PathBuf,
    pub state: PathBuf,
    pub registry: PathBuf,
    pub cache: PathBuf,
}

impl Layout {
    pub fn new(root: &Path, cfg: &WorkspaceConfig) -> Result<Self> {
        let root = root.to_path_buf();
        let state = root.join(STATE_DIR);
        Ok(Self {
            recipes: resolve_user_dir(&root, &cfg.recipes_dir)?,
            sources: resolve_user_dir(&root, &cfg.sources_dir)?,
            work: resolve_user_dir(&root, &cfg.work_dir)?,
            destdir: resolve_user_dir(&root, &cfg.destdir_dir)?,
            packages: resolve_user_dir(&root, &cfg.packages_dir)?,
            logs: resolve_user_dir(&root, &cfg.logs_dir)?,
            registry: state.join("installed"),
            cache: state.join("cache"),
            state,
            root,
        })
    }

    /// Layout with the stock directory names under `root`.
    pub fn with_defaults(root: &Path) -> Self {
        let root = root.to_path_buf();
        let state = root.join(STATE_DIR);
        Self {
            recipes: root.join("recipes"),
            sources: root.join("sources"),
            work: root.join("work"),
            destdir: root.join("destdir"),
            packages: root.join("packages"),
            logs: root.join("logs"),
            registry: state.join("installed"),
            cache: state.join("cache"),
            state,
            root,
        }
    }

    /// Same layout with every path anchored at the current directory. Phases and patches run
    /// with the source tree as their working directory, so a relative root would point inside it.
    pub fn absolute(&self) -> Result<Self> {
        let abs = |p: &Path| {
            std::path::absolute(p)
                .map_err(|e| Error::msg(format!("failed to resolve {}: {e}", p.display())))
        };
        Ok(Self {
            root: abs(&self.root)?,
            recipes: abs(&self.recipes)?,
            sources: abs(&self.sources)?,
            work: abs(&self.work)?,
            destdir: abs(&self.destdir)?,
            packages: abs(&self.packages)?,
            logs: abs(&self.logs)?,
            state: abs(&self.state)?,
            registry: abs(&self.registry)?,
            cache: abs(&self.cache)?,
        })
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.recipes,
            &self.sources,
            &self.work,
            &self.destdir,
            &self.packages,
            &self.logs,
            &self.registry,
            &self.cache,
        ] {
            fs::create_dir_all(dir)
                .map_err(|e| Error::msg(format!("failed to create {}: {e}", dir.display())))?;
        }
        Ok(())
    }

    pub fn source_checkout(&self, id: &str) -> PathBuf {
        self.sources.join(id)
    }

    pub fn work_tree(&self, id: &str) -> PathBuf {
        self.work.join(id)
    }

    pub fn staging(&self, id: &str) -> PathBuf {
        self.destdir.join(id)
    }

    pub fn log_file(&self, id: &str) -> PathBuf {
        self.logs.join(format!("{id}.log"))
    }

    pub fn registry_entry(&self, id: &str) -> PathBuf {
        self.registry.join(id)
    }

    pub fn hooks_file(&self) -> PathBuf {
        self.state.join("hooks.ini")
    }

    pub fn config_file(&self) -> PathBuf {
        self.state.join("config.toml")
    }

    /// Removes `dir` recursively, refusing anything that resolves outside the working root.
    pub fn remove_dir_all(&self, dir: &Path) -> Result<()> {
        safe_remove_dir_all(&self.root, dir)
    }
}

fn resolve_user_dir(root: &Path, p: &str) -> Result<PathBuf> {
    let p = p.trim();
    if p.is_empty() {
        return Err(Error::msg("empty workspace dir"));
    }
    let rel_pb = Path::new(p);
    if rel_pb
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(Error::msg(format!(
            "invalid workspace dir '{}' (contains '..')",
            p
        )));
    }
    let pb = PathBuf::from(p);
    Ok(if pb.is_absolute() { pb } else { root.join(pb) })
}

fn safe_remove_dir_all(root: &Path, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let root_can = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let dir_can = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    if !dir_can.starts_with(&root_can) || dir_can == root_can {
        return Err(Error::msg(format!(
            "refusing to remove '{}' (outside working root '{}')",
            dir_can.display(),
            root_can.display()
        )));
    }
    fs::remove_dir_all(&dir_can)
        .map_err(|e| Error::msg(format!("failed to remove dir {}: {e}", dir_can.display())))?;
    Ok(())
}
