use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use toml::Value;

use crate::error::{Error, Result};
use crate::workspace::WorkspaceConfig;

/// Forces stripping regardless of the recipe's `strip` option.
pub const STRIP_ENV: &str = "SB_STRIP";
/// Overrides the working root when `--root` is not given.
pub const ROOT_ENV: &str = "SBUILD_ROOT";
/// Tracing filter directive.
pub const LOG_ENV: &str = "SBUILD_LOG";

#[derive(Debug, Clone)]
pub struct ConfigDoc {
    pub path: PathBuf,
    pub value: Value,
}

impl ConfigDoc {
    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }

        let mut cur = &self.value;
        for seg in path.split('.') {
            let tbl = cur.as_table()?;
            cur = tbl.get(seg)?;
        }
        Some(cur)
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let owned = v.clone();
        let parsed = owned
            .try_into()
            .map_err(|e| Error::msg(format!("failed to deserialize config at '{}': {e}", path)))?;
        Ok(Some(parsed))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloaderKind {
    #[default]
    Curl,
    Builtin,
}

fn default_curl() -> String {
    "curl".into()
}
fn default_git() -> String {
    "git".into()
}
fn default_tar() -> String {
    "tar".into()
}
fn default_unzip() -> String {
    "unzip".into()
}
fn default_patch() -> String {
    "patch".into()
}
fn default_fakeroot() -> String {
    "fakeroot".into()
}
fn default_strip() -> String {
    "strip".into()
}
fn default_ldd() -> String {
    "ldd".into()
}
fn default_shell() -> String {
    "sh".into()
}

/// Program names for every external collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub downloader: DownloaderKind,
    #[serde(default = "default_curl")]
    pub curl: String,
    #[serde(default = "default_git")]
    pub git: String,
    #[serde(default = "default_tar")]
    pub tar: String,
    #[serde(default = "default_unzip")]
    pub unzip: String,
    #[serde(default = "default_patch")]
    pub patch: String,
    #[serde(default = "default_fakeroot")]
    pub fakeroot: String,
    #[serde(default = "default_strip")]
    pub strip: String,
    #[serde(default = "default_ldd")]
    pub ldd: String,
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            downloader: DownloaderKind::Curl,
            curl: default_curl(),
            git: default_git(),
            tar: default_tar(),
            unzip: default_unzip(),
            patch: default_patch(),
            fakeroot: default_fakeroot(),
            strip: default_strip(),
            ldd: default_ldd(),
            shell: default_shell(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Parallelism hint exported as JOBS (0 = detected hardware concurrency).
    pub jobs: usize,
}

impl BuildConfig {
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.jobs
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SbuildConfig {
    pub workspace: WorkspaceConfig,
    pub tools: ToolsConfig,
    pub build: BuildConfig,
}

impl SbuildConfig {
    pub fn from_doc(doc: &ConfigDoc) -> Result<Self> {
        Ok(Self {
            workspace: doc.deserialize_path("workspace")?.unwrap_or_default(),
            tools: doc.deserialize_path("tools")?.unwrap_or_default(),
            build: doc.deserialize_path("build")?.unwrap_or_default(),
        })
    }
}

pub fn load_doc(path: &Path) -> Result<ConfigDoc> {
    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read config {}: {e}", path.display())))?;
    let value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;
    Ok(ConfigDoc {
        path: path.to_path_buf(),
        value,
    })
}

/// Loads the optional tool config. A missing file yields the defaults.
pub fn load(path: &Path) -> Result<SbuildConfig> {
    if !path.is_file() {
        return Ok(SbuildConfig::default());
    }
    let doc = load_doc(path)?;
    SbuildConfig::from_doc(&doc)
}

pub fn strip_forced() -> bool {
    std::env::var_os(STRIP_ENV).is_some()
}
