use std::fmt;

/// Pipeline stage an error was raised in. Each stage owns a distinct process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Extract,
    Patch,
    PreConfig,
    Config,
    Build,
    Install,
    PostInstall,
    Strip,
    Record,
    Package,
    Sync,
    Revdep,
}

impl Stage {
    pub fn exit_code(self) -> i32 {
        match self {
            Stage::Fetch => 2,
            Stage::Extract => 3,
            Stage::Patch => 4,
            Stage::PreConfig => 5,
            Stage::Config => 6,
            Stage::Build => 7,
            Stage::Install => 8,
            Stage::PostInstall => 9,
            Stage::Strip => 10,
            Stage::Record => 11,
            Stage::Package => 12,
            Stage::Sync => 16,
            Stage::Revdep => 17,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Patch => "patch",
            Stage::PreConfig => "preconfig",
            Stage::Config => "config",
            Stage::Build => "build",
            Stage::Install => "install",
            Stage::PostInstall => "postinstall",
            Stage::Strip => "strip",
            Stage::Record => "record",
            Stage::Package => "package",
            Stage::Sync => "sync",
            Stage::Revdep => "revdep",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RecipeNotFound,
    RecipeInvalid,
    SourceUndefined,
    ChecksumMismatch,
    UnknownArchive,
    CommandFailed,
    NotStaged,
    RegistryEntryMissing,
    ManifestMissing,
    Usage,
    Other,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    stage: Option<Stage>,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Other, msg)
    }

    pub fn new<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            stage: None,
            msg: msg.into(),
        }
    }

    /// Tags the error with the stage it surfaced in. An already tagged error keeps its stage.
    pub fn at(mut self, stage: Stage) -> Self {
        if self.stage.is_none() {
            self.stage = Some(stage);
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::NotStaged => return 13,
            ErrorKind::RegistryEntryMissing => return 14,
            ErrorKind::ManifestMissing => return 15,
            ErrorKind::RecipeNotFound | ErrorKind::RecipeInvalid | ErrorKind::Usage => return 1,
            _ => {}
        }
        self.stage.map(Stage::exit_code).unwrap_or(1)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{}: {}", stage.name(), self.msg),
            None => write!(f, "{}", self.msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_decides_exit_code_for_command_failures() {
        let e = Error::new(ErrorKind::CommandFailed, "make exited 2").at(Stage::Build);
        assert_eq!(e.exit_code(), 7);
        assert_eq!(e.to_string(), "build: make exited 2");
    }

    #[test]
    fn first_stage_tag_wins() {
        let e = Error::new(ErrorKind::ChecksumMismatch, "bad")
            .at(Stage::Fetch)
            .at(Stage::Install);
        assert_eq!(e.stage(), Some(Stage::Fetch));
        assert_eq!(e.exit_code(), 2);
    }

    #[test]
    fn registry_kinds_have_their_own_codes() {
        assert_eq!(
            Error::new(ErrorKind::RegistryEntryMissing, "x").exit_code(),
            14
        );
        assert_eq!(Error::new(ErrorKind::ManifestMissing, "x").exit_code(), 15);
        assert_eq!(
            Error::new(ErrorKind::NotStaged, "x").at(Stage::Package).exit_code(),
            13
        );
        assert_eq!(Error::new(ErrorKind::RecipeNotFound, "x").exit_code(), 1);
    }
}
