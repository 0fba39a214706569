use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{Result, Stage};
use crate::executor::ExecCtx;
use crate::recipe::Recipe;

/// Install prefix exported to every phase.
pub const PREFIX: &str = "/usr";
/// Used when a recipe leaves `[build] install` empty.
pub const DEFAULT_INSTALL: &str = r#"make DESTDIR="$DESTDIR" install"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreConfig,
    Config,
    Build,
    Install,
    PostInstall,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::PreConfig,
        Phase::Config,
        Phase::Build,
        Phase::Install,
        Phase::PostInstall,
    ];

    pub fn name(self) -> &'static str {
        self.stage().name()
    }

    pub fn stage(self) -> Stage {
        match self {
            Phase::PreConfig => Stage::PreConfig,
            Phase::Config => Stage::Config,
            Phase::Build => Stage::Build,
            Phase::Install => Stage::Install,
            Phase::PostInstall => Stage::PostInstall,
        }
    }

    /// Command line for this phase; install falls back to [`DEFAULT_INSTALL`].
    pub fn command(self, recipe: &Recipe) -> &str {
        let p = &recipe.phases;
        match self {
            Phase::PreConfig => p.preconfig.as_str(),
            Phase::Config => p.config.as_str(),
            Phase::Build => p.build.as_str(),
            Phase::Install if p.install.trim().is_empty() => DEFAULT_INSTALL,
            Phase::Install => p.install.as_str(),
            Phase::PostInstall => p.postinstall.as_str(),
        }
    }
}

/// Environment contract shared by phases and hooks.
#[derive(Debug, Clone)]
pub struct PhaseEnv {
    pub destdir: PathBuf,
    pub jobs: usize,
}

impl PhaseEnv {
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("DESTDIR", self.destdir.display().to_string()),
            ("PREFIX", PREFIX.to_string()),
            ("JOBS", self.jobs.to_string()),
            ("MAKEFLAGS", format!("-j{}", self.jobs)),
        ]
    }
}

/// Runs one phase or hook command through `shell -c` in `cwd`. An empty command is a skip.
/// With `wrapper` set (fakeroot), the shell runs under it.
pub fn run_phase(
    ctx: &ExecCtx,
    shell: &str,
    label: &str,
    command: &str,
    cwd: &Path,
    env: &PhaseEnv,
    wrapper: Option<&str>,
) -> Result<()> {
    let command = command.trim();
    if command.is_empty() {
        ctx.info(format!("skip {label}"));
        return Ok(());
    }

    let mut cmd = match wrapper {
        Some(w) => {
            let mut c = Command::new(w);
            c.arg(shell);
            c
        }
        None => Command::new(shell),
    };
    cmd.arg("-c")
        .arg(format!("set -e\n{command}"))
        .current_dir(cwd);
    for (k, v) in env.vars() {
        cmd.env(k, v);
    }
    debug!(phase = label, cwd = %cwd.display(), wrapped = wrapper.is_some(), "running phase");
    ctx.run_cmd(label, cmd)
}

/// Runs the five build phases in order. The first failure stops the pipeline and carries that
/// phase's stage.
pub fn run_pipeline(
    ctx: &ExecCtx,
    shell: &str,
    fakeroot: &str,
    recipe: &Recipe,
    src_dir: &Path,
    env: &PhaseEnv,
) -> Result<()> {
    for phase in Phase::ALL {
        let wrapper = (phase == Phase::Install && recipe.fakeroot).then_some(fakeroot);
        run_phase(
            ctx,
            shell,
            phase.name(),
            phase.command(recipe),
            src_dir,
            env,
            wrapper,
        )
        .map_err(|e| e.at(phase.stage()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, mpsc};

    use super::*;
    use crate::error::ErrorKind;
    use crate::executor::ChannelSink;

    fn ctx() -> ExecCtx {
        let (tx, _rx) = mpsc::channel();
        ExecCtx::new(Arc::new(ChannelSink::new(tx)))
    }

    fn recipe(text: &str) -> Recipe {
        Recipe::parse(text).expect("recipe")
    }

    #[test]
    fn exports_environment_contract() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let staging = tmp.path().join("stage");
        let env = PhaseEnv {
            destdir: staging.clone(),
            jobs: 3,
        };
        run_phase(
            &ctx(),
            "sh",
            "config",
            "printf '%s|%s|%s|%s' \"$DESTDIR\" \"$PREFIX\" \"$JOBS\" \"$MAKEFLAGS\" > env.txt",
            tmp.path(),
            &env,
            None,
        )
        .expect("phase");

        let got = fs::read_to_string(tmp.path().join("env.txt")).expect("env.txt");
        assert_eq!(got, format!("{}|/usr|3|-j3", staging.display()));
    }

    #[test]
    fn empty_command_is_a_skip() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let env = PhaseEnv {
            destdir: tmp.path().to_path_buf(),
            jobs: 1,
        };
        run_phase(&ctx(), "/nonexistent/shell", "build", "  ", tmp.path(), &env, None)
            .expect("skip");
    }

    #[test]
    fn install_defaults_to_make_install() {
        let r = recipe("[package]\nname=foo\n");
        assert_eq!(Phase::Install.command(&r), DEFAULT_INSTALL);
        assert_eq!(Phase::Build.command(&r), "");
    }

    #[test]
    fn first_failing_phase_stops_pipeline() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let r = recipe(
            "[package]\nname=foo\nfakeroot=no\n[build]\npreconfig=touch pre\nconfig=touch cfg\nbuild=false; touch after-false\ninstall=touch inst\n",
        );
        let env = PhaseEnv {
            destdir: tmp.path().join("stage"),
            jobs: 1,
        };
        let err = run_pipeline(&ctx(), "sh", "fakeroot", &r, tmp.path(), &env).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CommandFailed);
        assert_eq!(err.stage(), Some(Stage::Build));
        assert_eq!(err.exit_code(), 7);
        assert!(tmp.path().join("pre").exists());
        assert!(tmp.path().join("cfg").exists());
        assert!(!tmp.path().join("after-false").exists());
        assert!(!tmp.path().join("inst").exists());
    }

    #[test]
    fn install_runs_under_wrapper_when_fakeroot_enabled() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let r = recipe("[package]\nname=foo\n[build]\ninstall=touch installed\n");
        assert!(r.fakeroot);
        let env = PhaseEnv {
            destdir: tmp.path().join("stage"),
            jobs: 1,
        };
        // `env` stands in for fakeroot: it execs its arguments unchanged.
        run_pipeline(&ctx(), "sh", "env", &r, tmp.path(), &env).expect("pipeline");
        assert!(tmp.path().join("installed").exists());

        let err = run_pipeline(&ctx(), "sh", "/nonexistent/fakeroot", &r, tmp.path(), &env)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Install));
        assert_eq!(err.exit_code(), 8);
    }
}
