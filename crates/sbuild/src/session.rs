use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::{self, SbuildConfig};
use crate::error::Result;
use crate::executor::{ExecCtx, ExecSink};
use crate::tools::Toolbox;
use crate::workspace::Layout;

/// Everything one invocation needs: layout, tool config, capabilities and the console sink.
pub struct Session {
    pub layout: Layout,
    pub config: SbuildConfig,
    pub tools: Toolbox,
    pub exec: ExecCtx,
}

impl Session {
    /// Loads `<root>/.sbuild/config.toml` (if any), wires the system toolbox and creates the
    /// directory layout. A relative `root` is resolved against the current directory.
    pub fn open(root: &Path, sink: Arc<dyn ExecSink>) -> Result<Self> {
        let config = config::load(&Layout::with_defaults(root).config_file())?;
        let layout = Layout::new(root, &config.workspace)?;
        let tools = Toolbox::system(&config.tools);
        Self::new(layout, config, tools, sink)
    }

    pub fn new(
        layout: Layout,
        config: SbuildConfig,
        tools: Toolbox,
        sink: Arc<dyn ExecSink>,
    ) -> Result<Self> {
        let layout = layout.absolute()?;
        layout.ensure_dirs()?;
        debug!(root = %layout.root.display(), "workspace ready");
        Ok(Self {
            layout,
            config,
            tools,
            exec: ExecCtx::new(sink),
        })
    }

    /// Execution context whose command output goes to `logs/<id>.log`.
    pub fn package_ctx(&self, id: &str) -> ExecCtx {
        self.exec.with_log(self.layout.log_file(id))
    }

    pub fn jobs(&self) -> usize {
        self.config.build.effective_jobs()
    }
}
