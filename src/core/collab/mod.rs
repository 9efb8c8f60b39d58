//! External tool collaborators: version control, container registry, Helm,
//! remote storage, and the release host. Each is a trait so action runs can
//! be exercised without the real tools installed.

pub mod chart;
pub mod host;
pub mod registry;
pub mod storage;
pub mod vcs;

pub use chart::{ChartRepo, ChartTool, HelmCli};
pub use host::{GitLabHost, ReleaseHost, ReleaseSpec};
pub use registry::{ContainerRegistry, DockerCli, REGISTRY_TYPES};
pub use storage::{HttpStorage, RemoteStorage, DEFAULT_BUCKET, PKG_EXT};
pub use vcs::{GitCli, VersionControl, REMOTE_REF};

use std::path::Path;

use crate::env::EnvOverlay;
use crate::error::Result;

/// The set of external tools an action run talks to.
pub struct Collaborators {
    pub vcs: Box<dyn VersionControl>,
    pub registry: Box<dyn ContainerRegistry>,
    pub charts: Box<dyn ChartTool>,
    pub storage: Box<dyn RemoteStorage>,
    pub host: Box<dyn ReleaseHost>,
}

impl Collaborators {
    /// Wire up the CLI- and HTTP-backed collaborators for a project.
    pub fn live(project_root: &Path, env: &EnvOverlay) -> Result<Self> {
        Ok(Self {
            vcs: Box::new(GitCli::new(project_root, env.clone())),
            registry: Box::new(DockerCli::new(project_root, env.clone())),
            charts: Box::new(HelmCli::new(project_root, env.clone())),
            storage: Box::new(HttpStorage::from_env(env)?),
            host: Box::new(GitLabHost::new(env.clone())?),
        })
    }
}
