//! Container registry operations backed by the `docker` CLI.

use std::path::{Path, PathBuf};

use crate::env::EnvOverlay;
use crate::error::Result;
use crate::utils::command;

/// Registry types a project may declare. `local` never pushes.
pub const REGISTRY_TYPES: &[&str] = &["local", "gcp", "gcp-art", "jfrog"];

/// Container registry surface the build and release steps depend on.
pub trait ContainerRegistry {
    fn pull(&self, image: &str) -> Result<()>;
    fn tag(&self, source: &str, target: &str) -> Result<()>;
    fn push(&self, image: &str) -> Result<()>;
    /// Local image ID for a tag. Doubles as a presence probe.
    fn get_image(&self, image: &str) -> Result<String>;
}

/// `docker` CLI wrapper rooted at the project directory.
pub struct DockerCli {
    root: PathBuf,
    env: EnvOverlay,
}

impl DockerCli {
    pub fn new(root: &Path, env: EnvOverlay) -> Self {
        Self {
            root: root.to_path_buf(),
            env,
        }
    }

    fn docker_streamed(&self, args: &[&str], context: &str) -> Result<()> {
        command::run_streamed(&self.root, "docker", args, &self.env, context)
    }
}

impl ContainerRegistry for DockerCli {
    fn pull(&self, image: &str) -> Result<()> {
        self.docker_streamed(&["pull", image], "docker pull")
    }

    fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.docker_streamed(&["tag", source, target], "docker tag")
    }

    fn push(&self, image: &str) -> Result<()> {
        self.docker_streamed(&["push", image], "docker push")
    }

    fn get_image(&self, image: &str) -> Result<String> {
        command::run_in_env(
            &self.root,
            "docker",
            ["image", "inspect", "--format", "{{.Id}}", image],
            &self.env,
            "docker image inspect",
        )
    }
}
