//! Command-line surface: the action names, their dispatch into the
//! pipeline, and the runner bootstrap driven by `VJER_*` variables.

use std::path::Path;

use clap::ValueEnum;

use vjer::action::{run_action, Action};
use vjer::collab::Collaborators;
use vjer::command;
use vjer::config::ProjectConfig;
use vjer::env::EnvOverlay;
use vjer::error::Result;
use vjer::freeze;
use vjer::step::HandlerRegistry;

/// Pipeline actions in the order a job script names them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ActionKind {
    Test,
    Build,
    Deploy,
    Rollback,
    #[value(name = "pre_release", alias = "pre-release")]
    PreRelease,
    Release,
    Freeze,
}

impl ActionKind {
    fn action(self) -> Option<&'static Action> {
        match self {
            ActionKind::Test => Some(&Action::TEST),
            ActionKind::Build => Some(&Action::BUILD),
            ActionKind::Deploy => Some(&Action::DEPLOY),
            ActionKind::Rollback => Some(&Action::ROLLBACK),
            ActionKind::PreRelease => Some(&Action::PRE_RELEASE),
            ActionKind::Release => Some(&Action::RELEASE),
            ActionKind::Freeze => None,
        }
    }
}

/// Run one action against the loaded project. Freeze stands alone; the
/// rest walk their phase's step list.
pub fn run(
    kind: ActionKind,
    config: &mut ProjectConfig,
    collab: &Collaborators,
    registry: &HandlerRegistry,
) -> Result<()> {
    match kind.action() {
        Some(action) => run_action(config, collab, registry, action),
        None => freeze::run(config.project_root(), config.env()),
    }
}

/// Install the runner packages and Python modules the job asked for via
/// `VJER_PKG_INSTALLS`, `VJER_PIP_INSTALLS`, and `VJER_PIP_INSTALL_FILE`.
pub fn bootstrap_runner(root: &Path, env: &EnvOverlay) -> Result<()> {
    if let Some(packages) = env.get("VJER_PKG_INSTALLS") {
        command::run_streamed(root, "apt-get", ["-y", "update"], env, "apt-get update")?;
        let mut args = vec!["-y", "install", "--no-install-recommends"];
        args.extend(packages.split_whitespace());
        command::run_streamed(root, "apt-get", &args, env, "apt-get install")?;
    }

    let pip_installs = env.get("VJER_PIP_INSTALLS");
    let pip_file = env.get("VJER_PIP_INSTALL_FILE");
    if pip_installs.is_some() || pip_file.is_some() {
        pip_install(root, env, &["pip"])?;
        pip_install(root, env, &["setuptools", "wheel"])?;
        if let Some(modules) = pip_installs {
            let modules: Vec<&str> = modules.split_whitespace().collect();
            pip_install(root, env, &modules)?;
        }
        if let Some(file) = pip_file {
            pip_install(root, env, &["--requirement", file])?;
        }
    }
    Ok(())
}

fn pip_install(root: &Path, env: &EnvOverlay, modules: &[&str]) -> Result<()> {
    let mut args = vec!["install", "--quiet", "--no-cache-dir", "--upgrade"];
    args.extend_from_slice(modules);
    command::run_streamed(root, "pip", &args, env, "pip install")
}
