//! Freeze action: pin the project's Python requirements with platform
//! markers.

use std::path::Path;

use tempfile::TempDir;

use crate::env::EnvOverlay;
use crate::error::Result;
use crate::log_status;
use crate::utils::{command, io};

const REQUIREMENTS_FILE: &str = "requirements.txt";
const FREEZE_FILE: &str = "requirements-frozen.txt";
/// Modules restricted to one platform even though the name does not say so.
const WINDOWS_MODULES: &[&str] = &["WMI"];
const LINUX_MODULES: &[&str] = &[];

/// Install the requirements into a scratch virtual environment and write
/// the frozen pin list. The scratch directory is removed on every exit
/// path.
pub fn run(project_root: &Path, env: &EnvOverlay) -> Result<()> {
    let scratch = TempDir::new()?;
    log_status!("Creating virtual environment in: {}", scratch.path().display());
    let venv_dir = scratch.path().display().to_string();
    command::run_streamed(
        project_root,
        "python3",
        ["-m", "venv", venv_dir.as_str()],
        env,
        "create virtual environment",
    )?;

    let venv_bin = scratch.path().join(if cfg!(windows) { "Scripts" } else { "bin" });
    let python = venv_bin
        .join(if cfg!(windows) { "python.exe" } else { "python" })
        .display()
        .to_string();
    let pip = venv_bin
        .join(if cfg!(windows) { "pip.exe" } else { "pip" })
        .display()
        .to_string();
    let env = with_venv_path(env, &venv_bin);

    log_status!("Upgrading pip");
    command::run_streamed(
        project_root,
        &python,
        ["-m", "pip", "install", "-qqq", "--upgrade", "pip"],
        &env,
        "upgrade pip",
    )?;
    log_status!("Updating pip install tools");
    command::run_streamed(
        project_root,
        &pip,
        ["install", "-qqq", "--upgrade", "setuptools", "wheel"],
        &env,
        "install pip tooling",
    )?;
    log_status!("Installing modules from {}", REQUIREMENTS_FILE);
    command::run_streamed(
        project_root,
        &pip,
        ["install", "-qqq", "--upgrade", "--requirement", REQUIREMENTS_FILE],
        &env,
        "install requirements",
    )?;

    log_status!("Creating frozen requirements file: {}", FREEZE_FILE);
    let frozen = command::run_in_env(
        project_root,
        &pip,
        ["freeze", "--requirement", REQUIREMENTS_FILE],
        &env,
        "pip freeze",
    )?;
    io::write_file(
        &project_root.join(FREEZE_FILE),
        &platform_markers(&frozen),
        "write frozen requirements",
    )
}

/// Overlay with the scratch environment's bin directory first on `PATH`,
/// so tooling spawned by pip resolves against the scratch environment.
fn with_venv_path(env: &EnvOverlay, venv_bin: &Path) -> EnvOverlay {
    let mut paths = vec![venv_bin.to_path_buf()];
    if let Some(existing) = env.get("PATH") {
        paths.extend(std::env::split_paths(existing));
    }
    match std::env::join_paths(paths) {
        Ok(joined) => env.extended([("PATH", joined.to_string_lossy().to_string())]),
        Err(_) => env.clone(),
    }
}

/// Append a platform marker to each pin whose module only installs on one
/// platform.
fn platform_markers(frozen: &str) -> String {
    let mut out = String::new();
    for line in frozen.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let module = line.split("==").next().unwrap_or(line);
        out.push_str(line);
        if module.contains("win32") || WINDOWS_MODULES.contains(&module) {
            out.push_str("; sys_platform == 'win32'");
        }
        if module.contains("ansible") || LINUX_MODULES.contains(&module) {
            out.push_str("; sys_platform != 'win32'");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_markers_follow_the_module_name() {
        let frozen = "requests==2.32.0\npywin32==306\nWMI==1.5.1\nansible-core==2.17.0\n\n";
        assert_eq!(
            platform_markers(frozen),
            "requests==2.32.0\n\
             pywin32==306; sys_platform == 'win32'\n\
             WMI==1.5.1; sys_platform == 'win32'\n\
             ansible-core==2.17.0; sys_platform != 'win32'\n"
        );
    }

    #[test]
    fn venv_path_comes_first() {
        let env = EnvOverlay::from_vars([("PATH", "/usr/bin")]);
        let extended = with_venv_path(&env, Path::new("/tmp/venv/bin"));
        let path = extended.get("PATH").unwrap();
        assert!(path.starts_with("/tmp/venv/bin"));
        assert!(path.contains("/usr/bin"));
    }
}
