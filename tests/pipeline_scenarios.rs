use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use vjer::action::{run_action, Action};
use vjer::collab::Collaborators;
use vjer::config::{Phase, ProjectConfig};
use vjer::env::EnvOverlay;
use vjer::error::{ErrorCode, Result};
use vjer::step::{HandlerRegistry, StepExec, StepHandler};
use vjer::steps::builtin_registry;

const MINIMAL: &str = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\n";

fn project(contents: &str, vars: &[(&str, &str)]) -> (TempDir, ProjectConfig) {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("vjer.yml"), contents).unwrap();
    let env = EnvOverlay::from_vars(vars.iter().copied());
    let config = ProjectConfig::load(dir.path(), &env).unwrap();
    (dir, config)
}

/// Collaborators for scenarios whose steps never reach an external tool.
fn idle_collaborators(dir: &TempDir) -> Collaborators {
    Collaborators::live(dir.path(), &EnvOverlay::default()).unwrap()
}

/// Records which steps ran and whether each saw the first-step marker.
struct Probe {
    label: &'static str,
    trace: Arc<Mutex<Vec<(&'static str, bool)>>>,
}

impl StepHandler for Probe {
    fn run(&self, ctx: &mut StepExec) -> Result<()> {
        self.trace
            .lock()
            .unwrap()
            .push((self.label, ctx.step.is_first_step));
        Ok(())
    }
}

/// Records the project version visible while the step runs.
struct VersionProbe {
    seen: Arc<Mutex<Vec<String>>>,
}

impl StepHandler for VersionProbe {
    fn run(&self, ctx: &mut StepExec) -> Result<()> {
        self.seen.lock().unwrap().push(ctx.config.version()?);
        Ok(())
    }
}

#[test]
fn build_exec_steps_run_from_the_project_root() {
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\nbuild:\n  steps:\n    - type: exec\n      name: stamp\n      command: echo stamped > out.txt\n";
    let (dir, mut config) = project(contents, &[("VJER_BUILD_NUM", "7")]);
    // Leftovers from an earlier run disappear when the phase starts.
    let artifacts = config.artifacts_dir().unwrap();
    std::fs::create_dir_all(&artifacts).unwrap();
    std::fs::write(artifacts.join("stale.txt"), "old").unwrap();
    let collab = idle_collaborators(&dir);

    run_action(&mut config, &collab, &builtin_registry(), &Action::BUILD).unwrap();

    let out = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "stamped");
    assert!(artifacts.is_dir());
    assert!(!artifacts.join("stale.txt").exists());
}

#[test]
fn a_failing_command_stops_the_phase() {
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\nbuild:\n  steps:\n    - type: exec\n      name: boom\n      command: exit 3\n    - type: exec\n      command: echo later > later.txt\n";
    let (dir, mut config) = project(contents, &[]);
    let collab = idle_collaborators(&dir);

    let err = run_action(&mut config, &collab, &builtin_registry(), &Action::BUILD).unwrap_err();

    assert_eq!(err.code, ErrorCode::CommandFailed);
    assert!(!dir.path().join("later.txt").exists());
}

#[test]
fn ignored_steps_do_not_consume_the_first_step_marker() {
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\ndeploy:\n  steps:\n    - type: canary\n      ignore: true\n    - type: rollout\n";
    let (dir, mut config) = project(contents, &[]);
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    for label in ["canary", "rollout"] {
        registry.register(
            Phase::Deploy,
            label,
            Probe {
                label,
                trace: Arc::clone(&trace),
            },
        );
    }
    let collab = idle_collaborators(&dir);

    run_action(&mut config, &collab, &registry, &Action::DEPLOY).unwrap();

    assert_eq!(*trace.lock().unwrap(), [("rollout", true)]);
}

#[test]
fn unknown_step_types_fail_the_phase() {
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\ndeploy:\n  steps:\n    - type: mystery\n";
    let (dir, mut config) = project(contents, &[]);
    let collab = idle_collaborators(&dir);

    let err = run_action(&mut config, &collab, &HandlerRegistry::new(), &Action::DEPLOY)
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::StepUnknownHandler);
    assert!(err.message.contains("mystery"));
}

#[test]
fn phases_without_steps_do_nothing() {
    let (dir, mut config) = project(MINIMAL, &[]);
    let collab = idle_collaborators(&dir);

    run_action(&mut config, &collab, &HandlerRegistry::new(), &Action::TEST).unwrap();
}

#[test]
fn pre_release_suffixes_the_version_for_the_run_only() {
    let (dir, mut config) = project(MINIMAL, &[("VJER_BUILD_NUM", "7")]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    for slot in ["tag_source", "gitlab", "increment_release"] {
        registry.register(
            Phase::Release,
            slot,
            VersionProbe {
                seen: Arc::clone(&seen),
            },
        );
    }
    let collab = idle_collaborators(&dir);

    run_action(&mut config, &collab, &registry, &Action::PRE_RELEASE).unwrap();

    assert_eq!(*seen.lock().unwrap(), ["1.2.3-7", "1.2.3-7", "1.2.3-7"]);
    // The suffix never reaches the document on disk.
    let text = std::fs::read_to_string(config.path()).unwrap();
    assert!(text.contains("version: 1.2.3"));
}

#[test]
fn artifact_subdirectories_are_archived_when_requested() {
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\nbuild:\n  steps:\n    - type: exec\n      command: mkdir -p artifacts/bundle && echo data > artifacts/bundle/data.txt\n      archive_artifacts: true\n";
    let (dir, mut config) = project(contents, &[]);
    let collab = idle_collaborators(&dir);

    run_action(&mut config, &collab, &builtin_registry(), &Action::BUILD).unwrap();

    let artifacts = config.artifacts_dir().unwrap();
    assert!(artifacts.join("bundle.zip").is_file());
    assert!(!artifacts.join("bundle").exists());
}

#[test]
fn publishing_honors_the_remote_storage_kill_switch() {
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\nbuild:\n  steps:\n    - type: exec\n      command: echo data > artifacts/report.txt\n      publish:\n        - report.txt\n";
    let (dir, mut config) = project(contents, &[("NO_REMOTE_ARTIFACT_STORAGE", "1")]);
    let collab = idle_collaborators(&dir);

    run_action(&mut config, &collab, &builtin_registry(), &Action::BUILD).unwrap();

    // Without the kill switch the same build needs storage credentials.
    let (dir, mut config) = project(contents, &[]);
    let collab = idle_collaborators(&dir);
    let err = run_action(&mut config, &collab, &builtin_registry(), &Action::BUILD).unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
    assert!(err.message.contains("VJER_STORAGE_URL"));
}

#[test]
fn deploy_filecopy_places_artifacts_in_the_target() {
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\ndeploy:\n  steps:\n    - type: filecopy\n      target: deployed\n      clean: true\n      files:\n        - name: app.zip\n        - name: app.zip\n          target: app-copy.zip\n";
    let (dir, mut config) = project(contents, &[]);
    let artifacts = config.artifacts_dir().unwrap();
    std::fs::create_dir_all(&artifacts).unwrap();
    std::fs::write(artifacts.join("app.zip"), "payload").unwrap();
    let deployed = dir.path().join("deployed");
    std::fs::create_dir_all(&deployed).unwrap();
    std::fs::write(deployed.join("stale.txt"), "old").unwrap();
    let collab = idle_collaborators(&dir);

    run_action(&mut config, &collab, &builtin_registry(), &Action::DEPLOY).unwrap();

    assert!(!deployed.join("stale.txt").exists());
    assert_eq!(
        std::fs::read_to_string(deployed.join("app.zip")).unwrap(),
        "payload"
    );
    assert_eq!(
        std::fs::read_to_string(deployed.join("app-copy.zip")).unwrap(),
        "payload"
    );
}
