//! Action execution.
//!
//! An action binds a phase to its run mode and walks the phase's effective
//! step list in declared order, one step at a time. Flagged steps are
//! skipped without consuming the first-step marker; the first unrecovered
//! error stops the phase after the in-flight step's cleanup has run.

use serde_json::json;

use crate::collab::Collaborators;
use crate::config::{Phase, ProjectConfig};
use crate::error::Result;
use crate::step::{run_step, HandlerRegistry, StepExec};
use crate::{log_banner, log_status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub label: &'static str,
    pub phase: Phase,
    pub pre_release: bool,
}

impl Action {
    pub const TEST: Action = Action {
        label: "test",
        phase: Phase::Test,
        pre_release: false,
    };
    pub const BUILD: Action = Action {
        label: "build",
        phase: Phase::Build,
        pre_release: false,
    };
    pub const DEPLOY: Action = Action {
        label: "deploy",
        phase: Phase::Deploy,
        pre_release: false,
    };
    pub const ROLLBACK: Action = Action {
        label: "rollback",
        phase: Phase::Rollback,
        pre_release: false,
    };
    pub const RELEASE: Action = Action {
        label: "release",
        phase: Phase::Release,
        pre_release: false,
    };
    /// Pre-release runs the release step list with the pre-release flag
    /// raised and the project version suffixed with the build number.
    pub const PRE_RELEASE: Action = Action {
        label: "release",
        phase: Phase::Release,
        pre_release: true,
    };
}

pub fn run_action(
    config: &mut ProjectConfig,
    collab: &Collaborators,
    registry: &HandlerRegistry,
    action: &Action,
) -> Result<()> {
    if action.pre_release {
        // The suffix lands in the explicit value only; derived defaults
        // (release_tag, build_version) keep the base version.
        let version = config.version()?;
        let build_num = config.build_num()?;
        config.set(
            Phase::Project,
            "version",
            json!(format!("{version}-{build_num}")),
        );
    }

    let banner = format!(
        "Starting {{var:name}} {} version {{var:version}} ({{var:build_name}}) [{{var:build_date}}]",
        action.label
    );
    log_banner!("{}", config.expand_str(&banner));

    let steps = config.steps(action.phase)?;
    if steps.is_empty() {
        return Ok(());
    }

    let mut first = true;
    for mut step in steps {
        if step.ignore {
            log_status!("Skipping {} step: {}", action.label, step.display_name());
            continue;
        }
        log_status!("Executing {} step: {}", action.label, step.display_name());
        step.is_first_step = first;
        let mut ctx = StepExec {
            config: &mut *config,
            collab,
            phase: action.phase,
            step,
            is_pre_release: action.pre_release,
        };
        run_step(registry, &mut ctx)?;
        first = false;
    }
    Ok(())
}
