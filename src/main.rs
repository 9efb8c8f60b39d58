use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;

mod commands;

use commands::ActionKind;
use vjer::collab::Collaborators;
use vjer::config::{Phase, ProjectConfig};
use vjer::env::EnvOverlay;
use vjer::error::{exit_code_for_error, Error};
use vjer::expand::scalar_text;
use vjer::steps::builtin_registry;
use vjer::{log_banner, log_status};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "vjer")]
#[command(version = VERSION)]
#[command(about = "CI/CD automation tool")]
struct Cli {
    /// Actions to run, in order
    #[arg(value_enum, num_args = 1.., required = true)]
    actions: Vec<ActionKind>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let env = EnvOverlay::from_process();

    if env.get_or("VJER_ENV", "local") == "local"
        && env.get("VIRTUAL_ENV").unwrap_or("").is_empty()
    {
        eprintln!("ERROR Vjer must be run from a virtual environment.");
        return ExitCode::FAILURE;
    }

    match run(&cli.actions, env) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR {} [{}]", err.message, err.code.as_str());
            ExitCode::from(exit_code_to_u8(exit_code_for_error(&err)))
        }
    }
}

fn run(actions: &[ActionKind], env: EnvOverlay) -> vjer::Result<()> {
    log_banner!("vjer {}", VERSION);
    let project_root = std::env::current_dir()?;
    let mut env = env;
    let mut config = ProjectConfig::load(&project_root, &env)?;

    // Environment entries feed placeholder expansion and every spawned
    // tool, so the configuration is reloaded over the extended overlay.
    if let Some(Value::Object(extra)) = config.get_opt(Phase::Project, "environment") {
        let mut vars = Vec::new();
        for (name, value) in &extra {
            let text = scalar_text(value).ok_or_else(|| {
                Error::config_invalid_value("environment", "expected scalar values")
            })?;
            log_status!("setting {}={}", name, text);
            vars.push((name.clone(), text));
        }
        env = env.extended(vars);
        config = ProjectConfig::load(&project_root, &env)?;
    }

    log_status!("OS: {} {}", std::env::consts::OS, std::env::consts::ARCH);
    let os_release = Path::new("/etc/os-release");
    if os_release.is_file() {
        if let Ok(contents) = std::fs::read_to_string(os_release) {
            for line in contents.lines() {
                log_status!("{}", line.trim());
            }
        }
    }

    commands::bootstrap_runner(&project_root, &env)?;

    let registry = builtin_registry();
    let collab = Collaborators::live(&project_root, &env)?;
    for action in actions {
        commands::run(*action, &mut config, &collab, &registry)?;
    }
    Ok(())
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
