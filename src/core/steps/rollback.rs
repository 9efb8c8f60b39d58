//! Rollback phase handlers.

use crate::error::Result;
use crate::log_status;
use crate::step::StepExec;

use super::release_name;

/// Roll the release back to its previous revision.
pub fn helm(ctx: &mut StepExec) -> Result<()> {
    let release = release_name(ctx.config, &ctx.step)?;
    log_status!("Rolling back release {}", release);
    ctx.collab.charts.rollback(&release)
}
