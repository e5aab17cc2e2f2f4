//! Run a command through the cache

use crate::cache::CacheClient;
use crate::config::Config;
use crate::controller::{Controller, Outcome, RestoreReport, UploadPlan};
use crate::error::{CrosbyError, CrosbyResult};
use crate::fingerprint::platform_tag;
use crate::retry::RetryPolicy;
use crate::session::{create_gate, gate_enabled};
use crate::telemetry::{RunEvent, Telemetry};
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Validate the session, run `invocation` in `root` through the cache and
/// report the outcome.
pub async fn execute(invocation: &[String], root: &Path, config: &Config) -> CrosbyResult<()> {
    let ctx = UiContext::detect();
    let started = Instant::now();

    validate_session(&ctx, config).await?;

    let client = CacheClient::from_config(&config.backend);
    let plan = UploadPlan {
        retry: RetryPolicy::from(&config.upload),
        concurrency: config.upload.concurrency,
    };
    let platform = platform_tag();
    debug!("Running {:?} in {} on {}", invocation, root.display(), platform);

    let controller = Controller::new(client, root, platform, plan, ctx.clone());
    let outcome = controller.run(invocation).await?;

    Telemetry::new(config)
        .record(&RunEvent::new(invocation, outcome.cache_hit(), started.elapsed()))
        .await;

    report(&ctx, &outcome)
}

async fn validate_session(ctx: &UiContext, config: &Config) -> CrosbyResult<()> {
    let gate = create_gate(&config.session);
    if !gate_enabled(&config.session) {
        return gate.validate().await;
    }

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start("Checking session...");
    match gate.validate().await {
        Ok(()) => {
            spinner.clear();
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Session check failed");
            Err(e)
        }
    }
}

/// Print the outcome; a partial restore is reported per file and then
/// turned into an error.
fn report(ctx: &UiContext, outcome: &Outcome) -> CrosbyResult<()> {
    match outcome {
        Outcome::Cached(result) => {
            ui::cache_miss(
                ctx,
                "Cached outputs",
                &ui::file_count(result.blob_ids.len()),
            );
            ui::remark(ctx, &format!("result {}", result.id));
            Ok(())
        }
        Outcome::NoChanges { result_id } => {
            ui::cache_hit(ctx, "Nothing to restore", "command produced no files");
            ui::remark(ctx, &format!("result {}", result_id));
            Ok(())
        }
        Outcome::Restored(restored) => report_restore(ctx, restored),
    }
}

fn report_restore(ctx: &UiContext, restored: &RestoreReport) -> CrosbyResult<()> {
    let total = restored.files.len();
    if restored.is_complete() {
        ui::cache_hit(ctx, "Restored outputs", &ui::file_count(total));
        return Ok(());
    }

    for file in restored.failures() {
        if let Err(ref e) = file.result {
            ui::step_error_detail(ctx, &file.path, &e.to_string());
        }
    }
    let failed = total - restored.restored_count();
    ui::step_warn_hint(
        ctx,
        &format!("Restored {} of {}", restored.restored_count(), total),
        "Remove the conflicting paths and run again",
    );
    Err(CrosbyError::RestoreFailed { failed, total })
}
