//! Output functions for consistent CLI formatting

use super::context::UiContext;
use console::style;

/// A run finished with a cache hit
pub fn cache_hit(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(format!(
            "{} {} ({})",
            style("HIT").green().bold(),
            message,
            style(detail).dim()
        ))
        .ok();
    } else {
        println!("{} {} ({})", style("[HIT]").green(), message, detail);
    }
}

/// A run finished with a cache miss
pub fn cache_miss(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::info(format!(
            "{} {} ({})",
            style("MISS").yellow().bold(),
            message,
            style(detail).dim()
        ))
        .ok();
    } else {
        println!("{} {} ({})", style("[MISS]").yellow(), message, detail);
    }
}

/// Display a warning step with hint
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(format!("{} - {}", message, style(hint).dim())).ok();
    } else {
        println!("  {} {} - {}", style("[WARN]").yellow(), message, hint);
    }
}

/// Display an error step with detail
pub fn step_error_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::error(format!("{}: {}", message, style(detail).red())).ok();
    } else {
        println!("  {} {}: {}", style("[FAIL]").red(), message, detail);
    }
}

/// Display a remark/hint
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        println!("  {}", style(message).dim());
    }
}

/// Pluralized file count, e.g. "1 file", "3 files"
pub fn file_count(count: usize) -> String {
    if count == 1 {
        "1 file".to_string()
    } else {
        format!("{} files", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_non_interactive() {
        let ctx = UiContext::non_interactive();
        // These should not panic
        cache_hit(&ctx, "Restored outputs", "2 files");
        cache_miss(&ctx, "Cached outputs", "1 file");
        step_warn_hint(&ctx, "Restore incomplete", "Re-run to build missing files");
        step_error_detail(&ctx, "app", "permission denied");
        remark(&ctx, "result 1234");
    }

    #[test]
    fn file_count_pluralizes() {
        assert_eq!(file_count(0), "0 files");
        assert_eq!(file_count(1), "1 file");
        assert_eq!(file_count(7), "7 files");
    }
}
