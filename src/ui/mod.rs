//! Terminal output
//!
//! Uses `cliclack` log lines and spinners plus `indicatif` transfer bars in
//! an interactive terminal, and plain `[OK]`/`[FAIL]` lines in CI or when
//! output is piped.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{cache_hit, cache_miss, file_count, remark, step_error_detail, step_warn_hint};
pub use progress::{TaskSpinner, TransferProgress};
