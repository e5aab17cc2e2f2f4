//! Whether progress output can be drawn
//!
//! Crosby's own output goes to stderr; stdout belongs to the wrapped
//! command. Spinners and bars are drawn only when stderr is an attended
//! terminal outside CI.

use console::Term;

#[derive(Debug, Clone)]
pub struct UiContext {
    interactive: bool,
}

impl UiContext {
    pub fn detect() -> Self {
        let stderr_is_term = Term::stderr().is_term();
        Self {
            interactive: attended(stderr_is_term, |name| std::env::var(name).ok()),
        }
    }

    /// Plain line output regardless of the terminal
    pub fn non_interactive() -> Self {
        Self { interactive: false }
    }

    /// Spinners and transfer bars instead of `[OK]` lines
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}

/// `CI=false` and `CI=0` are treated as unset.
fn attended(stderr_is_term: bool, var: impl Fn(&str) -> Option<String>) -> bool {
    if !stderr_is_term {
        return false;
    }
    if var("TERM").as_deref() == Some("dumb") {
        return false;
    }
    let in_ci = var("CI").is_some_and(|v| !matches!(v.as_str(), "" | "0" | "false"));
    !in_ci && var("BUILD_NUMBER").is_none()
}
