//! Process-wide diagnostics toggles.
//!
//! The agent normally logs errors tersely. Hosts can switch on detailed
//! rendering (full error chains) for troubleshooting; the manager sets the
//! toggle from configuration at start and resets it at stop.

use std::sync::atomic::{AtomicBool, Ordering};

static DETAILED_ERRORS: AtomicBool = AtomicBool::new(false);

/// Enables or disables detailed error rendering.
pub fn set_detailed_errors(enabled: bool) {
    DETAILED_ERRORS.store(enabled, Ordering::Relaxed);
}

/// Whether detailed error rendering is on.
pub fn detailed_errors() -> bool {
    DETAILED_ERRORS.load(Ordering::Relaxed)
}

/// Renders an error for logging, honoring the detail toggle.
pub fn render_error(error: &anyhow::Error) -> String {
    if detailed_errors() {
        format!("{error:#}")
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_honors_toggle() {
        let error = anyhow::anyhow!("inner").context("outer");

        set_detailed_errors(false);
        assert_eq!(render_error(&error), "outer");

        set_detailed_errors(true);
        assert!(render_error(&error).contains("inner"));

        set_detailed_errors(false);
    }
}
