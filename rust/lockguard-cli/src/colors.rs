//! ANSI color helpers for CLI output.
//!
//! Colors are dropped when `NO_COLOR` is set.

use std::sync::atomic::{AtomicBool, Ordering};

static DISABLED: AtomicBool = AtomicBool::new(false);

/// Disable or re-enable coloring for the rest of the process.
pub fn set_enabled(enabled: bool) {
    DISABLED.store(!enabled, Ordering::Relaxed);
}

/// Apply the `NO_COLOR` convention.
pub fn init_from_env() {
    if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        set_enabled(false);
    }
}

fn paint(code: &str, s: &str) -> String {
    if DISABLED.load(Ordering::Relaxed) {
        s.to_string()
    } else {
        format!("\x1b[{}m{}\x1b[0m", code, s)
    }
}

/// Format text in green.
pub fn green(s: &str) -> String {
    paint("32", s)
}

/// Format text in red.
pub fn red(s: &str) -> String {
    paint("31", s)
}

/// Format text in yellow.
pub fn yellow(s: &str) -> String {
    paint("33", s)
}

/// Format text in bold.
pub fn bold(s: &str) -> String {
    paint("1", s)
}

/// Format text in gray.
pub fn gray(s: &str) -> String {
    paint("90", s)
}

/// Format a status label (right-aligned, green, bold).
pub fn status_label(label: &str) -> String {
    paint("1;32", &format!("{:>12}", label))
}

/// Format a failure label (right-aligned, red, bold).
pub fn failure_label(label: &str) -> String {
    paint("1;31", &format!("{:>12}", label))
}

/// Color the `+`/`-` lines of a metadata diff.
pub fn diff(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.starts_with('+') {
                green(line)
            } else if line.starts_with('-') {
                red(line)
            } else if line.starts_with("@@") {
                gray(line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
