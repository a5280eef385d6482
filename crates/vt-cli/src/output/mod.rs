//! Terminal output helpers
//!
//! Status lines (info, success, warning, error) all go to stderr so stdout
//! carries only command results such as the `--setup-only` report. Colors
//! are used only when stderr is a terminal; `-q` silences info and success.

use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

static QUIET: AtomicBool = AtomicBool::new(false);

/// Silence info and success lines for the rest of the process
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

fn write_status<W: Write>(mut out: W, styled: bool, color: Color, symbol: &str, msg: &str) {
    let _ = if styled {
        crossterm::execute!(
            out,
            SetForegroundColor(color),
            Print(symbol),
            Print(" "),
            ResetColor,
            Print(msg),
            Print("\n")
        )
    } else {
        writeln!(out, "{} {}", symbol, msg)
    };
}

fn print_status(color: Color, symbol: &str, msg: &str) {
    let stderr = std::io::stderr();
    let styled = stderr.is_terminal();
    write_status(stderr.lock(), styled, color, symbol, msg);
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    if !is_quiet() {
        print_status(Color::Green, "✓", msg);
    }
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    print_status(Color::Red, "✗", msg);
}

/// Print a warning message in yellow
pub fn print_warning(msg: &str) {
    print_status(Color::Yellow, "⚠", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    if !is_quiet() {
        print_status(Color::Cyan, "ℹ", msg);
    }
}

/// Write `value` as pretty JSON followed by a newline
pub fn write_json<W: Write, T: serde::Serialize>(mut out: W, value: &T) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)
}
