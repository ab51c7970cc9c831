//! Logging facilities.
//!
//! Messages are prefixed with `[time LEVEL component]`, the level being colored when stderr is a
//! terminal. Binaries are expected to configure `env_logger` to print bare messages.

use atty::Stream;
pub use colored::Color;
use colored::{ColoredString, Colorize};
use log::error;
use serde_json::json;
use serde_type_name::type_name;

use super::event::Event;

/// Applies the color to the string if stderr (log) goes to console.
pub fn get_colored(s: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        s.color(color)
    } else {
        s.normal()
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_with_context {
    ($level:ident, $label:literal, $color:ident, $ctx:expr, $msg:expr) => (
        log::$level!(
            target: $ctx.name(),
            "[{:.6} {} {}] {}",
            $ctx.time(), $crate::engine::log::get_colored($label, $crate::engine::log::Color::$color), $ctx.name(), $msg
        )
    );
    ($level:ident, $label:literal, $color:ident, $ctx:expr, $format:expr, $($arg:tt)+) => (
        log::$level!(
            target: $ctx.name(),
            concat!("[{:.6} {} {}] ", $format),
            $ctx.time(), $crate::engine::log::get_colored($label, $crate::engine::log::Color::$color), $ctx.name(), $($arg)+
        )
    );
}

/// Logs a message at the info level on behalf of the component owning `ctx`.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_context!(info, "INFO ", Green, $ctx, $($arg)+));
}

/// Logs a message at the debug level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_context!(debug, "DEBUG", Blue, $ctx, $($arg)+));
}

/// Logs a message at the trace level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_context!(trace, "TRACE", Cyan, $ctx, $($arg)+));
}

/// Logs a message at the warn level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_context!(warn, "WARN ", Yellow, $ctx, $($arg)+));
}

/// Logs a message at the error level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_context!(error, "ERROR", Red, $ctx, $($arg)+));
}

fn log_event(event: &Event, what: &str) {
    error!(
        target: "simulation",
        "[{:.6} {} simulation] {}: {}",
        event.time,
        get_colored("ERROR", Color::Red),
        what,
        json!({"type": type_name(&event.data).ok(), "data": event.data, "src": event.src, "dst": event.dst})
    );
}

/// Logs an event whose payload matched no arm of [`cast!`](crate::cast!).
pub fn log_unhandled_event(event: Event) {
    log_event(&event, "Unhandled event");
}

pub(crate) fn log_undelivered_event(event: Event) {
    log_event(&event, "Undelivered event");
}

pub(crate) fn log_incorrect_event(event: Event, msg: &str) {
    log_event(&event, &format!("Incorrect event ({})", msg));
}
