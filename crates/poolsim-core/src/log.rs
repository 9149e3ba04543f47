//! Simulation-aware logging.
//!
//! Messages go through the standard `log` facade. Every line leads with the
//! virtual timestamp and the emitting component; the component name is
//! tinted by severity when stderr is attached to a terminal.

use atty::Stream;
use colored::{Color, Colorize};
use log::Level;
use serde_json::json;
use serde_type_name::type_name;

use crate::event::Event;

/// Colors `text` according to the severity, or leaves it alone when stderr
/// is not a terminal.
pub fn tinted(text: &str, level: Level) -> String {
    if !atty::is(Stream::Stderr) {
        return text.to_owned();
    }
    let color = match level {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::Green,
        Level::Debug => Color::Blue,
        Level::Trace => Color::BrightBlack,
    };
    text.color(color).to_string()
}

/// Emits one simulation log line: `t=<virtual time> <component>: <message>`.
///
/// The leveled wrappers below are the usual entry points; components pass
/// their own context so the line carries their clock and name.
#[macro_export]
macro_rules! sim_log {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {
        log::log!(
            target: $ctx.name(),
            $level,
            "t={:.3} {}: {}",
            $ctx.time(),
            $crate::log::tinted($ctx.name(), $level),
            format_args!($($arg)+)
        )
    };
}

/// Logs a simulation message at the error level.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => ($crate::sim_log!(log::Level::Error, $ctx, $($arg)+));
}

/// Logs a simulation message at the warn level.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => ($crate::sim_log!(log::Level::Warn, $ctx, $($arg)+));
}

/// Logs a simulation message at the info level.
///
/// ```rust
/// use poolsim_core::{log_info, Simulation};
///
/// let mut sim = Simulation::new(123);
/// let ctx = sim.create_context("comp");
/// log_info!(ctx, "started with {} workers", 4);
/// ```
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => ($crate::sim_log!(log::Level::Info, $ctx, $($arg)+));
}

/// Logs a simulation message at the debug level.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => ($crate::sim_log!(log::Level::Debug, $ctx, $($arg)+));
}

/// Logs a simulation message at the trace level.
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => ($crate::sim_log!(log::Level::Trace, $ctx, $($arg)+));
}

fn render(event: &Event) -> String {
    json!({
        "type": type_name(&event.data).unwrap_or("?"),
        "data": event.data,
        "src": event.src,
        "dst": event.dst,
    })
    .to_string()
}

/// Reports an event whose payload matched no [`on_event!`](crate::on_event!)
/// arm of its destination.
pub fn report_unrouted(event: Event) {
    log::error!(
        target: "kernel",
        "t={:.3} {}: unrouted event {}",
        event.time,
        tinted("kernel", Level::Error),
        render(&event)
    );
}

/// Reports an event addressed to a component without a registered handler.
pub(crate) fn report_undeliverable(event: Event) {
    log::error!(
        target: "kernel",
        "t={:.3} {}: undeliverable event {}",
        event.time,
        tinted("kernel", Level::Error),
        render(&event)
    );
}
