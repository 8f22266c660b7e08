//! Logging conventions for this crate.
//!
//! As a library, this crate never installs a global `tracing` subscriber —
//! doing so from library code would clobber whatever the host application
//! configured. It only emits events and spans at the standard levels
//! (`debug!` for routine state transitions, `warn!` for dropped peers and
//! protocol anomalies, `error!` for store failures) and leaves subscriber
//! setup to the caller, e.g. via `tracing_subscriber::fmt().init()`.
//!
//! [`init_logging`] is provided purely as a convenience for examples and
//! tests that want a quick, sane default without reaching for
//! `tracing-subscriber` directly.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a default `tracing` subscriber for examples and tests.
///
/// Respects `RUST_LOG` if set, otherwise uses `filter` if given, otherwise
/// defaults to `"info"`. Not called by any library code path — only by
/// examples, tests, and host applications that want a quick default.
pub fn init_logging(filter: Option<&str>) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if let Some(f) = filter {
        EnvFilter::new(f)
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter)
        .init();
}
