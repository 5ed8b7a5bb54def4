use std::time::Duration as StdDuration;

use sentry::integrations::tracing::{EventFilter, SentryLayer};
use sentry::{ClientInitGuard, ClientOptions};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::prelude::*;

const LOG_FILTER_VAR: &str = "LATENT_RATINGS_LOG";
const SENTRY_FILTER_VAR: &str = "LATENT_RATINGS_SENTRY_LOG";
const DEFAULT_DIRECTIVES: &str = "latent_ratings=info";

/// Installs the global subscriber: plain-text output on stderr and Sentry events.
///
/// Without a DSN the Sentry client stays disabled. The returned guard flushes pending events on drop.
pub fn init(sentry_dsn: Option<String>) -> Result<ClientInitGuard> {
    let guard = sentry::init((
        sentry_dsn,
        ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    ));

    tracing_subscriber::registry()
        .with(sentry_layer().with_filter(env_filter(SENTRY_FILTER_VAR)?))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(env_filter(LOG_FILTER_VAR)?),
        )
        .try_init()
        .context("failed to install the tracing subscriber")?;

    Ok(guard)
}

/// Directives from the environment variable, or the crate's `info` level when it is unset.
fn env_filter(var: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_env(var)
        .or_else(|_| EnvFilter::try_new(DEFAULT_DIRECTIVES))
        .with_context(|| format!("invalid `{}` directives", var))
}

/// Warnings and errors are reported as events, everything else is kept as breadcrumbs.
fn sentry_layer<S>() -> SentryLayer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    sentry::integrations::tracing::layer()
        .event_filter(|metadata| match *metadata.level() {
            Level::ERROR | Level::WARN => EventFilter::Event,
            _ => EventFilter::Breadcrumb,
        })
        .span_filter(|_| false)
}

#[must_use]
pub fn format_duration(duration: StdDuration) -> String {
    humantime::format_duration(duration).to_string()
}

/// Time since the instant, rounded down to milliseconds.
#[must_use]
pub fn format_elapsed(instant: Instant) -> String {
    let elapsed = instant.elapsed();
    format_duration(elapsed - StdDuration::from_nanos(u64::from(elapsed.subsec_nanos() % 1_000_000)))
}
