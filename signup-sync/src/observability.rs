//! Logging, error reporting and metrics setup.

use crate::config::{CommonConfig, LoggingConfig, MetricsConfig};
use contact_upsert::metrics_defs::ALL_METRICS;
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::{MetricDef, MetricType};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const METRICS_PREFIX: &str = "signup_sync";

#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("invalid sentry DSN: {0}")]
    InvalidDsn(String),
    #[error("could not start statsd exporter: {0}")]
    Statsd(String),
    #[error("a metrics recorder is already installed")]
    RecorderAlreadySet,
}

/// Keeps Sentry flushing until dropped.
pub struct ObservabilityGuard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Installs the tracing subscriber, Sentry (when a DSN is configured) and
/// the StatsD recorder (when configured). Failures other than the subscriber
/// itself are logged and skipped.
pub fn init(config: &CommonConfig) -> ObservabilityGuard {
    let sentry = init_sentry(&config.logging);
    let sentry_enabled = matches!(sentry, Ok(Some(_)));
    init_tracing(&config.logging, sentry_enabled);

    let sentry = sentry.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Sentry disabled");
        None
    });

    if let Some(metrics) = &config.metrics {
        match init_metrics(metrics) {
            Ok(()) => tracing::info!(
                host = %metrics.statsd_host,
                port = metrics.statsd_port,
                "Sending metrics to statsd"
            ),
            Err(e) => tracing::warn!(error = %e, "Metrics disabled"),
        }
    }

    ObservabilityGuard { _sentry: sentry }
}

fn init_sentry(
    logging: &LoggingConfig,
) -> Result<Option<sentry::ClientInitGuard>, ObservabilityError> {
    let Some(dsn) = logging.sentry_dsn.as_deref() else {
        return Ok(None);
    };

    let dsn: sentry::types::Dsn = dsn
        .parse()
        .map_err(|e: sentry::types::ParseDsnError| ObservabilityError::InvalidDsn(e.to_string()))?;

    Ok(Some(sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        ..Default::default()
    })))
}

fn init_tracing(logging: &LoggingConfig, sentry_enabled: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let sentry_layer = sentry_enabled.then(|| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(sentry_layer)
        .init();
}

fn init_metrics(config: &MetricsConfig) -> Result<(), ObservabilityError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| ObservabilityError::Statsd(e.to_string()))?;

    metrics::set_global_recorder(recorder).map_err(|_| ObservabilityError::RecorderAlreadySet)?;
    describe_metrics(ALL_METRICS);

    Ok(())
}

fn describe_metrics(defs: &[MetricDef]) {
    for def in defs {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
        tracing::debug!(
            metric = def.name,
            metric_type = def.metric_type.as_str(),
            "Registered metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_sentry_without_dsn() {
        let logging = LoggingConfig::default();
        assert!(init_sentry(&logging).unwrap().is_none());
    }

    #[test]
    fn invalid_sentry_dsn() {
        let logging = LoggingConfig {
            sentry_dsn: Some("not a dsn".into()),
            ..Default::default()
        };
        assert!(matches!(
            init_sentry(&logging),
            Err(ObservabilityError::InvalidDsn(_))
        ));
    }
}
