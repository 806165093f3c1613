//! Metrics definitions for the contact upsert service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const WEBHOOK_REQUESTS: MetricDef = MetricDef {
    name: "webhook.requests",
    metric_type: MetricType::Counter,
    description: "Webhook requests handled. Tagged with outcome.",
};

pub const CRM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "crm.request.duration",
    metric_type: MetricType::Histogram,
    description: "CRM API call duration in seconds. Tagged with operation, status.",
};

pub const ALL_METRICS: &[MetricDef] = &[WEBHOOK_REQUESTS, CRM_REQUEST_DURATION];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_metrics_registered_once() {
        let names: HashSet<_> = ALL_METRICS.iter().map(|def| def.name).collect();
        assert_eq!(names.len(), ALL_METRICS.len());

        let types: Vec<_> = ALL_METRICS.iter().map(|def| def.metric_type.as_str()).collect();
        assert_eq!(types, ["Counter", "Histogram"]);
    }

    #[test]
    fn test_macros_record_without_recorder() {
        shared::counter!(WEBHOOK_REQUESTS, "outcome" => "created").increment(1);
        shared::histogram!(CRM_REQUEST_DURATION, "operation" => "search", "status" => "200")
            .record(0.25);
    }
}
