//! OpenTelemetry counters and `tracing` spans for relation loading.
//!
//! Counters are registered on the global meter provider; install a provider
//! (Prometheus, OTLP, ...) in the application to export them.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{global, metrics::Counter, KeyValue};

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<RelationMetrics> = Lazy::new(RelationMetrics::init);

#[cfg(feature = "metrics")]
pub struct RelationMetrics {
    pub relation_queries_total: Counter<u64>,
    pub eager_nodes_total: Counter<u64>,
    pub pivot_mutations_total: Counter<u64>,
    pub eager_cancellations_total: Counter<u64>,
}

#[cfg(feature = "metrics")]
impl RelationMetrics {
    pub fn init() -> Self {
        let meter = global::meter("lifeguard_relations");

        let relation_queries_total = meter
            .u64_counter("lifeguard_relation_queries_total")
            .with_description("Relation and preload queries executed")
            .build();

        let eager_nodes_total = meter
            .u64_counter("lifeguard_eager_nodes_total")
            .with_description("Eager-load plan nodes resolved")
            .build();

        let pivot_mutations_total = meter
            .u64_counter("lifeguard_pivot_mutations_total")
            .with_description("Pivot attach, detach and sync operations")
            .build();

        let eager_cancellations_total = meter
            .u64_counter("lifeguard_eager_cancellations_total")
            .with_description("Eager loads aborted by cancellation")
            .build();

        Self {
            relation_queries_total,
            eager_nodes_total,
            pivot_mutations_total,
            eager_cancellations_total,
        }
    }

    pub fn record_relation_query(&self, schema: &str) {
        self.relation_queries_total
            .add(1, &[KeyValue::new("schema", schema.to_string())]);
    }

    pub fn record_eager_node(&self, depth: usize) {
        self.eager_nodes_total
            .add(1, &[KeyValue::new("depth", depth as i64)]);
    }

    pub fn record_pivot_mutation(&self, operation: &str) {
        self.pivot_mutations_total
            .add(1, &[KeyValue::new("operation", operation.to_string())]);
    }

    pub fn record_cancellation(&self) {
        self.eager_cancellations_total.add(1, &[]);
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    /// Span around one eager-load node
    pub fn eager_node_span(path: &str, parents: usize) -> Span {
        info_span!("lifeguard.eager_node", path = path, parents = parents)
    }

    /// Span around a pivot mutation
    pub fn pivot_span(relation: &str, operation: &str) -> Span {
        info_span!("lifeguard.pivot", relation = relation, operation = operation)
    }
}
