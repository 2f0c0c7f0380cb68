use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::counter::Counter;

/// Metrics for the [`Engine`](super::Engine)
#[derive(Default, Clone)]
pub struct Metrics {
    /// Number of applied increments
    pub increments: Counter,
    /// Number of shard records created
    pub created: Counter,
    /// Number of totals computed
    pub totals: Counter,
    /// Number of records folded by merges
    pub merges: Counter,
    /// Number of calls rejected for invalid arguments
    pub rejected: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: &E) -> Self {
        let metrics = Self::default();
        context.register(
            "increments",
            "Number of applied increments",
            metrics.increments.clone(),
        );
        context.register(
            "created",
            "Number of shard records created",
            metrics.created.clone(),
        );
        context.register("totals", "Number of totals computed", metrics.totals.clone());
        context.register(
            "merges",
            "Number of records folded by merges",
            metrics.merges.clone(),
        );
        context.register(
            "rejected",
            "Number of calls rejected for invalid arguments",
            metrics.rejected.clone(),
        );
        metrics
    }
}
