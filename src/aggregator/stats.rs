use std::time::Duration;

/// Counters and phase timings of one aggregation.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AggregateStatistics {
    pub prewalked_surface_count: usize,
    pub copied_surface_count: usize,
    /// Resources declared to the provider for newly resolved frames.
    pub declare_resources_count: usize,
    pub prewalk_time: Duration,
    pub copy_time: Duration,
    pub declare_resources_time: Duration,
}

impl AggregateStatistics {
    pub(crate) fn log(&self) {
        tracing::debug!(
            prewalked = self.prewalked_surface_count,
            copied = self.copied_surface_count,
            declared_resources = self.declare_resources_count,
            prewalk_us = self.prewalk_time.as_micros() as u64,
            copy_us = self.copy_time.as_micros() as u64,
            declare_us = self.declare_resources_time.as_micros() as u64,
            "aggregation stats"
        );
    }
}
