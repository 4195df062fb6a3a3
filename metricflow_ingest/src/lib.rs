pub mod dedup;
pub mod entry;
pub mod model;
pub mod self_metrics;
pub mod service;

pub use dedup::DedupWindow;
pub use entry::{Entry, EntryStats, EntrySummary, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_SIZE};
pub use model::{AggregationModel, ModelSummary};
pub use self_metrics::SelfMetrics;
pub use service::{IngestReport, IngestionService};
