pub mod clock;
pub mod config;
pub mod datapoint;
pub mod error;
pub mod factory;
pub mod kind;
pub mod parser;
pub mod record;
pub mod sink;
pub mod store;
pub mod values;

pub use clock::{Clock, DynClock, MockClock, Stopwatch, SystemClock};
pub use config::{DedupConfig, MetricRegistration, PipelineConfig, StoreConfig};
pub use datapoint::{Datapoint, DatapointValue, RawUpdate, StoredRow, UpdateValue};
pub use error::{MetricsError, Result};
pub use factory::{Metric, MetricConfig, MetricFactory};
pub use kind::MetricKind;
pub use parser::{parse_config, parse_config_from_file, parse_config_from_str, ConfigFormat};
pub use record::{TimedRecord, Timeframe};
pub use sink::{DynErrorSink, ErrorReport, ErrorSink, FileErrorSink, TracingErrorSink};
pub use store::{DatapointStore, DynStore, FileStore, MemoryStore};
pub use values::{round5, NamedValues, DEFAULT_NAME};

pub use async_trait::async_trait;
