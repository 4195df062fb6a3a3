//! Read side of the pipeline: fetches stored datapoints, resamples them per
//! metric kind and combines series with ratio formulas.

pub mod formula;
pub mod mappers;
pub mod request;
pub mod series;
pub mod service;

pub use formula::Formula;
pub use mappers::{
    default_mapper, DynMapper, GaugeMapper, IntervalMapper, MapperRegistry, MinMaxMapper,
    PartitioningMapper, PercentileMapper, RateMapper,
};
pub use request::{Per, Query, QueryOptions, QueryOutput, QueryRequest, QueryResponse};
pub use series::{SeriesOutput, TimedSeries};
pub use service::QueryService;
