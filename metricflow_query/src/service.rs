use crate::formula::Formula;
use crate::mappers::{default_mapper, DynMapper, MapperRegistry, PartitioningMapper};
use crate::request::{Query, QueryOptions, QueryOutput, QueryRequest, QueryResponse};
use crate::series::TimedSeries;
use futures::future::{try_join, try_join_all};
use metricflow_core::{DynStore, MetricKind, MetricsError, PipelineConfig, Result, Timeframe};
use std::collections::HashMap;
use tracing::{debug, info};

pub struct QueryService {
    store: DynStore,
    kinds: HashMap<String, MetricKind>,
    overrides: HashMap<String, DynMapper>,
}

impl QueryService {
    pub fn new(store: DynStore) -> Self {
        Self {
            store,
            kinds: HashMap::new(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_kind(mut self, metric_name: impl Into<String>, kind: MetricKind) -> Self {
        self.kinds.insert(metric_name.into(), kind);
        self
    }

    pub fn with_mapper(mut self, metric_name: impl Into<String>, mapper: DynMapper) -> Self {
        self.overrides.insert(metric_name.into(), mapper);
        self
    }

    pub fn from_config(
        config: &PipelineConfig,
        store: DynStore,
        registry: &MapperRegistry,
    ) -> Result<Self> {
        let mut service = Self::new(store);
        service.kinds = config.kinds();

        for (metric_name, mapper_name) in config.mapper_overrides() {
            let mapper = registry.get(&mapper_name).cloned().ok_or_else(|| {
                MetricsError::validation(format!(
                    "Unknown mapper '{}' for metric '{}' (available: {})",
                    mapper_name,
                    metric_name,
                    registry.list().join(", ")
                ))
            })?;
            service.overrides.insert(metric_name, mapper);
        }

        Ok(service)
    }

    pub fn kind_of(&self, metric_name: &str) -> Option<MetricKind> {
        self.kinds.get(metric_name).copied()
    }

    /// Runs every query concurrently. The first failure fails the request.
    pub async fn execute(&self, request: QueryRequest) -> Result<QueryResponse> {
        info!(queries = request.queries.len(), "Executing query request");

        let timeframe = request.timeframe;
        let output = try_join_all(
            request
                .queries
                .into_iter()
                .map(|query| self.run_query(timeframe, query)),
        )
        .await?;

        Ok(QueryResponse { output })
    }

    async fn run_query(
        &self,
        timeframe: Option<Timeframe>,
        mut query: Query,
    ) -> Result<QueryOutput> {
        if query.timeframe.is_none() {
            query.timeframe = timeframe;
        }

        let formula = match &query.per {
            Some(per) => Some(Formula::resolve(per.formula.as_deref())?),
            None => None,
        };

        let primary =
            self.fetch_and_resample(&query.metric_name, query.timeframe, query.options.as_ref());
        let series = match (&query.per, formula) {
            (Some(per), Some(formula)) => {
                let divider = self.fetch_and_resample(
                    &per.metric_name,
                    query.timeframe,
                    per.options.as_ref(),
                );
                let (series, divider) = try_join(primary, divider).await?;
                series.combine(&divider, |a, b| formula.apply(a, b))?
            }
            _ => primary.await?,
        };

        let output = series.to_output();
        let kind = self.kind_of(&query.metric_name);
        let mut sigma = Some(output.sigma);

        if kind == Some(MetricKind::Partitioning) {
            let records = series.map_all(&PartitioningMapper)?;
            if records.len() > 1 {
                return Err(MetricsError::validation(format!(
                    "mapper returned more than one record ({})",
                    records.len()
                )));
            }
            if let Some(values) = records.first().and_then(|r| r.value.as_map()) {
                sigma = Some(values.clone());
            }
        }

        if kind.is_some_and(|k| !k.reports_sigma()) {
            sigma = None;
        }

        debug!(
            metric = %query.metric_name,
            points = output.timestamps.len(),
            "Query answered"
        );

        Ok(QueryOutput {
            query,
            timestamps: output.timestamps,
            sigma,
            values: output.values,
        })
    }

    async fn fetch_and_resample(
        &self,
        metric_name: &str,
        timeframe: Option<Timeframe>,
        options: Option<&QueryOptions>,
    ) -> Result<TimedSeries> {
        let timeframe = timeframe.ok_or_else(|| MetricsError::validation("Missing timeframe"))?;
        let kind = self.kind_of(metric_name);

        let rows = self.store.fetch(metric_name, timeframe).await?;
        debug!(metric = metric_name, rows = rows.len(), "Fetched datapoints");

        let resample = || -> Result<TimedSeries> {
            let options = options.cloned().unwrap_or_default();
            let series = TimedSeries::parse(&rows, options, timeframe, kind)?;

            let mapper = match (self.overrides.get(metric_name), kind) {
                (Some(mapper), _) => mapper.clone(),
                (None, Some(kind)) => default_mapper(kind),
                (None, None) => return Ok(series),
            };

            series.map_intervals(mapper.as_ref(), mapper.requires_absolute())
        };

        resample().map_err(|e| e.with_context(metric_name, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::RateMapper;
    use async_trait::async_trait;
    use metricflow_core::{
        DatapointStore, DatapointValue, MemoryStore, MetricRegistration, StoredRow,
    };
    use mockall::mock;
    use mockall::predicate::*;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    mock! {
        pub Store {}

        #[async_trait]
        impl DatapointStore for Store {
            async fn fetch(
                &self,
                metric_name: &str,
                timeframe: Timeframe,
            ) -> Result<Vec<StoredRow>>;
            async fn put(&self, row: StoredRow) -> Result<()>;
        }
    }

    fn v(name: &str, pairs: &[(i64, f64)]) -> Vec<StoredRow> {
        pairs
            .iter()
            .map(|(t, v)| StoredRow::new(name, *t).with_value(DatapointValue::Number(*v)))
            .collect()
    }

    fn a(name: &str, pairs: &[(i64, f64)]) -> Vec<StoredRow> {
        pairs
            .iter()
            .map(|(t, a)| StoredRow::new(name, *t).with_absolute(DatapointValue::Number(*a)))
            .collect()
    }

    fn vector(pairs: &[(&str, f64)]) -> DatapointValue {
        DatapointValue::Vector(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    fn named_v(name: &str, rows: &[(i64, &[(&str, f64)])]) -> Vec<StoredRow> {
        rows.iter()
            .map(|(t, pairs)| StoredRow::new(name, *t).with_value(vector(pairs)))
            .collect()
    }

    fn named_va(name: &str, rows: &[(i64, &[(&str, f64)], f64)]) -> Vec<StoredRow> {
        rows.iter()
            .map(|(t, pairs, a)| {
                StoredRow::new(name, *t)
                    .with_value(vector(pairs))
                    .with_absolute(DatapointValue::Number(*a))
            })
            .collect()
    }

    fn store(rows: Vec<StoredRow>) -> DynStore {
        Arc::new(MemoryStore::with_rows(rows))
    }

    fn request(from: i64, to: i64, queries: Value) -> QueryRequest {
        serde_json::from_value(json!({
            "timeframe": {"fromTimestamp": from, "toTimestamp": to},
            "queries": queries
        }))
        .unwrap()
    }

    async fn run(service: &QueryService, from: i64, to: i64, queries: Value) -> Value {
        let response = service.execute(request(from, to, queries)).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    fn interval(millis: i64) -> Value {
        json!([{"metricName": "M_A", "options": {"intervalMillis": millis}}])
    }

    fn named_interval(millis: i64) -> Value {
        json!([{"metricName": "M_A", "options": {"namedSeries": [], "intervalMillis": millis}}])
    }

    fn rate_override(rows: Vec<StoredRow>) -> QueryService {
        QueryService::new(store(rows))
            .with_kind("M_A", MetricKind::Rate)
            .with_mapper("M_A", Arc::new(RateMapper))
    }

    #[tokio::test]
    async fn test_fetches_with_metric_and_timeframe() {
        let mut mock = MockStore::new();
        mock.expect_fetch()
            .with(eq("M_1"), eq(Timeframe::new(100, 200)))
            .times(1)
            .returning(|_, _| Ok(vec![]));

        let service = QueryService::new(Arc::new(mock));
        let request = json!([{"metricName": "M_1", "options": {"namedSeries": []}}]);
        let out = run(&service, 100, 200, request).await;
        assert_eq!(out["output"][0]["timestamps"], json!([]));
        assert_eq!(out["output"][0]["values"], json!({}));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut mock = MockStore::new();
        mock.expect_fetch()
            .returning(|_, _| Err(MetricsError::storage("table unavailable")));

        let service = QueryService::new(Arc::new(mock)).with_kind("M_1", MetricKind::Rate);
        let err = service
            .execute(request(100, 200, json!([{"metricName": "M_1"}])))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Storage error: table unavailable");
    }

    #[tokio::test]
    async fn test_transforms_rows() {
        let service = QueryService::new(store(v("M_1", &[(101, 10.0), (102, 20.0), (103, 30.0)])));
        let out = run(&service, 100, 200, json!([{"metricName": "M_1", "options": {}}])).await;

        assert_eq!(
            out,
            json!({"output": [{
                "query": {
                    "metricName": "M_1",
                    "options": {},
                    "timeframe": {"fromTimestamp": 100, "toTimestamp": 200}
                },
                "timestamps": [101, 102, 103],
                "sigma": {"DEFAULT": 0.0},
                "values": {"DEFAULT": [10.0, 20.0, 30.0]}
            }]})
        );
    }

    #[tokio::test]
    async fn test_selects_named_series() {
        let rows = named_v(
            "M_1",
            &[
                (101, &[("v1", 1.0), ("v2", 2.0), ("v3", 3.0)]),
                (102, &[("v1", 4.0), ("v2", 5.0), ("v3", 6.0)]),
            ],
        );
        let service = QueryService::new(store(rows));

        let request = json!([{"metricName": "M_1", "options": {"namedSeries": []}}]);
        let all = run(&service, 100, 200, request).await;
        assert_eq!(all["output"][0]["sigma"], json!({"v1": 0.0, "v2": 0.0, "v3": 0.0}));

        let picked = run(
            &service,
            100,
            200,
            json!([{"metricName": "M_1", "options": {"namedSeries": ["v1", "v3"]}}]),
        )
        .await;
        assert_eq!(picked["output"][0]["values"], json!({"v1": [1.0, 4.0], "v3": [3.0, 6.0]}));
    }

    #[tokio::test]
    async fn test_multiple_queries_keep_order_and_identifier() {
        let mut rows = v("M_1", &[(30, 63.0), (40, 64.0), (50, 65.0)]);
        rows.extend(v("M_2", &[(31, 73.0), (41, 74.0), (51, 75.0)]));
        let service = QueryService::new(store(rows));

        let out = run(
            &service,
            20,
            55,
            json!([
                {"identifier": "I_600", "metricName": "M_1"},
                {"identifier": "I_700", "metricName": "M_2"}
            ]),
        )
        .await;

        let output = out["output"].as_array().unwrap();
        assert_eq!(output[0]["query"]["identifier"], "I_600");
        assert_eq!(output[0]["values"]["DEFAULT"], json!([63.0, 64.0, 65.0]));
        assert_eq!(output[1]["query"]["identifier"], "I_700");
        assert_eq!(output[1]["timestamps"], json!([31, 41, 51]));
    }

    #[tokio::test]
    async fn test_query_timeframe_wins_over_request() {
        let service = QueryService::new(store(v("M_1", &[(30, 1.0), (150, 2.0)])));
        let out = run(
            &service,
            0,
            100,
            json!([{"metricName": "M_1", "timeframe": {"fromTimestamp": 100, "toTimestamp": 200}}]),
        )
        .await;
        assert_eq!(out["output"][0]["timestamps"], json!([150]));
    }

    #[tokio::test]
    async fn test_missing_timeframe() {
        let service = QueryService::new(store(vec![]));
        let request: QueryRequest =
            serde_json::from_value(json!({"queries": [{"metricName": "M_1"}]})).unwrap();
        let err = service.execute(request).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing timeframe");
    }

    #[tokio::test]
    async fn test_sigma_integral_with_min_max() {
        let service = QueryService::new(store(a(
            "M_A",
            &[(100_000, 120.0), (110_000, 500.0), (120_000, 270.0), (130_000, 240.0)],
        )))
        .with_kind("M_A", MetricKind::Rate);

        let out = run(&service, 100_000, 140_000, interval(10_000)).await;
        assert_eq!(out["output"][0]["sigma"], json!({"DEFAULT": 1130.0}));
    }

    #[tokio::test]
    async fn test_sigma_integral_with_rate() {
        let service = rate_override(a("M_A", &[(100_010, 20.0), (100_020, 73.0)]));
        let out = run(&service, 100_000, 102_000, interval(1200)).await;
        assert_eq!(out["output"][0]["sigma"], json!({"DEFAULT": 93.0}));
    }

    #[tokio::test]
    async fn test_formulas() {
        let cases: [(&str, &[(i64, f64)], &[(i64, f64)], Value); 3] = [
            (
                "FRACTION",
                &[(101, 10.0), (102, 20.0), (103, 16.0)],
                &[(101, 2.0), (102, 5.0), (103, 8.0)],
                json!([5.0, 4.0, 2.0]),
            ),
            (
                "FRACTION_COMPLEMENT",
                &[(101, 120.0), (102, 240.0), (103, 360.0)],
                &[(101, 200.0), (102, 300.0), (103, 400.0)],
                json!([0.4, 0.2, 0.1]),
            ),
            (
                "PARTS",
                &[(101, 8.0), (102, 20.0), (103, 12.0)],
                &[(101, 2.0), (102, 60.0), (103, 8.0)],
                json!([0.8, 0.25, 0.6]),
            ),
        ];

        for (formula, rows_a, rows_b, expected) in cases {
            let mut rows = v("M_A", rows_a);
            rows.extend(v("M_B", rows_b));
            let service = QueryService::new(store(rows));

            let out = run(
                &service,
                100,
                200,
                json!([{"metricName": "M_A", "per": {"metricName": "M_B", "formula": formula}}]),
            )
            .await;

            assert_eq!(out["output"][0]["values"]["DEFAULT"], expected, "{}", formula);
            assert_eq!(out["output"][0]["timestamps"], json!([101, 102, 103]));
            assert_eq!(out["output"][0]["query"]["per"]["formula"], formula);
        }
    }

    #[tokio::test]
    async fn test_divider_is_interpolated() {
        let cases = [
            (120, 48.0, [(110, 10.0), (130, 14.0)], json!([4.0])),
            (120, 60.0, [(118, 6.0), (128, 36.0)], json!([5.0])),
            (100, 60.0, [(118, 6.0), (128, 36.0)], json!([])),
            (150, 60.0, [(118, 6.0), (128, 36.0)], json!([])),
        ];

        for (t, value, divider, expected) in cases {
            let mut rows = v("M_A", &[(t, value)]);
            rows.extend(v("M_B", &divider));
            let service = QueryService::new(store(rows));

            let out = run(
                &service,
                100,
                200,
                json!([{"metricName": "M_A", "per": {"metricName": "M_B"}}]),
            )
            .await;
            assert_eq!(out["output"][0]["values"]["DEFAULT"], expected);
            assert_eq!(out["output"][0]["sigma"], json!({"DEFAULT": 0.0}));
        }
    }

    #[tokio::test]
    async fn test_bad_formula_is_rejected() {
        let service = QueryService::new(store(vec![]));
        let err = service
            .execute(request(
                100,
                200,
                json!([{"metricName": "M_A", "per": {"metricName": "M_B", "formula": "RATIO"}}]),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Bad formula value (RATIO)");
    }

    #[tokio::test]
    async fn test_min_max_picks_high_and_low() {
        let service = QueryService::new(store(a(
            "M_A",
            &[
                (100_000, 15.0),
                (100_200, 70.0),
                (100_400, 20.0),
                (100_600, 6.0),
                (100_800, 9.0),
            ],
        )))
        .with_kind("M_A", MetricKind::Rate);

        let out = run(&service, 100_000, 101_000, interval(1000)).await;
        assert_eq!(
            out["output"][0],
            json!({
                "query": {
                    "metricName": "M_A",
                    "options": {"intervalMillis": 1000},
                    "timeframe": {"fromTimestamp": 100_000, "toTimestamp": 101_000}
                },
                "timestamps": [100_200, 100_600],
                "sigma": {"DEFAULT": 120.0},
                "values": {"DEFAULT": [350.0, 30.0]}
            })
        );
    }

    #[tokio::test]
    async fn test_rate_per_interval() {
        let service = rate_override(a("M_A", &[(100_000, 15.0), (103_000, 9.0)]));
        let out = run(&service, 100_000, 104_000, interval(4000)).await;
        assert_eq!(out["output"][0]["timestamps"], json!([102_000]));
        assert_eq!(out["output"][0]["values"]["DEFAULT"], json!([6.0]));
        assert_eq!(out["output"][0]["sigma"]["DEFAULT"], json!(24.0));

        let service = rate_override(vec![]);
        let out = run(&service, 100_000, 112_000, interval(4000)).await;
        assert_eq!(out["output"][0]["timestamps"], json!([102_000, 106_000, 110_000]));
        assert_eq!(out["output"][0]["values"]["DEFAULT"], json!([0.0, 0.0, 0.0]));

        let service = rate_override(a(
            "M_A",
            &[
                (100_000, 15.0),
                (103_000, 9.0),
                (105_000, 30.0),
                (106_000, 26.0),
                (107_000, 12.0),
                (109_000, 36.0),
            ],
        ));
        let out = run(&service, 100_000, 112_000, interval(4000)).await;
        assert_eq!(out["output"][0]["values"]["DEFAULT"], json!([6.0, 17.0, 9.0]));
        assert_eq!(out["output"][0]["sigma"]["DEFAULT"], json!(128.0));
    }

    #[tokio::test]
    async fn test_rate_unaligned_timeframe() {
        let service = rate_override(a(
            "M_A",
            &[(103_000, 7.0), (105_000, 20.0), (111_000, 8.0), (113_000, 35.0)],
        ));
        let out = run(&service, 100_000, 119_000, interval(7000)).await;
        assert_eq!(out["output"][0]["timestamps"], json!([101_500, 108_500, 115_500]));
        assert_eq!(out["output"][0]["values"]["DEFAULT"], json!([1.0, 4.0, 5.0]));
        assert_eq!(out["output"][0]["sigma"]["DEFAULT"], json!(70.0));
    }

    #[tokio::test]
    async fn test_rate_falls_back_to_relative_values() {
        let service = rate_override(v("M_A", &[(101_000, 4.0), (107_000, 12.0)]));
        let out = run(&service, 100_000, 110_000, interval(4000)).await;
        assert_eq!(out["output"][0]["timestamps"], json!([101_000, 107_000]));
        assert_eq!(out["output"][0]["values"]["DEFAULT"], json!([4.0, 12.0]));
        assert_eq!(out["output"][0]["sigma"]["DEFAULT"], json!(0.0));
    }

    #[tokio::test]
    async fn test_partitioning_single_interval() {
        let rows = named_va(
            "M_A",
            &[
                (101_000, &[("v1", 0.3), ("v2", 0.7)], 30.0),
                (103_000, &[("v1", 0.4), ("v2", 0.6)], 20.0),
            ],
        );
        let service = QueryService::new(store(rows)).with_kind("M_A", MetricKind::Partitioning);

        let out = run(&service, 100_000, 104_000, named_interval(4000)).await;
        assert_eq!(out["output"][0]["timestamps"], json!([102_000]));
        assert_eq!(out["output"][0]["sigma"], json!({"v1": 0.34, "v2": 0.66}));
        assert_eq!(out["output"][0]["values"], json!({"v1": [0.34], "v2": [0.66]}));
    }

    #[tokio::test]
    async fn test_partitioning_all_intervals() {
        let rows = named_va(
            "M_A",
            &[
                (101_000, &[("v1", 0.3), ("v2", 0.7)], 30.0),
                (103_000, &[("v1", 0.4), ("v2", 0.6)], 20.0),
                (105_000, &[("v1", 0.9), ("v2", 0.1)], 100.0),
                (107_000, &[("v1", 0.8), ("v2", 0.2)], 100.0),
                (109_000, &[("v1", 0.6), ("v2", 0.4)], 20.0),
                (111_000, &[("v1", 0.5), ("v2", 0.5)], 80.0),
                (113_000, &[("v1", 0.25), ("v2", 0.75)], 400.0),
                (115_000, &[("v1", 0.7), ("v2", 0.3)], 1600.0),
            ],
        );
        let service = QueryService::new(store(rows)).with_kind("M_A", MetricKind::Partitioning);

        let out = run(&service, 100_000, 116_000, named_interval(4000)).await;
        assert_eq!(
            out["output"][0]["timestamps"],
            json!([102_000, 106_000, 110_000, 114_000])
        );
        assert_eq!(out["output"][0]["sigma"], json!({"v1": 0.62085, "v2": 0.37915}));
        assert_eq!(
            out["output"][0]["values"],
            json!({"v1": [0.34, 0.85, 0.52, 0.61], "v2": [0.66, 0.15, 0.48, 0.39]})
        );
    }

    #[tokio::test]
    async fn test_partitioning_skips_empty_intervals() {
        let rows = named_va(
            "M_A",
            &[
                (101_000, &[("v1", 0.3), ("v2", 0.7)], 30.0),
                (103_000, &[("v1", 0.4), ("v2", 0.6)], 20.0),
                (109_000, &[("v1", 0.6), ("v2", 0.4)], 20.0),
                (111_000, &[("v1", 0.5), ("v2", 0.5)], 80.0),
                (113_000, &[("v1", 0.2), ("v2", 0.8)], 50.0),
                (115_000, &[("v1", 0.7), ("v2", 0.3)], 50.0),
            ],
        );
        let service = QueryService::new(store(rows)).with_kind("M_A", MetricKind::Partitioning);

        let out = run(&service, 96_000, 116_000, named_interval(4000)).await;
        assert_eq!(out["output"][0]["timestamps"], json!([102_000, 110_000, 114_000]));
        assert_eq!(out["output"][0]["sigma"], json!({"v1": 0.456, "v2": 0.544}));
        assert_eq!(
            out["output"][0]["values"],
            json!({"v1": [0.34, 0.52, 0.45], "v2": [0.66, 0.48, 0.55]})
        );
    }

    #[tokio::test]
    async fn test_partitioning_missing_names_are_zero() {
        let rows = named_va(
            "M_A",
            &[
                (101_000, &[("v1", 0.3), ("v2", 0.7)], 30.0),
                (103_000, &[("v1", 0.4), ("v2", 0.6)], 20.0),
                (105_000, &[("v1", 0.9), ("v3", 0.1)], 100.0),
                (107_000, &[("v1", 0.8), ("v3", 0.2)], 100.0),
            ],
        );
        let service = QueryService::new(store(rows)).with_kind("M_A", MetricKind::Partitioning);

        let out = run(&service, 100_000, 108_000, named_interval(4000)).await;
        assert_eq!(out["output"][0]["sigma"], json!({"v1": 0.748, "v2": 0.132, "v3": 0.12}));
        assert_eq!(
            out["output"][0]["values"],
            json!({"v1": [0.34, 0.85], "v2": [0.66, 0.0], "v3": [0.0, 0.15]})
        );
    }

    async fn percentile_values(
        kind: MetricKind,
        rows: Vec<StoredRow>,
        from: i64,
        to: i64,
        width: i64,
    ) -> Value {
        let service = QueryService::new(store(rows)).with_kind("M_A", kind);
        let mut out = run(&service, from, to, named_interval(width)).await;
        let output = out["output"][0].take();
        assert!(output.get("sigma").is_none());
        json!({"timestamps": output["timestamps"], "values": output["values"]})
    }

    #[tokio::test]
    async fn test_percentile_merges_by_level() {
        for (name, expected) in [("p50", 70.0), ("p90", 200.0), ("p10", 30.0)] {
            let rows = named_v(
                "M_A",
                &[
                    (101_000, &[(name, 30.0)]),
                    (103_000, &[(name, 200.0)]),
                    (103_500, &[(name, 70.0)]),
                ],
            );
            let out = percentile_values(MetricKind::Percentile, rows, 100_000, 104_000, 4000).await;
            let mut values = BTreeMap::new();
            values.insert(name, vec![expected]);
            assert_eq!(out, json!({"timestamps": [102_000], "values": values}));
        }

        let rows = named_v(
            "M_A",
            &[
                (101_000, &[("min", 400.0), ("max", 500.0)]),
                (103_000, &[("min", 200.0), ("max", 250.0)]),
            ],
        );
        let out = percentile_values(MetricKind::Percentile, rows, 100_000, 104_000, 4000).await;
        assert_eq!(out["values"], json!({"min": [200.0], "max": [500.0]}));

        let rows = named_v(
            "M_A",
            &[
                (101_000, &[("p4", 30.0), ("p50", 60.0), ("p86", 110.0)]),
                (103_000, &[("p4", 29.0), ("p50", 90.0), ("p86", 108.0)]),
                (103_500, &[("p4", 32.0), ("p50", 70.0), ("p86", 107.0)]),
            ],
        );
        let out = percentile_values(MetricKind::Percentile, rows, 100_000, 104_000, 4000).await;
        assert_eq!(out["values"], json!({"p4": [29.0], "p50": [70.0], "p86": [110.0]}));
    }

    fn percentile_rows() -> Vec<StoredRow> {
        named_v(
            "M_A",
            &[
                (100_001, &[("p4", 30.0), ("p50", 60.0), ("p86", 110.0)]),
                (100_002, &[("p4", 29.0), ("p50", 90.0), ("p86", 108.0)]),
                (100_003, &[("p4", 32.0), ("p50", 70.0), ("p86", 107.0)]),
                (100_005, &[("p4", 200.0), ("p50", 220.0), ("p86", 240.0)]),
                (100_006, &[("p4", 201.0), ("p50", 230.0), ("p86", 239.0)]),
                (100_008, &[("p4", 480.0), ("p50", 580.0), ("p86", 680.0)]),
                (100_009, &[("p4", 490.0), ("p50", 590.0), ("p86", 690.0)]),
                (100_010, &[("p4", 470.0), ("p50", 570.0), ("p86", 670.0)]),
            ],
        )
    }

    #[tokio::test]
    async fn test_percentile_per_interval() {
        for kind in [MetricKind::Percentile, MetricKind::PercentileBottom] {
            let out = percentile_values(kind, percentile_rows(), 100_000, 100_012, 4).await;
            assert_eq!(
                out,
                json!({
                    "timestamps": [100_002, 100_006, 100_010],
                    "values": {
                        "p4": [29.0, 200.0, 470.0],
                        "p50": [70.0, 220.0, 580.0],
                        "p86": [110.0, 240.0, 690.0]
                    }
                })
            );
        }
    }

    #[tokio::test]
    async fn test_percentile_skips_empty_intervals() {
        let rows = named_v(
            "M_A",
            &[
                (100, &[("p4", 30.0), ("p50", 60.0), ("p86", 110.0)]),
                (102, &[("p4", 29.0), ("p50", 90.0), ("p86", 108.0)]),
                (108, &[("p4", 480.0), ("p50", 580.0), ("p86", 680.0)]),
                (109, &[("p4", 490.0), ("p50", 590.0), ("p86", 690.0)]),
            ],
        );
        let out = percentile_values(MetricKind::Percentile, rows, 96, 112, 4).await;
        assert_eq!(
            out,
            json!({
                "timestamps": [102, 110],
                "values": {
                    "p4": [29.0, 480.0],
                    "p50": [60.0, 580.0],
                    "p86": [110.0, 690.0]
                }
            })
        );
    }

    #[tokio::test]
    async fn test_percentile_bad_names_carry_context() {
        let rows = named_v(
            "M_A",
            &[
                (101_000, &[("p1x", 30.0), ("p90", 40.0)]),
                (103_000, &[("pg", 200.0)]),
                (103_500, &[("z20", 70.0)]),
            ],
        );
        let service = QueryService::new(store(rows)).with_kind("M_A", MetricKind::Percentile);
        let err = service
            .execute(request(100_000, 104_000, named_interval(4000)))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "(details: metricName=M_A, type=PERCENTILE) Found bad names: p1x, pg, z20"
        );
    }

    #[tokio::test]
    async fn test_gauge_picks_closest_to_midpoint() {
        let service = QueryService::new(store(v(
            "M_A",
            &[(101_000, 30.0), (102_900, 25.0), (103_000, 20.0)],
        )))
        .with_kind("M_A", MetricKind::Gauge);
        let out = run(&service, 100_000, 104_000, named_interval(4000)).await;
        assert_eq!(
            out["output"][0],
            json!({
                "query": {
                    "metricName": "M_A",
                    "options": {"namedSeries": [], "intervalMillis": 4000},
                    "timeframe": {"fromTimestamp": 100_000, "toTimestamp": 104_000}
                },
                "timestamps": [102_900],
                "values": {"DEFAULT": [25.0]}
            })
        );

        let service = QueryService::new(store(v("M_A", &[(107_000, 300.0), (107_001, 301.0)])))
            .with_kind("M_A", MetricKind::Gauge);
        let out = run(&service, 100_000, 108_000, named_interval(4000)).await;
        assert_eq!(out["output"][0]["timestamps"], json!([107_000]));
        assert_eq!(out["output"][0]["values"], json!({"DEFAULT": [300.0]}));
    }

    #[test]
    fn test_from_config_resolves_mappers() {
        let mut config = PipelineConfig::default();
        config.metrics.push(MetricRegistration {
            name: "api.requests".into(),
            kind: MetricKind::Rate,
            mapper: Some("rate".into()),
        });
        let registry = MapperRegistry::with_defaults();

        let service = QueryService::from_config(&config, store(vec![]), &registry).unwrap();
        assert_eq!(service.kind_of("api.requests"), Some(MetricKind::Rate));
        assert_eq!(service.overrides["api.requests"].name(), "rate");

        config.metrics[0].mapper = Some("average".into());
        let err = QueryService::from_config(&config, store(vec![]), &registry).err().unwrap();
        assert!(err.to_string().starts_with("Unknown mapper 'average'"));
    }
}
