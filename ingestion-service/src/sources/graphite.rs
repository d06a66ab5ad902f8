use std::time::Duration;

use serde::Deserialize;

use crate::{
    config::GraphiteConfig,
    pipeline::{Envelope, PipelineError, SeriesSource},
};

/// One render request: a relative window plus a single wildcard target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesQuery {
    pub from: String,
    pub until: Option<String>,
    pub target: String,
}

/// A `[value, timestamp]` pair as rendered by the backend. Either side may be null.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "(Option<f64>, Option<f64>)")]
pub struct Datapoint {
    pub value: Option<f64>,
    pub timestamp: Option<f64>,
}

impl From<(Option<f64>, Option<f64>)> for Datapoint {
    fn from((value, timestamp): (Option<f64>, Option<f64>)) -> Self {
        Self { value, timestamp }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawSeries {
    pub target: String,
    pub datapoints: Vec<Datapoint>,
}

/// Build `PREFIX.{a,b,c}.SSID_PATTERN` expressions covering `names`, at most
/// `max_per_query` names each. A chunk holding a single name is not braced.
pub fn wildcard_targets(prefix: &str, names: &[&str], ssid_pattern: &str, max_per_query: usize) -> Vec<String> {
    names
        .chunks(max_per_query.max(1))
        .map(|chunk| match chunk {
            [single] => format!("{prefix}.{single}.{ssid_pattern}"),
            many => format!("{prefix}.{{{}}}.{ssid_pattern}", many.join(",")),
        })
        .collect()
}

/// Decode a render response body, skipping series that do not have the
/// expected `{target, datapoints}` shape.
pub fn decode_series(body: &str) -> Result<Vec<RawSeries>, PipelineError> {
    let items: Vec<serde_json::Value> = serde_json::from_str(body)
        .map_err(|e| PipelineError::Parse(format!("render response is not a JSON array: {e}")))?;

    let mut series = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<RawSeries>(item) {
            Ok(s) => series.push(s),
            Err(e) => {
                metrics::counter!("crawl_series_skipped_total").increment(1);
                tracing::warn!(error = %e, "skipping malformed series in render response");
            }
        }
    }
    Ok(series)
}

/// Graphite `/render` client.
pub struct GraphiteSource {
    client: reqwest::Client,
    render_url: String,
}

impl GraphiteSource {
    pub fn new(cfg: &GraphiteConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Source(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            render_url: format!("{}/render/", cfg.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait::async_trait]
impl SeriesSource for GraphiteSource {
    async fn fetch(&self, query: &SeriesQuery) -> Result<Envelope<Vec<RawSeries>>, PipelineError> {
        let mut params = vec![("from", query.from.as_str()), ("target", query.target.as_str())];
        if let Some(until) = &query.until {
            params.push(("until", until.as_str()));
        }
        params.push(("format", "json"));

        let resp = self
            .client
            .get(&self.render_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| PipelineError::Source(format!("render request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Source(format!("render request returned {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| PipelineError::Source(format!("failed to read render response: {e}")))?;
        let series = decode_series(&body)?;

        tracing::debug!(target_pattern = %query.target, series = series.len(), "fetched series");
        Ok(Envelope::now(series))
    }
}
