use std::collections::{BTreeMap, HashMap};

use time::OffsetDateTime;
use wlan_client::{AccessPointKey, Utilization};

use crate::{
    pipeline::PipelineError,
    sources::graphite::{Datapoint, RawSeries},
};

/// Access point and SSID encoded in a series name such as
/// `ap.apa01-0mg.ssid.@BayernWLAN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetName<'a> {
    pub access_point: &'a str,
    pub ssid: &'a str,
}

/// Split a dotted target: the second segment names the access point, the last
/// one the SSID.
pub fn parse_target(target: &str) -> Result<TargetName<'_>, PipelineError> {
    let mut parts = target.split('.');
    let _prefix = parts.next();
    let access_point = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PipelineError::Parse(format!("target {target:?} has no access point segment")))?;
    let ssid = parts.last().unwrap_or(access_point);

    Ok(TargetName { access_point, ssid })
}

/// Convert backend Unix seconds to a UTC instant rounded to whole
/// microseconds, the resolution of `TIMESTAMPTZ`. `None` when the value cannot
/// be represented.
pub fn unix_to_utc(seconds: f64) -> Option<OffsetDateTime> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1e6).round() as i128;
    let nanos = micros.checked_mul(1_000)?;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// Contribution of one datapoint value. Null counts as zero; so do negative or
/// non-finite values, which are reported through the second tuple field.
pub fn user_count(value: Option<f64>) -> (i64, bool) {
    match value {
        None => (0, false),
        Some(v) if v.is_finite() && v >= 0.0 => (v.round() as i64, false),
        Some(_) => (0, true),
    }
}

/// Running user counts per access point and instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtilizationBuckets {
    inner: BTreeMap<String, BTreeMap<OffsetDateTime, i64>>,
}

impl UtilizationBuckets {
    /// Open the bucket at zero if it does not exist yet, then add `count`.
    pub fn add(&mut self, access_point: &str, ts: OffsetDateTime, count: i64) {
        let slot = self
            .inner
            .entry(access_point.to_owned())
            .or_default()
            .entry(ts)
            .or_insert(0);
        *slot = slot.saturating_add(count);
    }

    pub fn get(&self, access_point: &str, ts: OffsetDateTime) -> Option<i64> {
        self.inner.get(access_point)?.get(&ts).copied()
    }

    pub fn access_points(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn samples(&self, access_point: &str) -> Option<&BTreeMap<OffsetDateTime, i64>> {
        self.inner.get(access_point)
    }

    /// Number of `(access point, instant)` buckets.
    pub fn len(&self) -> usize {
        self.inner.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Flatten into fact rows. Access points without a key are left out.
    pub fn to_rows(&self, keys: &HashMap<String, AccessPointKey>) -> Vec<Utilization> {
        self.inner
            .iter()
            .filter_map(|(name, samples)| keys.get(name).map(|key| (*key, samples)))
            .flat_map(|(key, samples)| {
                samples.iter().map(move |(ts, count)| Utilization {
                    accesspoint_id: key,
                    timestamp: *ts,
                    user_count: *count,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub buckets: UtilizationBuckets,
    /// Series whose target could not be parsed.
    pub skipped_series: usize,
    /// Datapoints without a usable timestamp.
    pub discarded_points: usize,
    /// Datapoints whose value was negative or non-finite and counted as zero.
    pub invalid_values: usize,
}

impl Aggregation {
    fn fold_point(&mut self, access_point: &str, point: &Datapoint) {
        let Some(ts) = point.timestamp.and_then(unix_to_utc) else {
            self.discarded_points += 1;
            return;
        };
        let (count, invalid) = user_count(point.value);
        if invalid {
            self.invalid_values += 1;
        }
        self.buckets.add(access_point, ts, count);
    }
}

/// Sum every SSID series onto its access point, one value per instant.
///
/// Series may arrive in any order and repeat instants; the result only
/// depends on the multiset of datapoints.
pub fn aggregate(series: &[RawSeries]) -> Aggregation {
    let mut agg = Aggregation::default();

    for s in series {
        let target = match parse_target(&s.target) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(target_name = %s.target, error = %e, "skipping series");
                agg.skipped_series += 1;
                continue;
            }
        };
        for point in &s.datapoints {
            agg.fold_point(target.access_point, point);
        }
    }

    metrics::counter!("crawl_series_skipped_total").increment(agg.skipped_series as u64);
    metrics::counter!("crawl_datapoints_dropped_total")
        .increment((agg.discarded_points + agg.invalid_values) as u64);

    agg
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn series(target: &str, points: &[(Option<f64>, Option<f64>)]) -> RawSeries {
        RawSeries {
            target: target.to_string(),
            datapoints: points.iter().map(|p| Datapoint::from(*p)).collect(),
        }
    }

    #[test]
    fn parse_target_takes_second_and_last_segment() {
        let t = parse_target("ap.apa01-0mg.ssid.@BayernWLAN").unwrap();
        assert_eq!(t.access_point, "apa01-0mg");
        assert_eq!(t.ssid, "@BayernWLAN");

        let short = parse_target("ap.apa01-0mg").unwrap();
        assert_eq!(short.access_point, "apa01-0mg");
    }

    #[test]
    fn parse_target_rejects_single_segment() {
        assert!(matches!(parse_target("apa01-0mg"), Err(PipelineError::Parse(_))));
        assert!(matches!(parse_target("ap..ssid"), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn unix_to_utc_is_absolute() {
        assert_eq!(unix_to_utc(1000.0), Some(datetime!(1970-01-01 00:16:40 UTC)));
        assert_eq!(unix_to_utc(f64::NAN), None);
        assert_eq!(unix_to_utc(1e30), None);
    }

    #[test]
    fn sub_microsecond_timestamps_share_a_bucket() {
        assert_eq!(unix_to_utc(1000.0000001), unix_to_utc(1000.0000004));
        assert_eq!(unix_to_utc(1000.0000001), Some(datetime!(1970-01-01 00:16:40 UTC)));
        assert_eq!(unix_to_utc(1000.25), Some(datetime!(1970-01-01 00:16:40.25 UTC)));

        let agg = aggregate(&[
            series("ap.apa01-0mg.ssid.@A", &[(Some(2.0), Some(1000.0000001))]),
            series("ap.apa01-0mg.ssid.@B", &[(Some(3.0), Some(1000.0000004))]),
        ]);
        assert_eq!(agg.buckets.len(), 1);
        assert_eq!(agg.buckets.get("apa01-0mg", datetime!(1970-01-01 00:16:40 UTC)), Some(5));
    }

    #[test]
    fn concurrent_ssids_are_summed() {
        let input = vec![
            series("ap.apa01-0mg.ssid.@A", &[(Some(2.0), Some(1000.0)), (None, Some(1060.0))]),
            series("ap.apa01-0mg.ssid.@B", &[(Some(3.0), Some(1000.0))]),
        ];

        let agg = aggregate(&input);
        let samples = agg.buckets.samples("apa01-0mg").unwrap();

        assert_eq!(agg.buckets.len(), 2);
        assert_eq!(samples[&datetime!(1970-01-01 00:16:40 UTC)], 5);
        assert_eq!(samples[&datetime!(1970-01-01 00:17:40 UTC)], 0);
    }

    #[test]
    fn series_order_does_not_change_result() {
        let a = series("ap.apa01-0mg.ssid.@A", &[(Some(3.0), Some(1000.0)), (Some(1.0), Some(1000.0))]);
        let b = series("ap.apa01-0mg.ssid.@B", &[(Some(5.0), Some(1000.0))]);
        let c = series("ap.apa02-0mg.ssid.@A", &[(Some(7.0), Some(1000.0))]);

        let forward = aggregate(&[a.clone(), b.clone(), c.clone()]);
        let backward = aggregate(&[c, b, a]);

        assert_eq!(forward, backward);
        let ts = datetime!(1970-01-01 00:16:40 UTC);
        assert_eq!(forward.buckets.get("apa01-0mg", ts), Some(9));
        assert_eq!(forward.buckets.get("apa02-0mg", ts), Some(7));
    }

    #[test]
    fn null_timestamp_never_opens_a_bucket() {
        let agg = aggregate(&[series("ap.apa01-0mg.ssid.@A", &[(Some(4.0), None)])]);

        assert!(agg.buckets.is_empty());
        assert_eq!(agg.discarded_points, 1);
    }

    #[test]
    fn invalid_values_count_as_zero() {
        let agg = aggregate(&[series(
            "ap.apa01-0mg.ssid.@A",
            &[(Some(-2.0), Some(1000.0)), (Some(f64::INFINITY), Some(1000.0)), (Some(1.6), Some(1000.0))],
        )]);

        assert_eq!(agg.invalid_values, 2);
        assert_eq!(agg.buckets.get("apa01-0mg", datetime!(1970-01-01 00:16:40 UTC)), Some(2));
    }

    #[test]
    fn unparseable_series_are_skipped() {
        let agg = aggregate(&[
            series("garbage", &[(Some(1.0), Some(1000.0))]),
            series("ap.apa01-0mg.ssid.@A", &[(Some(1.0), Some(1000.0))]),
        ]);

        assert_eq!(agg.skipped_series, 1);
        assert_eq!(agg.buckets.access_points().collect::<Vec<_>>(), vec!["apa01-0mg"]);
    }

    #[test]
    fn to_rows_uses_resolved_keys() {
        let mut buckets = UtilizationBuckets::default();
        let ts = datetime!(2024-01-01 00:00:00 UTC);
        buckets.add("apa01-0mg", ts, 4);
        buckets.add("apa02-0mg", ts, 1);

        let keys = HashMap::from([("apa01-0mg".to_string(), AccessPointKey(7))]);
        let rows = buckets.to_rows(&keys);

        assert_eq!(
            rows,
            vec![Utilization {
                accesspoint_id: AccessPointKey(7),
                timestamp: ts,
                user_count: 4,
            }]
        );
    }
}
