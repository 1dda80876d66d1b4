//! Per-source weekly aggregation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use showpulse_core::{floor_to_monday, RawRecord, WeeklyAggregate};

use crate::error::AggregateError;
use crate::spec::{AggregateOp, SourceSpec};

/// Deduplicate a batch by `source_record_id`, keeping the record with the
/// latest `scrape_run_at` when ids collide (most recent scrape wins).
/// Records without a stable id are assumed unique and pass through.
#[must_use]
pub fn dedupe_records(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let mut by_id: HashMap<String, RawRecord> = HashMap::new();
    let mut without_id: Vec<RawRecord> = Vec::new();
    let total = records.len();

    for record in records {
        match &record.source_record_id {
            None => without_id.push(record),
            Some(id) => match by_id.get(id) {
                Some(existing) if existing.scrape_run_at >= record.scrape_run_at => {}
                _ => {
                    by_id.insert(id.clone(), record);
                }
            },
        }
    }

    let mut survivors: Vec<RawRecord> = by_id.into_values().collect();
    survivors.extend(without_id);
    let removed = total - survivors.len();
    if removed > 0 {
        tracing::info!(removed, "dropped superseded duplicate records");
    }
    survivors
}

/// Aggregate one source's raw records into weekly rows per `spec`.
///
/// Deduplicates, buckets by (entity, Monday floor of the event timestamp),
/// computes each declared column, stamps `run_at`, and validates the batch
/// against the spec's manifest before returning it. Output is sorted by
/// (entity, week_start) and unique on that key by construction.
///
/// # Errors
///
/// Returns [`AggregateError::Schema`] with the full violation list if the
/// produced batch does not conform to the spec's manifest.
pub fn aggregate(
    spec: &SourceSpec,
    records: Vec<RawRecord>,
    run_at: DateTime<Utc>,
) -> Result<Vec<WeeklyAggregate>, AggregateError> {
    let survivors = dedupe_records(records);

    let mut buckets: BTreeMap<(String, NaiveDate), Vec<RawRecord>> = BTreeMap::new();
    for record in survivors {
        let key = (record.entity.clone(), floor_to_monday(record.timestamp));
        buckets.entry(key).or_default().push(record);
    }

    let batch: Vec<WeeklyAggregate> = buckets
        .into_iter()
        .map(|((entity, week_start), bucket)| WeeklyAggregate {
            source: spec.source.clone(),
            entity,
            week_start,
            values: spec
                .columns
                .iter()
                .map(|column| (column.name.clone(), compute(&column.op, &bucket)))
                .collect(),
            scrape_run_at: run_at,
        })
        .collect();

    spec.manifest().validate_batch(&batch)?;
    tracing::info!(
        source = %spec.source,
        rows = batch.len(),
        "aggregated weekly rows"
    );
    Ok(batch)
}

#[allow(clippy::cast_precision_loss)]
fn compute(op: &AggregateOp, bucket: &[RawRecord]) -> Option<f64> {
    match op {
        AggregateOp::Count => Some(bucket.len() as f64),
        AggregateOp::Sum { metric } => {
            let values: Vec<f64> = bucket
                .iter()
                .filter_map(|r| r.metrics.get(metric).copied())
                .collect();
            // No record carried the metric: no data, not zero.
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum())
            }
        }
        AggregateOp::Mean { metric } => {
            let values: Vec<f64> = bucket
                .iter()
                .filter_map(|r| r.metrics.get(metric).copied())
                .collect();
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AggregateOp::DistinctDays => {
            let days: BTreeSet<NaiveDate> =
                bucket.iter().map(|r| r.timestamp.date_naive()).collect();
            Some(days.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::OutputColumn;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn spec() -> SourceSpec {
        SourceSpec::new(
            "tiktok",
            vec![
                OutputColumn::new("tt_posts", AggregateOp::Count),
                OutputColumn::new(
                    "tt_sum_views",
                    AggregateOp::Sum {
                        metric: "views".to_owned(),
                    },
                ),
                OutputColumn::new("tt_posting_days", AggregateOp::DistinctDays),
            ],
        )
    }

    fn record(
        entity: &str,
        day: u32,
        id: Option<&str>,
        views: Option<f64>,
        scraped_day: u32,
    ) -> RawRecord {
        RawRecord {
            entity: entity.to_owned(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            source_record_id: id.map(str::to_owned),
            scrape_run_at: Utc.with_ymd_and_hms(2024, 2, scraped_day, 0, 0, 0).unwrap(),
            metrics: views
                .map(|v| BTreeMap::from([("views".to_owned(), v)]))
                .unwrap_or_default(),
            raw_payload_ref: None,
        }
    }

    fn run_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn buckets_by_entity_and_monday_week() {
        // Jan 3 and Jan 5 are in the week of Jan 1; Jan 8 starts a new week.
        let rows = aggregate(
            &spec(),
            vec![
                record("Oh Mary!", 3, Some("a"), Some(100.0), 1),
                record("Oh Mary!", 5, Some("b"), Some(50.0), 1),
                record("Oh Mary!", 8, Some("c"), Some(10.0), 1),
            ],
            run_at(),
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].week_start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(rows[0].values["tt_posts"], Some(2.0));
        assert_eq!(rows[0].values["tt_sum_views"], Some(150.0));
        assert_eq!(rows[0].values["tt_posting_days"], Some(2.0));
        assert_eq!(rows[1].week_start, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert_eq!(rows[1].values["tt_sum_views"], Some(10.0));
    }

    #[test]
    fn later_scrape_wins_on_duplicate_record_id() {
        let rows = aggregate(
            &spec(),
            vec![
                record("Oh Mary!", 3, Some("post-1"), Some(100.0), 1),
                record("Oh Mary!", 3, Some("post-1"), Some(250.0), 9),
            ],
            run_at(),
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values["tt_posts"], Some(1.0));
        assert_eq!(rows[0].values["tt_sum_views"], Some(250.0));
    }

    #[test]
    fn records_without_id_are_never_deduplicated() {
        let rows = aggregate(
            &spec(),
            vec![
                record("Oh Mary!", 3, None, Some(1.0), 1),
                record("Oh Mary!", 3, None, Some(1.0), 1),
            ],
            run_at(),
        )
        .unwrap();
        assert_eq!(rows[0].values["tt_posts"], Some(2.0));
    }

    #[test]
    fn missing_metric_sums_to_null_not_zero() {
        let rows = aggregate(
            &spec(),
            vec![record("Oh Mary!", 3, Some("a"), None, 1)],
            run_at(),
        )
        .unwrap();
        assert_eq!(rows[0].values["tt_posts"], Some(1.0));
        assert_eq!(rows[0].values["tt_sum_views"], None);
    }

    #[test]
    fn aggregation_is_idempotent_over_the_same_input() {
        let input = vec![
            record("Oh Mary!", 3, Some("a"), Some(100.0), 1),
            record("Hamilton", 4, Some("b"), Some(70.0), 2),
            record("Oh Mary!", 9, None, Some(5.0), 1),
        ];
        let first = aggregate(&spec(), input.clone(), run_at()).unwrap();
        let second = aggregate(&spec(), input, run_at()).unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.entity, b.entity);
            assert_eq!(a.week_start, b.week_start);
            assert_eq!(a.values, b.values);
        }
    }

    #[test]
    fn output_is_sorted_and_unique_on_entity_week() {
        let rows = aggregate(
            &spec(),
            vec![
                record("Wicked", 10, Some("w"), Some(1.0), 1),
                record("Hamilton", 3, Some("h"), Some(1.0), 1),
                record("Hamilton", 12, Some("h2"), Some(1.0), 1),
            ],
            run_at(),
        )
        .unwrap();
        let keys: Vec<(&str, NaiveDate)> = rows
            .iter()
            .map(|r| (r.entity.as_str(), r.week_start))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn mean_averages_only_records_carrying_the_metric() {
        let spec = SourceSpec::new(
            "trends",
            vec![OutputColumn::new(
                "gt_index",
                AggregateOp::Mean {
                    metric: "interest".to_owned(),
                },
            )],
        );
        let mut with = record("Oh Mary!", 3, None, None, 1);
        with.metrics.insert("interest".to_owned(), 40.0);
        let mut with2 = record("Oh Mary!", 4, None, None, 1);
        with2.metrics.insert("interest".to_owned(), 60.0);
        let without = record("Oh Mary!", 5, None, None, 1);

        let rows = aggregate(&spec, vec![with, with2, without], run_at()).unwrap();
        assert_eq!(rows[0].values["gt_index"], Some(50.0));
    }
}
