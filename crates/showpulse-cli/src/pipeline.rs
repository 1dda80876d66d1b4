//! Stage handlers for the CLI.
//!
//! Each stage reads its input artifact from `data_dir` and writes its output
//! artifact back, so every stage is idempotent and re-runnable on its own.
//! Per-source failures are logged and carried as warnings rather than
//! propagated, so a single bad source never aborts the whole run.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use showpulse_aggregate::{aggregate, merge, AggregateError, SourceBatch};
use showpulse_core::{
    read_json, write_json, write_panel_preview, AggregateArtifact, PanelArtifact, PipelineConfig,
    RawRecord,
};
use showpulse_features::{build_model_ready, FeatureSpec};
use showpulse_quality::{evaluate, render_summary, QualityStatus, QualityThresholds};

use crate::sources::{default_source_specs, feature_base_metrics, find_source_spec};

fn raw_path(config: &PipelineConfig, source: &str) -> PathBuf {
    config.data_dir.join("raw").join(format!("{source}.json"))
}

fn weekly_path(config: &PipelineConfig, source: &str) -> PathBuf {
    config.data_dir.join("weekly").join(format!("{source}.json"))
}

fn panel_path(config: &PipelineConfig) -> PathBuf {
    config.data_dir.join("panel").join("weekly_panel.json")
}

fn preview_path(config: &PipelineConfig) -> PathBuf {
    config.data_dir.join("panel").join("weekly_panel.txt")
}

fn report_path(config: &PipelineConfig) -> PathBuf {
    config.data_dir.join("panel").join("quality_report.json")
}

fn model_ready_path(config: &PipelineConfig) -> PathBuf {
    config.data_dir.join("panel").join("model_ready.json")
}

/// Aggregate one source's raw records into its weekly artifact.
///
/// # Errors
///
/// Returns an error for an unknown source, an unreadable raw batch, or a
/// batch that fails schema validation (rejected wholesale).
pub(crate) fn run_aggregate(config: &PipelineConfig, source: &str) -> anyhow::Result<()> {
    let spec = find_source_spec(source)
        .ok_or_else(|| anyhow::anyhow!("unknown source '{source}'"))?;

    let input = raw_path(config, source);
    let records: Vec<RawRecord> = read_json(&input)
        .with_context(|| format!("reading raw records from {}", input.display()))?;
    let record_count = records.len();

    let rows = aggregate(&spec, records, Utc::now())?;
    let artifact = AggregateArtifact {
        source: spec.source.clone(),
        manifest: spec.manifest(),
        rows,
    };
    let output = weekly_path(config, source);
    write_json(&output, &artifact)?;
    println!(
        "{source}: {record_count} raw records -> {} weekly rows ({})",
        artifact.rows.len(),
        output.display()
    );
    Ok(())
}

fn load_batches(config: &PipelineConfig) -> Vec<SourceBatch> {
    default_source_specs()
        .into_iter()
        .map(|spec| {
            let path = weekly_path(config, &spec.source);
            match read_json::<AggregateArtifact>(&path) {
                Ok(artifact) => SourceBatch::ok(spec, artifact.rows),
                Err(error) => {
                    let source_name = spec.source.clone();
                    SourceBatch::failed(
                        spec,
                        AggregateError::Unavailable {
                            source_name,
                            reason: error.to_string(),
                        },
                    )
                }
            }
        })
        .collect()
}

/// Merge every source's weekly artifact into the canonical panel.
///
/// Sources without a readable artifact contribute all-null columns and a
/// printed warning; the merge itself never fails on their account.
///
/// # Errors
///
/// Returns an error only if the panel artifact or preview cannot be written.
pub(crate) fn run_merge(config: &PipelineConfig) -> anyhow::Result<()> {
    let outcome = merge(load_batches(config));
    for warning in &outcome.warnings {
        println!("warning: {}: {}", warning.source, warning.reason);
    }

    let path = panel_path(config);
    write_json(&path, &outcome.panel)?;
    write_panel_preview(&preview_path(config), &outcome.panel, config.preview_rows)?;
    println!(
        "panel: {} rows x {} columns ({})",
        outcome.panel.rows.len(),
        outcome.panel.manifest.columns.len(),
        path.display()
    );
    Ok(())
}

/// Evaluate panel quality and persist the report.
///
/// An `ACTION_NEEDED` status is printed and logged but does not fail the
/// command; stricter callers can inspect the persisted report.
///
/// # Errors
///
/// Returns an error if the panel cannot be read or the report not written.
pub(crate) fn run_validate(config: &PipelineConfig) -> anyhow::Result<()> {
    let path = panel_path(config);
    let panel: PanelArtifact = read_json(&path)
        .with_context(|| format!("reading panel from {}", path.display()))?;

    let source_columns: Vec<(String, Vec<String>)> = default_source_specs()
        .iter()
        .map(|s| (s.source.clone(), s.column_names()))
        .collect();
    let thresholds = QualityThresholds {
        coverage_floor: config.coverage_floor,
        anomaly_threshold: config.anomaly_threshold,
        lookback_weeks: config.anomaly_lookback_weeks,
        min_observations: config.anomaly_min_observations,
    };

    let report = evaluate(&panel, &source_columns, &thresholds);
    write_json(&report_path(config), &report)?;
    print!("{}", render_summary(&report));
    if report.status == QualityStatus::ActionNeeded {
        tracing::warn!("quality report needs action; see quality_report.json");
    }
    Ok(())
}

/// Build the model-ready feature table from the panel.
///
/// # Errors
///
/// Returns an error if the panel cannot be read or the table not written.
pub(crate) fn run_features(config: &PipelineConfig) -> anyhow::Result<()> {
    let path = panel_path(config);
    let panel: PanelArtifact = read_json(&path)
        .with_context(|| format!("reading panel from {}", path.display()))?;

    let mut spec = FeatureSpec::new(feature_base_metrics());
    spec.rolling_window = config.rolling_window;
    let table = build_model_ready(&panel, &spec);

    let output = model_ready_path(config);
    write_json(&output, &table)?;
    println!(
        "model-ready: {} rows x {} columns ({})",
        table.rows.len(),
        table.columns.len(),
        output.display()
    );
    Ok(())
}

/// Run the whole pipeline: per-source aggregation, merge, quality checks,
/// features. Sources whose aggregation fails are skipped with a warning and
/// show up as all-null columns in the panel.
///
/// # Errors
///
/// Returns an error if the merge, validate or features stage fails outright.
pub(crate) fn run_all(config: &PipelineConfig) -> anyhow::Result<()> {
    for spec in default_source_specs() {
        if let Err(error) = run_aggregate(config, &spec.source) {
            tracing::warn!(source = %spec.source, %error, "skipping source this run");
            discard_stale_weekly(config, &spec.source);
        }
    }
    run_merge(config)?;
    run_validate(config)?;
    run_features(config)
}

/// A weekly artifact left over from an earlier run must not stand in for a
/// failed aggregation: remove it so the merge reports the source as
/// unavailable instead of silently reusing old rows.
fn discard_stale_weekly(config: &PipelineConfig, source: &str) {
    let path = weekly_path(config, source);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            tracing::warn!(source, path = %path.display(), "discarded stale weekly artifact");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(source, error = %e, "could not discard stale weekly artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use showpulse_features::ModelReadyArtifact;
    use showpulse_quality::QualityReport;
    use std::collections::BTreeMap;

    fn test_config(dir: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::build(|_| None).unwrap();
        config.data_dir = dir.to_path_buf();
        config
    }

    fn tiktok_record(entity: &str, day: u32, id: &str, views: f64) -> RawRecord {
        RawRecord {
            entity: entity.to_owned(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            source_record_id: Some(id.to_owned()),
            scrape_run_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            metrics: BTreeMap::from([
                ("views".to_owned(), views),
                ("likes".to_owned(), views / 10.0),
            ]),
            raw_payload_ref: None,
        }
    }

    #[test]
    fn pipeline_runs_end_to_end_with_one_source_present() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        write_json(
            &raw_path(&config, "tiktok"),
            &vec![
                tiktok_record("Oh Mary!", 3, "a", 100.0),
                tiktok_record("Oh Mary!", 5, "b", 50.0),
                tiktok_record("Oh Mary!", 10, "c", 20.0),
            ],
        )
        .unwrap();

        run_aggregate(&config, "tiktok").unwrap();
        run_merge(&config).unwrap();
        run_validate(&config).unwrap();
        run_features(&config).unwrap();

        let panel: PanelArtifact = read_json(&panel_path(&config)).unwrap();
        assert_eq!(panel.rows.len(), 2);
        assert_eq!(panel.rows[0].value("tt_sum_views"), Some(150.0));
        // Sources without artifacts are present as null columns.
        assert_eq!(panel.rows[0].value("gt_index"), None);
        assert!(panel.manifest.column("wp_pageviews").is_some());

        let report: QualityReport = read_json(&report_path(&config)).unwrap();
        assert_eq!(report.status, QualityStatus::Ok);

        let table: ModelReadyArtifact = read_json(&model_ready_path(&config)).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert!(table.columns.contains(&"tt_sum_views_lag1".to_owned()));
        assert_eq!(table.rows[1].value("tt_sum_views_lag1"), Some(150.0));

        assert!(preview_path(&config).exists());
    }

    #[test]
    fn failed_aggregation_does_not_resurrect_stale_weekly_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        write_json(
            &raw_path(&config, "tiktok"),
            &vec![tiktok_record("Oh Mary!", 3, "a", 100.0)],
        )
        .unwrap();
        let mut trends = tiktok_record("Oh Mary!", 3, "t", 0.0);
        trends.metrics = BTreeMap::from([("interest".to_owned(), 40.0)]);
        write_json(&raw_path(&config, "trends"), &vec![trends]).unwrap();

        run_all(&config).unwrap();
        let panel: PanelArtifact = read_json(&panel_path(&config)).unwrap();
        assert_eq!(panel.rows[0].value("tt_sum_views"), Some(100.0));

        // Second run: the tiktok raw batch is now unreadable, so its columns
        // must come back null instead of reusing the first run's artifact.
        std::fs::write(raw_path(&config, "tiktok"), "not json").unwrap();
        run_all(&config).unwrap();

        let panel: PanelArtifact = read_json(&panel_path(&config)).unwrap();
        assert_eq!(panel.rows.len(), 1);
        assert_eq!(panel.rows[0].value("gt_index"), Some(40.0));
        assert_eq!(panel.rows[0].value("tt_sum_views"), None);
    }

    #[test]
    fn aggregate_rejects_unknown_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let error = run_aggregate(&config, "myspace").unwrap_err();
        assert!(error.to_string().contains("unknown source"));
    }

    #[test]
    fn merge_without_any_artifacts_still_writes_an_empty_panel() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        run_merge(&config).unwrap();
        let panel: PanelArtifact = read_json(&panel_path(&config)).unwrap();
        assert!(panel.rows.is_empty());
        // Every source's columns are declared even with nothing to merge.
        assert!(panel.manifest.column("tt_sum_views").is_some());
        assert!(panel.manifest.column("gt_index").is_some());
    }
}
