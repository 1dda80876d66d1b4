//! Persisted artifacts.
//!
//! Every stage output is a self-describing JSON document: the schema
//! manifest travels inside the file next to the rows, so a reader can
//! validate what it loaded without out-of-band knowledge. The full panel
//! additionally gets a bounded fixed-width text preview for manual
//! inspection.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::SchemaManifest;
use crate::types::{CanonicalPanelRow, WeeklyAggregate};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error for {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-source weekly aggregates plus the manifest they were validated
/// against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateArtifact {
    pub source: String,
    pub manifest: SchemaManifest,
    pub rows: Vec<WeeklyAggregate>,
}

/// The canonical merged panel plus its combined manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelArtifact {
    pub manifest: SchemaManifest,
    pub rows: Vec<CanonicalPanelRow>,
}

/// Write any serializable artifact as pretty-printed JSON, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns [`ArtifactError`] on I/O or serialization failure.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let display = path.display().to_string();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
            path: display.clone(),
            source,
        })?;
    }
    let body = serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Json {
        path: display.clone(),
        source,
    })?;
    fs::write(path, body).map_err(|source| ArtifactError::Io {
        path: display,
        source,
    })
}

/// Read a JSON artifact back.
///
/// # Errors
///
/// Returns [`ArtifactError`] on I/O or deserialization failure.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let display = path.display().to_string();
    let body = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| ArtifactError::Json {
        path: display,
        source,
    })
}

/// Render a bounded fixed-width preview of the panel and write it next to
/// the full artifact. Nulls render as `-` so absence stays visibly distinct
/// from zero.
///
/// # Errors
///
/// Returns [`ArtifactError`] on I/O failure.
pub fn write_panel_preview(
    path: &Path,
    panel: &PanelArtifact,
    max_rows: usize,
) -> Result<(), ArtifactError> {
    let display = path.display().to_string();
    fs::write(path, render_preview(panel, max_rows)).map_err(|source| ArtifactError::Io {
        path: display,
        source,
    })
}

fn render_preview(panel: &PanelArtifact, max_rows: usize) -> String {
    let columns = panel.manifest.value_columns();

    let mut widths: Vec<usize> = Vec::with_capacity(columns.len() + 2);
    widths.push(
        panel
            .rows
            .iter()
            .take(max_rows)
            .map(|r| r.entity.len())
            .chain(std::iter::once("entity".len()))
            .max()
            .unwrap_or(6),
    );
    widths.push("week_start".len());
    for column in &columns {
        widths.push(column.len().max(10));
    }

    let mut out = String::new();
    let header: Vec<String> = std::iter::once("entity".to_owned())
        .chain(std::iter::once("week_start".to_owned()))
        .chain(columns.iter().map(|c| (*c).to_owned()))
        .collect();
    push_row(&mut out, &header, &widths);
    push_row(
        &mut out,
        &widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>(),
        &widths,
    );

    for row in panel.rows.iter().take(max_rows) {
        let mut cells = vec![row.entity.clone(), row.week_start.to_string()];
        for column in &columns {
            cells.push(match row.value(column) {
                Some(v) => format_number(v),
                None => "-".to_owned(),
            });
        }
        push_row(&mut out, &cells, &widths);
    }

    if panel.rows.len() > max_rows {
        out.push_str(&format!(
            "... {} more rows in the full artifact\n",
            panel.rows.len() - max_rows
        ));
    }
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:>width$}"))
        .collect();
    out.push_str(&line.join("  "));
    out.push('\n');
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.3}")
    }
}
