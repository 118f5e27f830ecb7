//! Partition window resolution for incremental runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::sql::quote_ident;
use crate::value::Value;

/// How a window's bounds were determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSource {
    /// Both bounds supplied by the run request; filter is `[start, end)`
    Explicit,
    /// Start is the target's watermark, end is now; filter is `(start, end]`
    WatermarkDerived,
}

/// The time range one incremental run must process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartitionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source: WindowSource,
}

impl PartitionWindow {
    /// Render the window as a store predicate over `column`.
    ///
    /// Explicit windows are half-open `[start, end)` so adjacent backfill
    /// partitions tile without overlap. Watermark windows are `(start, end]`
    /// so the row at the watermark itself is never reprocessed.
    pub fn filter_sql(&self, column: &str) -> String {
        let col = quote_ident(column);
        let start = Value::Timestamp(self.start).to_sql_literal();
        let end = Value::Timestamp(self.end).to_sql_literal();
        match self.source {
            WindowSource::Explicit => {
                format!("{col} >= {start} AND {col} < {end}")
            }
            WindowSource::WatermarkDerived => {
                format!("{col} > {start} AND {col} <= {end}")
            }
        }
    }
}

impl fmt::Display for PartitionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            WindowSource::Explicit => write!(
                f,
                "[{}, {})",
                self.start.format("%Y-%m-%d %H:%M:%S"),
                self.end.format("%Y-%m-%d %H:%M:%S")
            ),
            WindowSource::WatermarkDerived => write!(
                f,
                "({}, {}]",
                self.start.format("%Y-%m-%d %H:%M:%S"),
                self.end.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
}

/// Outcome of window resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowResolution {
    /// Target is empty or absent; process the entire source extract
    FullLoad,
    /// Process only rows inside the window
    Window(PartitionWindow),
}

/// Resolve the window for one run.
///
/// Precedence: explicit request bounds win; otherwise the injected
/// `current_max` watermark derives `(current_max, now]`; a missing watermark
/// signals a full load. Bounds are never swapped or clamped: a start at or
/// past its end fails, as does a lone start or lone end, as does a watermark
/// at or past `now`.
pub fn resolve_window(
    explicit_start: Option<DateTime<Utc>>,
    explicit_end: Option<DateTime<Utc>>,
    current_max: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CoreResult<WindowResolution> {
    match (explicit_start, explicit_end) {
        (Some(start), Some(end)) => {
            if start >= end {
                return Err(CoreError::InvalidWindow {
                    reason: format!("explicit start {} is not before end {}", start, end),
                });
            }
            Ok(WindowResolution::Window(PartitionWindow {
                start,
                end,
                source: WindowSource::Explicit,
            }))
        }
        (Some(_), None) => Err(CoreError::InvalidWindow {
            reason: "explicit window requires both bounds (got start only)".to_string(),
        }),
        (None, Some(_)) => Err(CoreError::InvalidWindow {
            reason: "explicit window requires both bounds (got end only)".to_string(),
        }),
        (None, None) => match current_max {
            None => Ok(WindowResolution::FullLoad),
            Some(max_seen) => {
                if max_seen >= now {
                    return Err(CoreError::InvalidWindow {
                        reason: format!(
                            "watermark {} is not before the current time {}",
                            max_seen, now
                        ),
                    });
                }
                Ok(WindowResolution::Window(PartitionWindow {
                    start: max_seen,
                    end: now,
                    source: WindowSource::WatermarkDerived,
                }))
            }
        },
    }
}
