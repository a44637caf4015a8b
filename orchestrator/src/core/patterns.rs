//! Load pattern parameters and validation

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{OrchestratorError, OrchestratorResult};

/// How connections are scheduled over a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum LoadPattern {
    /// `connections` concurrent clients, each streaming for `duration`
    Sustained { connections: usize, duration: Duration },
    /// Batches of `start, start + step, ..` up to `end`, spawned `interval` apart
    Ramp {
        start: usize,
        end: usize,
        step: usize,
        interval: Duration,
        /// Streaming time per batch, `interval` when unset
        batch_duration: Option<Duration>,
    },
    /// All connections issued in the same instant
    Spike { connections: usize, duration: Duration },
}

/// Progress reported while a pattern runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    Elapsed { elapsed: Duration, total: Duration },
    Step { current: usize, total: usize },
}

impl LoadPattern {
    pub fn name(&self) -> &'static str {
        match self {
            LoadPattern::Sustained { .. } => "sustained",
            LoadPattern::Ramp { .. } => "ramp",
            LoadPattern::Spike { .. } => "spike",
        }
    }

    /// Reject bounds that cannot produce a run, before anything is spawned
    pub fn validate(&self, max_connections: usize) -> OrchestratorResult<()> {
        match self {
            LoadPattern::Sustained { connections, duration } | LoadPattern::Spike { connections, duration } => {
                if *connections == 0 {
                    return Err(OrchestratorError::invalid_pattern("connections must be at least 1"));
                }
                if duration.is_zero() {
                    return Err(OrchestratorError::invalid_pattern("duration must be positive"));
                }
                if *connections > max_connections {
                    return Err(OrchestratorError::CapacityExceeded {
                        requested: *connections,
                        max: max_connections,
                    });
                }
            }
            LoadPattern::Ramp {
                start,
                end,
                step,
                interval,
                batch_duration,
            } => {
                if *start == 0 {
                    return Err(OrchestratorError::invalid_pattern("ramp start must be at least 1"));
                }
                if *step == 0 {
                    return Err(OrchestratorError::invalid_pattern("ramp step must be at least 1"));
                }
                if end < start {
                    return Err(OrchestratorError::invalid_pattern(format!(
                        "ramp end {end} is below start {start}"
                    )));
                }
                if interval.is_zero() {
                    return Err(OrchestratorError::invalid_pattern("ramp interval must be positive"));
                }
                if batch_duration.is_some_and(|d| d.is_zero()) {
                    return Err(OrchestratorError::invalid_pattern("batch duration must be positive"));
                }
                let peak = self.peak_concurrency();
                if peak > max_connections {
                    return Err(OrchestratorError::CapacityExceeded {
                        requested: peak,
                        max: max_connections,
                    });
                }
            }
        }
        Ok(())
    }

    /// Connection count of each batch, in spawn order
    pub fn batch_sizes(&self) -> Vec<usize> {
        match self {
            LoadPattern::Sustained { connections, .. } | LoadPattern::Spike { connections, .. } => {
                vec![*connections]
            }
            LoadPattern::Ramp { start, end, step, .. } => {
                if *step == 0 || end < start {
                    return Vec::new();
                }
                (*start..=*end).step_by(*step).collect()
            }
        }
    }

    /// Connections spawned over the whole run
    pub fn total_connections(&self) -> usize {
        self.batch_sizes().iter().sum()
    }

    /// Most connections streaming at once under the schedule.
    ///
    /// A ramp batch streams for `batch_duration`, so it overlaps the
    /// `ceil(batch_duration / interval) - 1` batches spawned after it.
    /// Handshake time is not counted.
    pub fn peak_concurrency(&self) -> usize {
        let LoadPattern::Ramp {
            interval,
            batch_duration,
            ..
        } = self
        else {
            return self.total_connections();
        };
        let sizes = self.batch_sizes();
        let lifetime = batch_duration.unwrap_or(*interval);
        let window = if interval.is_zero() {
            sizes.len()
        } else {
            (lifetime.as_secs_f64() / interval.as_secs_f64()).ceil() as usize
        };
        let window = window.clamp(1, sizes.len().max(1));
        sizes.windows(window).map(|w| w.iter().sum()).max().unwrap_or(0)
    }
}
