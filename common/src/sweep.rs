use std::fmt;

use itertools::iproduct;
use serde::{Deserialize, Serialize};

/// Workload shape presented to the target file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPattern {
    Randread,
    Randwrite,
}

impl AccessPattern {
    /// Token understood by fio's `--rw`
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPattern::Randread => "randread",
            AccessPattern::Randwrite => "randwrite",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, AccessPattern::Randwrite)
    }
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SweepPoint {
    /// iodepth handed to the load generator
    pub level: u32,
    pub pattern: AccessPattern,
}

/// Every (level, pattern) pair, level-major so samples land in ascending level order
pub fn sweep_points(levels: &[u32], patterns: &[AccessPattern]) -> Vec<SweepPoint> {
    iproduct!(levels.iter(), patterns.iter())
        .map(|(level, pattern)| SweepPoint {
            level: *level,
            pattern: *pattern,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub level: u32,
    pub latency_us: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub pattern: AccessPattern,
    pub samples: Vec<Sample>,
}

/// Collected samples, one series per access pattern in sweep order
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    series: Vec<Series>,
}

impl Dataset {
    /// Creates an empty series for each pattern so that patterns without samples still show up
    pub fn new(patterns: &[AccessPattern]) -> Self {
        let mut dataset = Self::default();
        for pattern in patterns {
            dataset.series_mut(*pattern);
        }
        dataset
    }

    pub fn push(&mut self, pattern: AccessPattern, sample: Sample) {
        self.series_mut(pattern).samples.push(sample);
    }

    pub fn series(&self) -> &[Series] {
        &self.series
    }

    pub fn samples(&self, pattern: AccessPattern) -> &[Sample] {
        self.series
            .iter()
            .find(|s| s.pattern == pattern)
            .map(|s| s.samples.as_slice())
            .unwrap_or(&[])
    }

    pub fn total_samples(&self) -> usize {
        self.series.iter().map(|s| s.samples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_samples() == 0
    }

    fn series_mut(&mut self, pattern: AccessPattern) -> &mut Series {
        let idx = match self.series.iter().position(|s| s.pattern == pattern) {
            Some(idx) => idx,
            None => {
                self.series.push(Series {
                    pattern,
                    samples: Vec::new(),
                });
                self.series.len() - 1
            }
        };
        &mut self.series[idx]
    }
}
