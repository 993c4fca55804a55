use std::{collections::HashSet, path::Path};

use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::fs::read_to_string;

use crate::sweep::AccessPattern;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// iodepths to visit, powers of two
    pub levels: Vec<u32>,
    pub patterns: Vec<AccessPattern>,
    pub scratch_dir: String,
    pub on_missing: MissPolicy,
    pub fio: FioArgs,
    pub plot: PlotArgs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FioArgs {
    pub program: String,
    pub ioengine: String,
    pub direct: bool,
    pub bs: String,
    pub size: String,
    pub numjobs: usize,
    pub extra_options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotArgs {
    pub program: String,
    pub width: u32,
    pub height: u32,
    pub script_name: String,
}

/// What to do when a report carries no latency line
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissPolicy {
    /// Log the miss and drop the point
    #[default]
    Warn,
    /// Abort the run
    Fail,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            levels: (0..9).map(|exp| 1 << exp).collect(),
            patterns: vec![AccessPattern::Randread, AccessPattern::Randwrite],
            scratch_dir: "fio-sweep".to_owned(),
            on_missing: MissPolicy::default(),
            fio: FioArgs::default(),
            plot: PlotArgs::default(),
        }
    }
}

impl Default for FioArgs {
    fn default() -> Self {
        Self {
            program: "fio".to_owned(),
            ioengine: "libaio".to_owned(),
            direct: true,
            bs: "4k".to_owned(),
            size: "1G".to_owned(),
            numjobs: 1,
            extra_options: Vec::new(),
        }
    }
}

impl Default for PlotArgs {
    fn default() -> Self {
        Self {
            program: "gnuplot".to_owned(),
            width: 800,
            height: 600,
            script_name: "plot.gnu".to_owned(),
        }
    }
}

impl SweepConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = read_to_string(path)
            .await
            .context(format!("Reading config file {}", path.display()))?;
        let config: SweepConfig = serde_yml::from_str(&content)
            .context(format!("Parsing config file {}", path.display()))?;
        config.validate()
    }

    /// Checks the sweep definition and returns it with levels in ascending order
    pub fn validate(mut self) -> Result<Self> {
        if self.levels.is_empty() {
            bail!("No iodepth levels configured");
        }
        if let Some(level) = self.levels.iter().find(|l| !l.is_power_of_two()) {
            bail!("iodepth level {level} is not a power of two");
        }
        let mut seen = HashSet::new();
        if let Some(level) = self.levels.iter().find(|l| !seen.insert(**l)) {
            bail!("iodepth level {level} listed twice");
        }
        self.levels.sort_unstable();

        if self.patterns.is_empty() {
            bail!("No access patterns configured");
        }
        let mut seen = HashSet::new();
        if let Some(pattern) = self.patterns.iter().find(|p| !seen.insert(**p)) {
            bail!("Access pattern {pattern} listed twice");
        }

        if self.fio.numjobs == 0 {
            bail!("numjobs must be at least 1");
        }
        if self.plot.script_name.contains('/') {
            bail!("Plot script name {} must be a bare file name", self.plot.script_name);
        }
        Ok(self)
    }

    /// External programs that must be on the search path before anything runs
    pub fn required_tools(&self) -> [&str; 2] {
        [self.fio.program.as_str(), self.plot.program.as_str()]
    }
}
