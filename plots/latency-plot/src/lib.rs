use std::{
    fmt::Write,
    path::{Path, PathBuf},
};

use common::{config::PlotArgs, sweep::Dataset, util::simple_command_with_output};
use eyre::{Context, Result};
use itertools::Itertools;
use tracing::{debug, warn};

/// Latency over iodepth line chart rendered by gnuplot
#[derive(Debug, Clone)]
pub struct LatencyPlot {
    pub args: PlotArgs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered { script: PathBuf },
    /// Nothing to draw, the script was written but the plotting tool was not started
    Skipped { script: PathBuf },
}

impl LatencyPlot {
    pub fn new(args: PlotArgs) -> Self {
        Self { args }
    }

    pub fn script(&self, name: &str, dataset: &Dataset, output: &Path) -> String {
        let series = dataset
            .series()
            .iter()
            .filter(|s| !s.samples.is_empty())
            .collect::<Vec<_>>();

        let mut script = format!(
            "set terminal png size {},{}\n\
             set output '{}'\n\
             set title \"Latency vs IODepth for {}\"\n\
             set xlabel \"IODepth\"\n\
             set ylabel \"Latency (usec)\"\n\
             set logscale x 2\n",
            self.args.width,
            self.args.height,
            escape_single(&output.display().to_string()),
            escape_double(name),
        );

        if series.is_empty() {
            return script;
        }

        let plot_cmd = series
            .iter()
            .map(|s| format!("'-' with linespoints title '{}'", s.pattern))
            .join(", ");
        _ = writeln!(script, "plot {plot_cmd}");

        for s in series {
            for sample in &s.samples {
                _ = writeln!(script, "{} {}", sample.level, sample.latency_us);
            }
            script.push_str("e\n");
        }
        script
    }

    /// Writes the script into `scratch_dir` and runs the plotting tool on it
    pub async fn render(
        &self,
        name: &str,
        dataset: &Dataset,
        output: &Path,
        scratch_dir: &Path,
    ) -> Result<RenderOutcome> {
        let script_path = scratch_dir.join(&self.args.script_name);
        tokio::fs::write(&script_path, self.script(name, dataset, output))
            .await
            .context(format!("Writing plot script {}", script_path.display()))?;

        if dataset.is_empty() {
            warn!(
                "No latency samples collected, not rendering {}",
                output.display()
            );
            return Ok(RenderOutcome::Skipped {
                script: script_path,
            });
        }

        for s in dataset.series().iter().filter(|s| s.samples.is_empty()) {
            warn!("No samples for {}, leaving it out of the plot", s.pattern);
        }

        debug!(
            "program={} script={}",
            self.args.program,
            script_path.display()
        );
        simple_command_with_output(&self.args.program, &[&script_path])
            .await
            .context("Rendering plot")?;
        Ok(RenderOutcome::Rendered {
            script: script_path,
        })
    }
}

fn escape_single(s: &str) -> String {
    s.replace('\'', "''")
}

fn escape_double(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
