use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::Local;
use common::{
    config::{MissPolicy, SweepConfig},
    sweep::{Dataset, Sample, SweepPoint, sweep_points},
    util::{check_access, check_dependencies},
};
use eyre::{Context, Result, bail};
use fio::{Fio, result::latency_from_report};
use indicatif::{ProgressBar, ProgressStyle};
use latency_plot::{LatencyPlot, RenderOutcome};
use serde::Serialize;
use tokio::fs::{create_dir_all, remove_dir_all, remove_file, try_exists, write};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SweepRequest {
    pub name: String,
    pub target: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub keep_scratch: bool,
    pub show_progress: bool,
    /// Where to dump the collected samples as JSON
    pub data: Option<PathBuf>,
}

#[derive(Debug)]
pub struct SweepOutcome {
    pub dataset: Dataset,
    pub render: RenderOutcome,
}

#[derive(Serialize)]
struct SweepDump<'a> {
    name: &'a str,
    target: &'a Path,
    created: String,
    levels: &'a [u32],
    dataset: &'a Dataset,
}

/// The fio command line of every sweep point, in run order
pub fn plan(config: &SweepConfig, request: &SweepRequest) -> Vec<Vec<String>> {
    let fio = Fio::new(config.fio.clone());
    let scratch_dir = Path::new(&config.scratch_dir);
    sweep_points(&config.levels, &config.patterns)
        .iter()
        .map(|point| {
            let output = Fio::report_path(scratch_dir, &request.name, point);
            let mut cmd = vec![fio.program().to_owned()];
            cmd.extend(fio.cmd(&request.name, &request.target, point, &output));
            cmd
        })
        .collect()
}

pub async fn run_sweep(
    config: &SweepConfig,
    request: &SweepRequest,
    options: &RunOptions,
) -> Result<SweepOutcome> {
    check_dependencies(config.required_tools())?;
    check_access(&request.target)?;

    let scratch_dir = PathBuf::from(&config.scratch_dir);
    let owns_scratch = !try_exists(&scratch_dir).await?;
    create_dir_all(&scratch_dir)
        .await
        .context(format!("Creating scratch dir {}", scratch_dir.display()))?;
    debug!("Scratch dir {}", scratch_dir.display());

    let (dataset, mut artifacts) =
        collect(config, request, &scratch_dir, options.show_progress).await?;
    info!(
        "Collected {} samples for {}",
        dataset.total_samples(),
        request.name
    );

    let plot = LatencyPlot::new(config.plot.clone());
    let render = plot
        .render(&request.name, &dataset, &request.output, &scratch_dir)
        .await?;
    artifacts.push(match &render {
        RenderOutcome::Rendered { script } | RenderOutcome::Skipped { script } => script.clone(),
    });

    if let Some(path) = &options.data {
        let dump = SweepDump {
            name: &request.name,
            target: &request.target,
            created: Local::now().to_rfc3339(),
            levels: &config.levels,
            dataset: &dataset,
        };
        write(path, serde_json::to_string_pretty(&dump)?)
            .await
            .context(format!("Writing samples to {}", path.display()))?;
    }

    if options.keep_scratch {
        info!("Keeping scratch dir {}", scratch_dir.display());
    } else if owns_scratch {
        remove_dir_all(&scratch_dir)
            .await
            .context(format!("Removing scratch dir {}", scratch_dir.display()))?;
    } else {
        debug!(
            "Scratch dir {} existed before the run, removing only its reports",
            scratch_dir.display()
        );
        for path in &artifacts {
            remove_file(path)
                .await
                .context(format!("Removing {}", path.display()))?;
        }
    }

    Ok(SweepOutcome { dataset, render })
}

/// Runs every sweep point one after the other and gathers the latencies found,
/// along with the reports written
async fn collect(
    config: &SweepConfig,
    request: &SweepRequest,
    scratch_dir: &Path,
    show_progress: bool,
) -> Result<(Dataset, Vec<PathBuf>)> {
    let fio = Fio::new(config.fio.clone());
    let points = sweep_points(&config.levels, &config.patterns);
    let pb = progress_bar(points.len() as u64, show_progress);

    if config.patterns.iter().any(|p| p.is_write()) {
        warn!(
            "Write patterns will overwrite data in {}",
            request.target.display()
        );
    }

    let mut dataset = Dataset::new(&config.patterns);
    let mut reports = Vec::with_capacity(points.len());
    for point in &points {
        let SweepPoint { level, pattern } = *point;
        pb.set_message(format!("{pattern} iodepth={level}"));

        let report = fio
            .run(&request.name, &request.target, point, scratch_dir)
            .await
            .context(format!("Running fio for {pattern} iodepth={level}"))?;
        let latency = latency_from_report(&report).await?;
        reports.push(report.clone());
        match latency {
            Some(latency_us) => {
                debug!("{pattern} iodepth={level} lat={latency_us}us");
                dataset.push(pattern, Sample { level, latency_us });
            }
            None => match config.on_missing {
                MissPolicy::Warn => warn!(
                    "No latency in {}, skipping {pattern} iodepth={level}",
                    report.display()
                ),
                MissPolicy::Fail => bail!(
                    "No latency in {} for {pattern} iodepth={level}",
                    report.display()
                ),
            },
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok((dataset, reports))
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
