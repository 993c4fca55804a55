use std::path::PathBuf;

use clap::Parser;
use common::config::SweepConfig;
use eyre::Result;
use latency_plot::RenderOutcome;
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::sweep::{RunOptions, SweepRequest};

mod sweep;

const MODULES: &[&str] = &["common", "fio", "latency_plot"];

/// Sweep fio over increasing iodepths and plot average latency against iodepth
#[derive(Parser)]
struct Cli {
    /// Name of the test
    #[arg(short, long)]
    name: String,
    /// Path to the file to test
    #[arg(short, long)]
    filename: PathBuf,
    /// Path to the output PNG file
    #[arg(short, long)]
    output: PathBuf,
    /// YAML file overriding the sweep definition
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory for fio reports and the plot script
    #[arg(long)]
    scratch_dir: Option<String>,
    /// Leave the scratch directory in place after a successful run
    #[arg(long, default_value_t = false)]
    keep_scratch: bool,
    /// Also write the collected samples as JSON
    #[arg(long)]
    data: Option<PathBuf>,
    /// Print the fio commands that would run and exit
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    #[arg(long, default_value_t = false)]
    no_progress: bool,
    /// Append logs to this file as well
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Extra tracing directives, ie. `fio=debug`
    #[arg(short, long)]
    log: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();

    let mut env_filter = EnvFilter::new(format!("fio_latency_sweep={log_level}"));
    for log in &args.log {
        env_filter = env_filter.add_directive(log.parse()?);
    }
    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    let (file_layer, _guard) = match &args.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path.file_name().map(PathBuf::from).unwrap_or("log.log".into());
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (
                Some(layer().with_ansi(false).with_writer(non_blocking)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(file_layer)
        .init();

    let mut config = match &args.config {
        Some(path) => SweepConfig::load(path).await?,
        None => SweepConfig::default().validate()?,
    };
    if let Some(scratch_dir) = args.scratch_dir {
        config.scratch_dir = scratch_dir;
    }

    let request = SweepRequest {
        name: args.name,
        target: args.filename,
        output: args.output,
    };

    if args.dry_run {
        for cmd in sweep::plan(&config, &request) {
            println!("{}", cmd.join(" "));
        }
        return Ok(());
    }

    let options = RunOptions {
        keep_scratch: args.keep_scratch,
        show_progress: !args.no_progress,
        data: args.data,
    };
    let outcome = match sweep::run_sweep(&config, &request, &options).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("{err:#}");
            return Err(err);
        }
    };

    match outcome.render {
        RenderOutcome::Rendered { .. } => println!(
            "Plot with {} samples written to {}",
            outcome.dataset.total_samples(),
            request.output.display()
        ),
        RenderOutcome::Skipped { script } => println!(
            "No latency samples collected, plot script left at {}",
            script.display()
        ),
    }
    Ok(())
}
