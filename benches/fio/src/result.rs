use std::path::Path;

use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

/// Summary latency labels fio prints, with the factor that converts each to microseconds
const LATENCY_LABELS: &[(&str, f64)] = &[
    (" lat (usec):", 1.0),
    (" lat (nsec):", 1e-3),
    (" lat (msec):", 1e3),
];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Reading report {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed latency line in {path}: {line:?}")]
    Malformed { path: String, line: String },
}

/// Average latency in microseconds from a fio text report.
///
/// The first summary latency line wins. A report without one yields `Ok(None)`.
pub async fn latency_from_report(path: &Path) -> Result<Option<f64>, ReportError> {
    let io_err = |source| ReportError::Io {
        path: path.display().to_string(),
        source,
    };
    let file = File::open(path).await.map_err(io_err)?;
    let mut lines = BufReader::new(file).lines();

    while let Some(line) = lines.next_line().await.map_err(io_err)? {
        let Some(scale) = latency_scale(&line) else {
            continue;
        };
        return match parse_latency_line(&line) {
            Some(value) => Ok(Some(value * scale)),
            None => Err(ReportError::Malformed {
                path: path.display().to_string(),
                line: line.trim().to_owned(),
            }),
        };
    }
    Ok(None)
}

fn latency_scale(line: &str) -> Option<f64> {
    LATENCY_LABELS
        .iter()
        .find(|(label, _)| line.contains(label))
        .map(|(_, scale)| *scale)
}

/// `lat (usec): min=10, max=20, avg=15.50, stdev=2.10` -> 15.50
fn parse_latency_line(line: &str) -> Option<f64> {
    let field = line.split_whitespace().nth(4)?;
    let (_, value) = field.split_once('=')?;
    value.replace(',', "").parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
sweep: (g=0): rw=randread, bs=(R) 4096B-4096B, ioengine=libaio, iodepth=4
fio-3.36
sweep: (groupid=0, jobs=1): err= 0: pid=4242: Mon Oct 12 10:00:00 2026
  read: IOPS=61.2k, BW=239MiB/s (251MB/s)(1024MiB/4283msec)
    slat (usec): min=2, max=61, avg= 3.91, stdev= 1.02
    clat (usec): min=19, max=1890, avg=61.12, stdev=14.20
     lat (usec): min=22, max=1894, avg=65.03, stdev=14.31
    clat percentiles (usec):
";

    async fn write_report(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        tokio::fs::write(&path, content).await.unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn reads_average_latency() {
        let (_dir, path) = write_report(REPORT).await;
        assert_eq!(latency_from_report(&path).await.unwrap(), Some(65.03));
    }

    #[tokio::test]
    async fn stub_report_line() {
        let (_dir, path) =
            write_report("  lat (usec): min=10, max=20, avg=15.50, stdev=2.10\n").await;
        assert_eq!(latency_from_report(&path).await.unwrap(), Some(15.50));
    }

    #[tokio::test]
    async fn strips_thousands_separators() {
        let (_dir, path) =
            write_report("     lat (usec): min=900, max=90000, avg=12,345.6, stdev=100\n").await;
        assert_eq!(latency_from_report(&path).await.unwrap(), Some(12345.6));
    }

    #[tokio::test]
    async fn first_match_wins() {
        let (_dir, path) = write_report(
            "  lat (usec): min=1, max=2, avg=1.5, stdev=0.1\n  lat (usec): min=1, max=2, avg=9.5, stdev=0.1\n",
        )
        .await;
        assert_eq!(latency_from_report(&path).await.unwrap(), Some(1.5));
    }

    #[tokio::test]
    async fn other_units_are_normalised() {
        let (_dir, path) =
            write_report("     lat (msec): min=1, max=9, avg=2.5, stdev=0.4\n").await;
        assert_eq!(latency_from_report(&path).await.unwrap(), Some(2500.0));

        let (_dir, path) =
            write_report("     lat (nsec): min=100, max=900, avg=750, stdev=4\n").await;
        assert_eq!(latency_from_report(&path).await.unwrap(), Some(0.75));
    }

    #[tokio::test]
    async fn missing_line_is_none() {
        let (_dir, path) = write_report("fio: pid=0, err=22/file:filesetup.c\n").await;
        assert_eq!(latency_from_report(&path).await.unwrap(), None);

        let (_dir, path) = write_report("").await;
        assert_eq!(latency_from_report(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clat_and_slat_do_not_match() {
        let (_dir, path) = write_report(
            "    slat (usec): min=2, max=61, avg= 3.91, stdev= 1.02\n    clat (usec): min=19, max=1890, avg=61.12, stdev=14.20\n",
        )
        .await;
        assert_eq!(latency_from_report(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn truncated_line_is_malformed() {
        let (_dir, path) = write_report("  lat (usec): min=10\n").await;
        assert!(matches!(
            latency_from_report(&path).await,
            Err(ReportError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn unreadable_report_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            latency_from_report(&dir.path().join("missing.txt")).await,
            Err(ReportError::Io { .. })
        ));
    }
}
