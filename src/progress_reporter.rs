use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use tokio::time::Instant;
use tokio::{sync::mpsc, task::JoinHandle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} integers ({msg})";

/// Drives a progress bar from the integer counts workers report as they
/// finish.
pub(crate) struct ProgressReporter {
    r_progress: mpsc::Receiver<u64>,
    total_items: u64,
    multi_progress: MultiProgress,
}

impl ProgressReporter {
    pub(crate) fn new(
        r_progress: mpsc::Receiver<u64>,
        total_items: u64,
        multi_progress: MultiProgress,
    ) -> Self {
        Self {
            r_progress,
            total_items,
            multi_progress,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        spawn_progress_reporter(self.total_items, self.r_progress, self.multi_progress)
    }
}

fn spawn_progress_reporter(
    total_items: u64,
    mut r_progress: mpsc::Receiver<u64>,
    multi: MultiProgress,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut scanned = 0;

        let pb = multi.add(ProgressBar::new(total_items));
        match ProgressStyle::with_template(BAR_TEMPLATE) {
            Ok(style) => pb.set_style(style.progress_chars("#>-")),
            Err(e) => warn!("falling back to the default progress style: {e}"),
        }
        pb.set_message("counting");

        while let Some(items) = r_progress.recv().await {
            scanned += items;
            pb.set_position(scanned);
        }

        let (unit, rate) = scale_rate(scanned as f64 / started.elapsed().as_secs_f64());
        pb.finish_with_message(format!("{rate:.1}{unit} integers/s"));
        multi.remove(&pb);
    })
}

fn scale_rate(per_sec: f64) -> (&'static str, f64) {
    if !per_sec.is_finite() {
        ("", 0.0)
    } else if per_sec > 1_000_000.0 {
        ("M", per_sec / 1_000_000.0)
    } else if per_sec > 1_000.0 {
        ("k", per_sec / 1_000.0)
    } else {
        ("", per_sec)
    }
}
