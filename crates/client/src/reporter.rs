//! Progress reporting.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

const BAR_TEMPLATE: &str =
    "uploading [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Creates a byte progress bar for a transfer of `total` bytes.
///
/// A hidden bar is returned when `visible` is false, so callers never need
/// to branch on it.
pub fn progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

/// Drains progress samples into `bar` until the channel closes.
///
/// Samples are additive. Returns the total observed, which equals the
/// number of bytes read from the source.
pub async fn report_progress(mut samples: mpsc::Receiver<usize>, bar: ProgressBar) -> u64 {
    let mut total: u64 = 0;
    while let Some(n) = samples.recv().await {
        total += n as u64;
        bar.inc(n as u64);
    }
    bar.finish();
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accumulates_until_closed() {
        let (tx, rx) = mpsc::channel(1);
        let bar = progress_bar(10, false);
        let reporter = tokio::spawn(report_progress(rx, bar.clone()));

        for n in [3, 0, 4, 3] {
            tx.send(n).await.unwrap();
        }
        drop(tx);

        assert_eq!(reporter.await.unwrap(), 10);
        assert_eq!(bar.position(), 10);
        assert!(bar.is_finished());
    }

    #[tokio::test]
    async fn closed_empty_channel_ends_immediately() {
        let (tx, rx) = mpsc::channel::<usize>(1);
        drop(tx);
        assert_eq!(report_progress(rx, ProgressBar::hidden()).await, 0);
    }

    #[test]
    fn visible_bar_has_length() {
        let bar = progress_bar(1234, true);
        assert_eq!(bar.length(), Some(1234));
    }
}
