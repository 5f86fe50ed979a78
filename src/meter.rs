//! Byte-stream decorator that reports transfer progress.
//!
//! [`MeteredStream`] forwards every item of the wrapped stream untouched and,
//! as a side effect, keeps a running [`TransferState`] and writes a one-line
//! progress report to its sink. Reports overwrite each other in place, so the
//! caller is expected to print a newline once the stream is drained.

use futures_util::Stream;
use indicatif::{DecimalBytes, HumanDuration};
use std::io::Write;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Carriage return followed by "erase to end of line".
const OVERWRITE_LINE: &str = "\r\x1b[K";

#[derive(Debug, Clone)]
pub struct TransferState {
    pub bytes_transferred: u64,
    /// `None` when the source did not announce a length.
    pub total_length: Option<u64>,
    pub last_reported_percentage: f64,
    /// Set when the first byte is observed.
    pub start_time: Option<Instant>,
    reported: bool,
}

impl TransferState {
    pub fn new(total_length: Option<u64>) -> Self {
        Self {
            bytes_transferred: 0,
            total_length,
            last_reported_percentage: 0.0,
            start_time: None,
            reported: false,
        }
    }

    /// Percentage of the announced total, if the total is known and positive.
    pub fn percentage(&self) -> Option<f64> {
        match self.total_length {
            Some(total) if total > 0 => Some(self.bytes_transferred as f64 / total as f64 * 100.0),
            _ => None,
        }
    }

    /// Average bytes per second since the first byte.
    pub fn speed(&self, now: Instant) -> f64 {
        let elapsed = self
            .start_time
            .map(|start| now.saturating_duration_since(start).as_secs_f64())
            .unwrap_or(0.0);
        self.bytes_transferred as f64 / elapsed
    }

    /// Seconds left at the current speed; non-finite when it cannot be estimated.
    pub fn remaining_secs(&self, speed: f64) -> f64 {
        match self.total_length {
            Some(total) if total > 0 && speed.is_finite() => {
                total.saturating_sub(self.bytes_transferred) as f64 / speed
            }
            _ => f64::NAN,
        }
    }

    /// Accounts for `n` new bytes and returns the progress line to print, if any.
    pub fn record(&mut self, n: usize, now: Instant, name: &str) -> Option<String> {
        if n == 0 {
            return None;
        }
        self.start_time.get_or_insert(now);

        let added = n as u64;
        self.bytes_transferred = match self.total_length {
            Some(total) if total > 0 => (self.bytes_transferred + added).min(total),
            _ => self.bytes_transferred + added,
        };

        let percentage = self.percentage();
        if !self.should_report(percentage) {
            return None;
        }
        self.reported = true;
        if let Some(percentage) = percentage {
            self.last_reported_percentage = percentage;
        }

        let speed = self.speed(now);
        let remaining = self.remaining_secs(speed);
        Some(render_progress(name, self, speed, remaining))
    }

    fn should_report(&self, percentage: Option<f64>) -> bool {
        let Some(percentage) = percentage else {
            return true;
        };
        !self.reported
            || percentage == 0.0
            || percentage - self.last_reported_percentage > 1.0
            || (percentage >= 100.0 && self.last_reported_percentage < 100.0)
    }
}

/// Formats a progress line such as
/// `Get atom-amd64.deb 12.58 MB/125.80 MB 10%    4.19 MB/s 27 seconds`.
pub fn render_progress(name: &str, state: &TransferState, speed: f64, remaining_secs: f64) -> String {
    let speed = if speed.is_finite() {
        format!("{}/s", DecimalBytes(speed as u64))
    } else {
        "-".to_string()
    };

    match (state.total_length, state.percentage()) {
        (Some(total), Some(percentage)) => {
            let eta = if remaining_secs.is_finite() && remaining_secs >= 0.0 {
                HumanDuration(Duration::from_secs_f64(remaining_secs.round())).to_string()
            } else {
                "-".to_string()
            };
            format!(
                "{}Get {} {}/{} {:.0}%\t\t\t{} {:>6}",
                OVERWRITE_LINE,
                name,
                DecimalBytes(state.bytes_transferred),
                DecimalBytes(total),
                percentage,
                speed,
                eta
            )
        }
        _ => format!(
            "{}Get {} {}\t\t\t{}",
            OVERWRITE_LINE,
            name,
            DecimalBytes(state.bytes_transferred),
            speed
        ),
    }
}

pub struct MeteredStream<S, W> {
    inner: S,
    sink: W,
    name: String,
    state: TransferState,
}

impl<S, W> MeteredStream<S, W>
where
    W: Write,
{
    pub fn new(inner: S, total_length: Option<u64>, name: impl Into<String>, sink: W) -> Self {
        Self {
            inner,
            sink,
            name: name.into(),
            state: TransferState::new(total_length),
        }
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    fn observe(&mut self, n: usize) {
        if let Some(line) = self.state.record(n, Instant::now(), &self.name) {
            // Progress output is best effort; a closed terminal must not abort the transfer.
            if let Err(err) = self
                .sink
                .write_all(line.as_bytes())
                .and_then(|_| self.sink.flush())
            {
                tracing::debug!("Could not write progress line: {}", err);
            }
        }
    }
}

impl<S, W, B, E> Stream for MeteredStream<S, W>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    W: Write + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<B, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            this.observe(chunk.as_ref().len());
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, StreamExt};
    use std::io;

    fn chunks(sizes: &[usize]) -> Vec<Result<Vec<u8>, io::Error>> {
        sizes.iter().map(|&n| Ok(vec![0u8; n])).collect()
    }

    fn report_count(sink: &[u8]) -> usize {
        String::from_utf8_lossy(sink).matches(OVERWRITE_LINE).count()
    }

    #[tokio::test]
    async fn test_drains_known_length_to_full_percentage() {
        let source = stream::iter(chunks(&[100, 250, 400, 250]));
        let mut metered = MeteredStream::new(source, Some(1000), "pkg.deb", Vec::new());

        let mut forwarded = 0;
        while let Some(chunk) = metered.next().await {
            forwarded += chunk.unwrap().len();
        }

        assert_eq!(forwarded, 1000);
        assert_eq!(metered.state().bytes_transferred, 1000);
        assert_eq!(metered.state().percentage(), Some(100.0));

        let output = String::from_utf8(metered.into_sink()).unwrap();
        assert!(output.contains("Get pkg.deb"));
        assert!(output.contains("100%"));
    }

    #[tokio::test]
    async fn test_first_chunk_is_always_reported() {
        // 1 byte of 10_000 is 0.01%, below the 1% throttle
        let source = stream::iter(chunks(&[1]));
        let mut metered = MeteredStream::new(source, Some(10_000), "pkg.deb", Vec::new());

        metered.next().await.unwrap().unwrap();

        let sink = metered.into_sink();
        assert_eq!(report_count(&sink), 1);
        assert!(String::from_utf8_lossy(&sink).contains("1 B/10.00 kB"));
    }

    #[tokio::test]
    async fn test_reports_are_throttled_to_percent_steps() {
        // 200 chunks of 0.5% each
        let source = stream::iter(chunks(&[50; 200]));
        let mut metered = MeteredStream::new(source, Some(10_000), "pkg.deb", Vec::new());
        while let Some(chunk) = metered.next().await {
            chunk.unwrap();
        }

        let count = report_count(&metered.into_sink());
        assert!(count > 10, "expected regular reports, got {}", count);
        assert!(count < 100, "expected throttling, got {}", count);
    }

    #[tokio::test]
    async fn test_unknown_length_reports_byte_counts() {
        let source = stream::iter(chunks(&[10, 20]));
        let mut metered = MeteredStream::new(source, None, "pkg.deb", Vec::new());
        while let Some(chunk) = metered.next().await {
            chunk.unwrap();
        }

        assert_eq!(metered.state().bytes_transferred, 30);
        assert_eq!(metered.state().percentage(), None);

        let output = String::from_utf8(metered.into_sink()).unwrap();
        assert_eq!(output.matches(OVERWRITE_LINE).count(), 2);
        assert!(output.contains("30 B"));
        assert!(!output.contains('%'));
    }

    #[tokio::test]
    async fn test_errors_are_forwarded_unchanged() {
        let items: Vec<Result<Vec<u8>, io::Error>> = vec![
            Ok(vec![0u8; 5]),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")),
        ];
        let mut metered = MeteredStream::new(stream::iter(items), Some(10), "pkg.deb", Vec::new());

        assert_eq!(metered.next().await.unwrap().unwrap().len(), 5);
        let err = metered.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(err.to_string(), "peer went away");
        assert!(metered.next().await.is_none());
        assert_eq!(metered.state().bytes_transferred, 5);
    }

    #[test]
    fn test_start_time_waits_for_first_byte() {
        let mut state = TransferState::new(Some(100));
        assert!(state.record(0, Instant::now(), "pkg.deb").is_none());
        assert!(state.start_time.is_none());

        state.record(10, Instant::now(), "pkg.deb");
        assert!(state.start_time.is_some());
    }

    #[test]
    fn test_count_never_exceeds_known_total() {
        let mut state = TransferState::new(Some(100));
        let now = Instant::now();
        state.record(80, now, "pkg.deb");
        state.record(80, now, "pkg.deb");
        assert_eq!(state.bytes_transferred, 100);
    }

    #[test]
    fn test_zero_total_is_treated_as_unknown() {
        let mut state = TransferState::new(Some(0));
        let line = state.record(10, Instant::now(), "pkg.deb").unwrap();
        assert_eq!(state.percentage(), None);
        assert!(!line.contains('%'));
    }

    #[test]
    fn test_render_eta_and_placeholder() {
        let mut state = TransferState::new(Some(2_000_000));
        state.bytes_transferred = 1_000_000;

        let line = render_progress("pkg.deb", &state, 100_000.0, 10.0);
        assert!(line.starts_with(OVERWRITE_LINE));
        assert!(line.contains("Get pkg.deb 1.00 MB/2.00 MB 50%"));
        assert!(line.contains("100.00 kB/s"));
        assert!(line.contains("10 seconds"));

        let line = render_progress("pkg.deb", &state, f64::INFINITY, f64::NAN);
        assert!(line.ends_with("-      -"));
    }
}
