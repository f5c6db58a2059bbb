//! Progress tracking, callbacks and cancellation for registration loops.
//!
//! Callbacks are invoked at iteration boundaries only. Cancellation is
//! cooperative: a stop request is honoured at the start of the next iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Progress information for registration iterations.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Number of completed iterations.
    pub iteration: usize,
    /// Iteration cap (if known).
    pub total_iterations: Option<usize>,
    /// Current similarity metric (mean squared intensity difference).
    pub metric: f64,
    /// RMS norm of the last update field.
    pub rms_change: f64,
    /// Time elapsed since start.
    pub elapsed: Duration,
    /// Estimated remaining time.
    pub estimated_remaining: Option<Duration>,
    /// Additional metrics.
    pub metrics: Vec<(String, f64)>,
}

impl ProgressInfo {
    /// Create new progress information.
    pub fn new(
        iteration: usize,
        total_iterations: Option<usize>,
        metric: f64,
        rms_change: f64,
        elapsed: Duration,
    ) -> Self {
        Self {
            iteration,
            total_iterations,
            metric,
            rms_change,
            elapsed,
            estimated_remaining: None,
            metrics: Vec::new(),
        }
    }

    /// Completed fraction in `[0, 1]`.
    pub fn progress_fraction(&self) -> Option<f64> {
        self.total_iterations.map(|total| {
            if total == 0 {
                1.0
            } else {
                (self.iteration as f64 / total as f64).min(1.0)
            }
        })
    }

    /// Calculate progress percentage.
    pub fn progress_percent(&self) -> Option<f64> {
        self.progress_fraction().map(|f| f * 100.0)
    }

    /// Calculate estimated remaining time.
    pub fn calculate_remaining(&mut self) {
        if let Some(total) = self.total_iterations {
            if self.iteration > 0 {
                let avg_time_per_iter = self.elapsed.as_secs_f64() / self.iteration as f64;
                let remaining_iters = total.saturating_sub(self.iteration);
                self.estimated_remaining = Some(Duration::from_secs_f64(
                    avg_time_per_iter * remaining_iters as f64
                ));
            }
        }
    }

    /// Add a custom metric.
    pub fn add_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.push((name.into(), value));
    }
}

/// Progress callback trait for monitoring registration progress.
pub trait ProgressCallback: Send + Sync {
    /// Called after each iteration with progress information.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called when a run starts.
    fn on_start(&self) {}

    /// Called when a run reaches a terminal state without error.
    fn on_complete(&self, _info: &ProgressInfo) {}

    /// Called when a run fails.
    fn on_error(&self, _error: &str) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Console progress callback that logs to tracing.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log interval (iterations).
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 10 }
    }
}

impl ConsoleProgressCallback {
    /// Create a new console progress callback.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.iteration % self.log_interval == 0 || info.total_iterations == Some(info.iteration) {
            let progress = info.progress_percent().unwrap_or(0.0);
            let remaining = info.estimated_remaining
                .map(|d| format!("{:.2}s", d.as_secs_f64()))
                .unwrap_or_else(|| "N/A".to_string());

            tracing::info!(
                "Iter {}/{} ({:.1}%) | Metric: {:.6} | RMS change: {:.6} | Elapsed: {:.2}s | ETA: {}",
                info.iteration,
                info.total_iterations.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
                progress,
                info.metric,
                info.rms_change,
                info.elapsed.as_secs_f64(),
                remaining
            );

            for (name, value) in &info.metrics {
                tracing::info!("  {}: {:.6}", name, value);
            }
        }
    }

    fn on_start(&self) {
        tracing::info!("Registration started");
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "Registration finished after {} iterations in {:.2}s with metric {:.6}",
            info.iteration,
            info.elapsed.as_secs_f64(),
            info.metric
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Registration failed: {}", error);
    }
}

/// History callback that records all progress information.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    /// Create a new history callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded history.
    pub fn get_history(&self) -> Vec<ProgressInfo> {
        lock(&self.history).clone()
    }

    /// Clear the history.
    pub fn clear(&self) {
        lock(&self.history).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        lock(&self.history).push(info.clone());
    }
}

/// Shared cancellation flag.
///
/// Clones refer to the same flag, so a handle can be moved to another thread
/// and used to stop a running loop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the loop stop at the next iteration boundary.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Withdraw a pending stop request.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Requests a stop once a given iteration has completed.
#[derive(Debug, Clone)]
pub struct StopAtIterationCallback {
    iteration: usize,
    handle: StopHandle,
}

impl StopAtIterationCallback {
    pub fn new(iteration: usize, handle: StopHandle) -> Self {
        Self { iteration, handle }
    }
}

impl ProgressCallback for StopAtIterationCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.iteration >= self.iteration {
            tracing::debug!(iteration = info.iteration, "requesting stop");
            self.handle.request_stop();
        }
    }
}

/// Progress tracker that manages multiple callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start_time: Arc<Mutex<Option<Instant>>>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback.
    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Start tracking.
    pub fn start(&self) {
        *lock(&self.start_time) = Some(Instant::now());
        for callback in &self.callbacks {
            callback.on_start();
        }
    }

    fn elapsed(&self) -> Duration {
        let start_time = *lock(&self.start_time);
        start_time.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// Build the progress record for the given iteration.
    pub fn info(&self, iteration: usize, total_iterations: Option<usize>, metric: f64, rms_change: f64) -> ProgressInfo {
        let mut info = ProgressInfo::new(iteration, total_iterations, metric, rms_change, self.elapsed());
        info.calculate_remaining();
        info
    }

    /// Update progress.
    pub fn update(&self, iteration: usize, total_iterations: Option<usize>, metric: f64, rms_change: f64) {
        let info = self.info(iteration, total_iterations, metric, rms_change);
        for callback in &self.callbacks {
            callback.on_progress(&info);
        }
    }

    /// Complete tracking.
    pub fn complete(&self, iteration: usize, total_iterations: Option<usize>, metric: f64, rms_change: f64) {
        let info = self.info(iteration, total_iterations, metric, rms_change);
        for callback in &self.callbacks {
            callback.on_complete(&info);
        }
    }

    /// Report error.
    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_info() {
        let info = ProgressInfo::new(10, Some(100), 0.5, 0.1, Duration::from_secs(10));
        assert_eq!(info.iteration, 10);
        assert_eq!(info.metric, 0.5);
        assert_eq!(info.progress_fraction(), Some(0.1));
        assert_eq!(info.progress_percent(), Some(10.0));
    }

    #[test]
    fn test_progress_info_remaining() {
        let mut info = ProgressInfo::new(10, Some(100), 0.5, 0.1, Duration::from_secs(10));
        info.calculate_remaining();
        assert_eq!(info.estimated_remaining, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_history_callback() {
        let callback = HistoryCallback::new();
        callback.on_progress(&ProgressInfo::new(1, Some(10), 0.5, 0.2, Duration::ZERO));
        callback.on_progress(&ProgressInfo::new(2, Some(10), 0.4, 0.1, Duration::ZERO));

        let history = callback.get_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].iteration, 1);
        assert_eq!(history[1].iteration, 2);

        callback.clear();
        assert!(callback.get_history().is_empty());
    }

    #[test]
    fn test_stop_at_iteration() {
        let handle = StopHandle::new();
        let callback = StopAtIterationCallback::new(3, handle.clone());

        callback.on_progress(&ProgressInfo::new(2, Some(10), 0.0, 0.0, Duration::ZERO));
        assert!(!handle.is_stop_requested());
        callback.on_progress(&ProgressInfo::new(3, Some(10), 0.0, 0.0, Duration::ZERO));
        assert!(handle.is_stop_requested());

        handle.clear();
        assert!(!handle.is_stop_requested());
    }

    #[test]
    fn test_progress_tracker() {
        let history = Arc::new(HistoryCallback::new());
        let mut tracker = ProgressTracker::new();
        tracker.add_callback(history.clone());
        tracker.add_callback(Arc::new(ConsoleProgressCallback::new(1)));

        tracker.start();
        tracker.update(1, Some(10), 0.5, 0.3);
        tracker.update(2, Some(10), 0.4, 0.2);
        tracker.complete(2, Some(10), 0.4, 0.2);
        tracker.error("boom");

        assert_eq!(history.get_history().len(), 2);
    }
}
