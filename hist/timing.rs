use num_traits::ToPrimitive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Time spent in each phase of histogram construction by one builder.
#[derive(Debug)]
pub struct Timing {
	pub build_histogram_scatter: TimingDuration,
	pub build_histogram_reduce: TimingDuration,
	pub subtraction_trick: TimingDuration,
}

/// A total duration in nanoseconds that many threads can add to.
pub struct TimingDuration(AtomicU64);

/// Time spent in `compute_binned_matrix` across all calls.
pub static BINNING_TIMING: TimingDuration = TimingDuration::new();

impl Timing {
	pub fn new() -> Timing {
		Timing {
			build_histogram_scatter: TimingDuration::new(),
			build_histogram_reduce: TimingDuration::new(),
			subtraction_trick: TimingDuration::new(),
		}
	}
}

impl TimingDuration {
	pub const fn new() -> TimingDuration {
		TimingDuration(AtomicU64::new(0))
	}

	pub fn get(&self) -> Duration {
		Duration::from_nanos(self.0.load(Ordering::Relaxed))
	}

	/// Add `elapsed` to the total. Durations too long for a u64 of nanoseconds saturate.
	pub fn inc(&self, elapsed: Duration) {
		let nanos = elapsed.as_nanos().to_u64().unwrap_or(u64::MAX);
		self.0.fetch_add(nanos, Ordering::Relaxed);
	}
}

impl std::fmt::Debug for TimingDuration {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		std::fmt::Debug::fmt(&self.get(), f)
	}
}

#[test]
fn test_timing_duration() {
	let timing = Timing::new();
	timing.subtraction_trick.inc(Duration::from_millis(2));
	timing.subtraction_trick.inc(Duration::from_millis(3));
	assert_eq!(timing.subtraction_trick.get(), Duration::from_millis(5));
	assert_eq!(timing.build_histogram_reduce.get(), Duration::from_secs(0));
}
