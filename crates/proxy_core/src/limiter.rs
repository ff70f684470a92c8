use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
	Admitted,
	Denied,
}

#[derive(Debug, Clone, Copy)]
struct LimiterEntry {
	count: u32,
	window_start: Instant,
}

/// Per-client fixed-window rate limiter. A background sweeper periodically
/// drops entries whose window has elapsed with no intervening admission
/// check, so idle clients don't hold memory forever.
pub struct RateLimiter {
	entries: DashMap<String, LimiterEntry>,
	limit: u32,
	window: Duration,
}

impl RateLimiter {
	pub fn new(limit: u32, window: Duration) -> Self {
		Self { entries: DashMap::new(), limit, window }
	}

	/// Admits or denies `client_id` against the fixed window. A missing
	/// entry and an elapsed-window entry are handled identically by
	/// `or_insert_with`: both start a fresh window with count 0, which
	/// then falls through to the same increment-and-check below.
	pub fn check(&self, client_id: &str) -> Admission {
		let now = Instant::now();
		let mut entry = self.entries.entry(client_id.to_string()).or_insert_with(|| LimiterEntry { count: 0, window_start: now });

		if now.duration_since(entry.window_start) >= self.window {
			entry.count = 0;
			entry.window_start = now;
		}

		if entry.count < self.limit {
			entry.count += 1;
			Admission::Admitted
		} else {
			Admission::Denied
		}
	}

	/// Removes entries whose window has fully elapsed. Run periodically
	/// by `spawn_sweeper`; safe to call concurrently with `check`.
	fn sweep(&self) {
		let now = Instant::now();
		let window = self.window;
		let before = self.entries.len();
		self.entries.retain(|_, entry| now.duration_since(entry.window_start) < window);
		let removed = before - self.entries.len();
		if removed > 0 {
			trace!(removed, "swept expired rate limiter entries");
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Spawns the cooperative background sweeper. Cancelling `token` stops the
/// loop at the next tick boundary.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, interval: Duration, token: CancellationToken) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		ticker.tick().await;
		loop {
			tokio::select! {
				_ = token.cancelled() => {
					debug!("rate limiter sweeper shutting down");
					break;
				}
				_ = ticker.tick() => {
					limiter.sweep();
				}
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn admits_up_to_limit_then_denies() {
		let limiter = RateLimiter::new(2, Duration::from_secs(60));
		assert_eq!(limiter.check("client-a"), Admission::Admitted);
		assert_eq!(limiter.check("client-a"), Admission::Admitted);
		assert_eq!(limiter.check("client-a"), Admission::Denied);
	}

	#[test]
	fn clients_are_independent() {
		let limiter = RateLimiter::new(1, Duration::from_secs(60));
		assert_eq!(limiter.check("client-a"), Admission::Admitted);
		assert_eq!(limiter.check("client-b"), Admission::Admitted);
		assert_eq!(limiter.check("client-a"), Admission::Denied);
	}

	#[tokio::test(start_paused = true)]
	async fn window_resets_after_elapsed() {
		let limiter = RateLimiter::new(1, Duration::from_millis(100));
		assert_eq!(limiter.check("client-a"), Admission::Admitted);
		assert_eq!(limiter.check("client-a"), Admission::Denied);
		tokio::time::advance(Duration::from_millis(150)).await;
		assert_eq!(limiter.check("client-a"), Admission::Admitted);
	}

	#[tokio::test(start_paused = true)]
	async fn sweeper_removes_expired_entries() {
		let limiter = Arc::new(RateLimiter::new(1, Duration::from_millis(50)));
		limiter.check("client-a");
		assert_eq!(limiter.len(), 1);

		let token = CancellationToken::new();
		let handle = spawn_sweeper(Arc::clone(&limiter), Duration::from_millis(50), token.clone());

		tokio::time::advance(Duration::from_millis(120)).await;
		tokio::task::yield_now().await;

		assert!(limiter.is_empty());
		token.cancel();
		handle.await.unwrap();
	}
}
