use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A token bucket rate limiter, shared by the client's per-peer workers
/// and the server's global/per-peer admission gates.
///
/// Tokens accrue continuously at one per `period`, capped at `burst`.
/// [`TokenBucket::acquire`] waits (without blocking the executor) until a
/// token is available; [`TokenBucket::reserve`] and
/// [`TokenBucket::consume`] adjust the balance without waiting, and may
/// drive it negative (debt that future `acquire` calls pay down).
#[derive(Debug)]
pub struct TokenBucket {
    period: Duration,
    burst: f64,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    available: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a bucket that gains one token every `period`, holding at
    /// most `burst` tokens, starting full.
    pub fn new(period: Duration, burst: u32) -> Self {
        Self {
            period,
            burst: burst as f64,
            state: Mutex::new(State { available: burst as f64, last_refill: Instant::now() }),
        }
    }

    fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        if !elapsed.is_zero() {
            let gained = elapsed.as_secs_f64() / self.period.as_secs_f64();
            state.available = (state.available + gained).min(self.burst);
            state.last_refill = now;
        }
    }

    /// Waits until one token is available, then consumes it.
    ///
    /// Never returns an error on its own; callers that need a deadline or
    /// cancellation wrap this with `tokio::time::timeout` or
    /// `tokio::select!` against a cancellation signal.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                self.refill(&mut state);
                if state.available >= 1.0 {
                    state.available -= 1.0;
                    return
                }
                let deficit = 1.0 - state.available;
                Duration::from_secs_f64(deficit * self.period.as_secs_f64())
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Consumes one token immediately, without waiting, even if the
    /// balance goes negative.
    ///
    /// Used for the server's first-contact path: a freshly created
    /// bucket is full, so a `Wait` would be a no-op and would let a peer
    /// bypass its own limit on its first request. Reserving instead
    /// delays *the next* request from that peer.
    pub fn reserve(&self) {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.available -= 1.0;
    }

    /// Consumes `tokens` immediately as a penalty, without waiting.
    ///
    /// Used for the client worker's failure back-off: burning a large
    /// number of tokens delays the worker's next request by roughly
    /// `tokens * period`.
    pub fn consume(&self, tokens: u32) {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.available -= tokens as f64;
    }

    /// Returns the current token balance, for tests and metrics; may be
    /// negative if debt was burned via [`TokenBucket::consume`].
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_immediate_then_throttles() {
        let bucket = TokenBucket::new(Duration::from_millis(10), 10);
        for _ in 0..10 {
            bucket.acquire().await;
        }
        assert!(bucket.available() < 1.0);

        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(9));
    }

    #[tokio::test(start_paused = true)]
    async fn consume_creates_debt_that_delays_future_acquires() {
        let bucket = TokenBucket::new(Duration::from_millis(10), 10);
        bucket.consume(100);
        let start = Instant::now();
        bucket.acquire().await;
        // 100 tokens of debt plus the 1 being acquired, at 10ms/token.
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn reserve_does_not_wait_even_when_empty() {
        let bucket = TokenBucket::new(Duration::from_millis(10), 1);
        bucket.reserve();
        let start = Instant::now();
        bucket.reserve();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
