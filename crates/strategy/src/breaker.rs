use std::time::{Duration, Instant};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakerState {
    /// Trading allowed.
    Active,
    /// Drawdown crossed the limit on this evaluation; paused from now.
    Tripped { drawdown: f64 },
    /// Still inside the cooldown of an earlier trip.
    Paused { remaining: Duration },
}

impl BreakerState {
    pub fn blocks_trading(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Daily-loss circuit breaker. Recovery is time-based: once the cooldown
/// elapses the next evaluation starts from scratch and may trip again.
#[derive(Debug, Clone)]
pub struct DailyLossBreaker {
    limit: f64,
    cooldown: Duration,
    paused_until: Option<Instant>,
}

impl DailyLossBreaker {
    /// `limit` is a positive fraction, `0.05` pauses at a 5% drawdown.
    pub fn new(limit: f64, cooldown: Duration) -> Self {
        Self {
            limit,
            cooldown,
            paused_until: None,
        }
    }

    pub fn evaluate(&mut self, starting_balance: f64, equity: f64, now: Instant) -> BreakerState {
        if let Some(until) = self.paused_until {
            if now < until {
                return BreakerState::Paused {
                    remaining: until - now,
                };
            }
            info!("Daily-loss cooldown elapsed, resuming evaluation");
            self.paused_until = None;
        }

        let Some(drawdown) = drawdown(starting_balance, equity) else {
            return BreakerState::Active;
        };

        if drawdown <= -self.limit {
            warn!(
                "Daily loss limit reached: {:.2}% (limit -{:.2}%), pausing for {}s",
                drawdown * 100.0,
                self.limit * 100.0,
                self.cooldown.as_secs()
            );
            self.paused_until = Some(now + self.cooldown);
            return BreakerState::Tripped { drawdown };
        }

        BreakerState::Active
    }

    /// Remaining cooldown at `now`, without re-evaluating equity.
    pub fn paused_for(&self, now: Instant) -> Option<Duration> {
        self.paused_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }
}

/// Relative change of equity against the starting balance. `None` when the
/// starting balance cannot anchor a ratio.
pub fn drawdown(starting_balance: f64, equity: f64) -> Option<f64> {
    if !(starting_balance.is_finite() && starting_balance > 0.0 && equity.is_finite()) {
        return None;
    }
    Some((equity - starting_balance) / starting_balance)
}
