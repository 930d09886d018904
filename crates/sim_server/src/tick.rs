//! Fixed-timestep tick loop.
//!
//! [`TickLoop`] calls a step function at a fixed rate until the configured
//! number of ticks has run, the step fails, or Ctrl-C is received. A step
//! that overruns its budget is logged and the next one starts immediately;
//! missed ticks are not made up.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Configuration for a tick loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl TickConfig {
    /// Wall-clock budget of one tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        if self.tick_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.tick_rate)
        } else {
            Duration::ZERO
        }
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

/// Why a tick loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `max_ticks` reached.
    Completed,
    /// Ctrl-C received.
    Interrupted,
    /// The step function asked to stop.
    Requested,
}

/// Whether the loop should keep going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Drives a step function at a fixed rate.
#[derive(Debug)]
pub struct TickLoop {
    config: TickConfig,
    ticks_run: u64,
}

impl TickLoop {
    #[must_use]
    pub fn new(config: TickConfig) -> Self {
        Self { config, ticks_run: 0 }
    }

    /// Number of steps run so far.
    #[must_use]
    pub fn ticks_run(&self) -> u64 {
        self.ticks_run
    }

    #[must_use]
    pub fn config(&self) -> TickConfig {
        self.config
    }

    /// Run `step` until it stops the loop, fails, `max_ticks` is reached or
    /// Ctrl-C arrives.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `step`.
    pub async fn run<F>(&mut self, mut step: F) -> anyhow::Result<StopReason>
    where
        F: FnMut() -> anyhow::Result<Flow>,
    {
        let tick_duration = self.config.tick_duration();
        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);

        loop {
            let start = Instant::now();
            let flow = step()?;
            self.ticks_run += 1;

            if flow == Flow::Stop {
                info!(ticks = self.ticks_run, "tick loop stopped by step");
                return Ok(StopReason::Requested);
            }
            if self.config.max_ticks > 0 && self.ticks_run >= self.config.max_ticks {
                info!(ticks = self.ticks_run, "tick loop complete");
                return Ok(StopReason::Completed);
            }

            let elapsed = start.elapsed();
            let wait = if elapsed < tick_duration {
                tick_duration - elapsed
            } else {
                if !tick_duration.is_zero() {
                    warn!(
                        tick = self.ticks_run,
                        elapsed_ms = elapsed.as_millis() as u64,
                        budget_ms = tick_duration.as_millis() as u64,
                        "tick exceeded time budget"
                    );
                }
                Duration::ZERO
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut interrupt => {
                    info!(ticks = self.ticks_run, "interrupted");
                    return Ok(StopReason::Interrupted);
                }
            }
            debug!(tick = self.ticks_run, "tick done");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_duration() {
        let config = TickConfig {
            tick_rate: 20.0,
            max_ticks: 0,
        };
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
        let unpaced = TickConfig {
            tick_rate: 0.0,
            max_ticks: 0,
        };
        assert_eq!(unpaced.tick_duration(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_run_limited_ticks() {
        let mut tick_loop = TickLoop::new(TickConfig {
            tick_rate: 1000.0,
            max_ticks: 5,
        });
        let mut steps = 0;
        let reason = tick_loop
            .run(|| {
                steps += 1;
                Ok(Flow::Continue)
            })
            .await
            .unwrap();
        assert_eq!(reason, StopReason::Completed);
        assert_eq!(steps, 5);
        assert_eq!(tick_loop.ticks_run(), 5);
    }

    #[tokio::test]
    async fn test_step_can_stop_loop() {
        let mut tick_loop = TickLoop::new(TickConfig::default());
        let mut steps = 0;
        let reason = tick_loop
            .run(|| {
                steps += 1;
                Ok(if steps == 3 { Flow::Stop } else { Flow::Continue })
            })
            .await
            .unwrap();
        assert_eq!(reason, StopReason::Requested);
        assert_eq!(tick_loop.ticks_run(), 3);
    }

    #[tokio::test]
    async fn test_step_error_propagates() {
        let mut tick_loop = TickLoop::new(TickConfig::default());
        let result = tick_loop.run(|| anyhow::bail!("broken step")).await;
        assert!(result.is_err());
    }
}
