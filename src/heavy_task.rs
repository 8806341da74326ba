use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use std::time::Duration;

use crate::error::HandlerError;

// possible simulated durations (ms)
const DELAYS_MS: [u64; 9] = [100, 150, 200, 300, 600, 500, 1000, 1400, 2500];

const FAILURES: [&str; 4] = [
    "DB Payment Failure",
    "DB Server is Down",
    "Access Denied",
    "Not Found",
];

// The slow operation behind /slow. Returns how long it took in ms.
#[async_trait]
pub trait HeavyTask: Send + Sync {
    async fn run(&self) -> Result<u64, HandlerError>;
}

/// Sleeps for a random delay, failing up front with probability `failure_rate`.
pub struct SimulatedHeavyTask {
    failure_rate: f64,
}

impl SimulatedHeavyTask {
    pub fn new(failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() { 0.0 } else { failure_rate.clamp(0.0, 1.0) };
        Self { failure_rate }
    }

    // ThreadRng is !Send so the dice are rolled before any await
    fn roll(&self) -> Result<u64, HandlerError> {
        let mut rng = rand::thread_rng();

        if rng.gen_bool(self.failure_rate) {
            let msg = FAILURES.choose(&mut rng).copied().unwrap_or(FAILURES[0]);
            return Err(HandlerError::Task(msg.to_string()));
        }

        Ok(*DELAYS_MS.choose(&mut rng).unwrap_or(&DELAYS_MS[0]))
    }
}

#[async_trait]
impl HeavyTask for SimulatedHeavyTask {
    async fn run(&self) -> Result<u64, HandlerError> {
        let ms = self.roll()?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn never_failing_task_returns_known_delay() {
        let task = SimulatedHeavyTask::new(0.0);
        for _ in 0..20 {
            let ms = task.run().await.unwrap();
            assert!(DELAYS_MS.contains(&ms));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_task_uses_known_message() {
        let task = SimulatedHeavyTask::new(1.0);
        let err = task.run().await.unwrap_err();
        assert!(FAILURES.contains(&err.to_string().as_str()));
    }

    #[test]
    fn failure_rate_is_clamped() {
        assert_eq!(SimulatedHeavyTask::new(7.0).failure_rate, 1.0);
        assert_eq!(SimulatedHeavyTask::new(-1.0).failure_rate, 0.0);
    }
}
