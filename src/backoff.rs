use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::time::Delta;

/// Exponential backoff used when a transmit attempt finds the wire busy.
///
/// The retry window doubles with every attempt up to `ceiling`, and each
/// delay is a uniform draw of whole slots from that window.
#[derive(Debug, Clone, Copy, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct BackoffConfig {
    #[builder(default = Delta::new(1_000), setter(into))]
    pub slot_time: Delta,
    #[builder(default = 1)]
    pub min_slots: u32,
    #[builder(default = 1000)]
    pub max_slots: u32,
    #[builder(default = 10)]
    pub ceiling: u32,
    #[builder(default = 1000)]
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug)]
pub(crate) struct Backoff {
    cfg: BackoffConfig,
    retries: u32,
    rng: StdRng,
}

impl Backoff {
    pub(crate) fn new(cfg: BackoffConfig, seed: u64) -> Self {
        Self {
            cfg,
            retries: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub(crate) fn delay(&mut self) -> Delta {
        let ceiling = if self.cfg.ceiling > 0 && self.retries > self.cfg.ceiling {
            self.cfg.ceiling
        } else {
            self.retries
        };
        let min_slot = self.cfg.min_slots;
        let max_slot = (2u32.saturating_pow(ceiling).saturating_sub(1)).min(self.cfg.max_slots);
        let max_slot = max_slot.max(min_slot);
        let slots = self.rng.gen_range(min_slot..=max_slot);
        self.cfg.slot_time.scale_by(f64::from(slots))
    }

    pub(crate) fn reset(&mut self) {
        self.retries = 0;
    }

    pub(crate) fn max_retries_reached(&self) -> bool {
        self.retries >= self.cfg.max_retries
    }

    pub(crate) fn incr_retries(&mut self) {
        self.retries += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_within_window() {
        let cfg = BackoffConfig::builder()
            .slot_time(Delta::new(10))
            .min_slots(1)
            .max_slots(8)
            .ceiling(3)
            .max_retries(4)
            .build();
        let mut backoff = Backoff::new(cfg, 7);
        for _ in 0..32 {
            backoff.incr_retries();
            let delay = backoff.delay();
            assert!(delay >= Delta::new(10));
            assert!(delay <= Delta::new(80));
        }
    }

    #[test]
    fn retries_exhaust() {
        let mut backoff = Backoff::new(
            BackoffConfig::builder().max_retries(2).build(),
            0,
        );
        assert!(!backoff.max_retries_reached());
        backoff.incr_retries();
        backoff.incr_retries();
        assert!(backoff.max_retries_reached());
        backoff.reset();
        assert!(!backoff.max_retries_reached());
    }
}
