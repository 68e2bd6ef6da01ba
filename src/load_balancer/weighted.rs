//! Weighted random load balancing strategy.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::load_balancer::{Selector, Server};

/// Cumulative-weight random draw.
///
/// Over many draws each server is picked with probability
/// `weight / total_weight`.
#[derive(Debug)]
pub struct Weighted {
    rng: Mutex<StdRng>,
}

impl Weighted {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic draws for a given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for Weighted {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for Weighted {
    fn next_server<'a>(&self, healthy: &[&'a Server], _key: &str) -> Option<&'a Server> {
        let total: u64 = healthy.iter().map(|s| u64::from(s.weight)).sum();
        if total == 0 {
            return None;
        }

        let mut draw = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.gen_range(0..total)
        };

        for server in healthy {
            let weight = u64::from(server.weight);
            if draw < weight {
                return Some(*server);
            }
            draw -= weight;
        }
        None
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}
