//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::{Selector, Server};

/// Round-robin selector.
/// A shared, monotonically increasing counter indexes the healthy set.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn next_server<'a>(&self, healthy: &[&'a Server], _key: &str) -> Option<&'a Server> {
        if healthy.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Some(healthy[index])
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Algorithm;
    use crate::load_balancer::test_support::{healthy, ids};
    use crate::load_balancer::SelectionEngine;
    use std::sync::Arc;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let a = healthy("a");
        let b = healthy("b");
        let servers = vec![&a, &b];

        assert_eq!(lb.next_server(&servers, "").unwrap().id, "a");
        assert_eq!(lb.next_server(&servers, "").unwrap().id, "b");
        assert_eq!(lb.next_server(&servers, "").unwrap().id, "a");
    }

    #[test]
    fn six_calls_visit_three_servers_twice_in_id_order() {
        let engine = SelectionEngine::new(Algorithm::RoundRobin);
        let servers = vec![healthy("a"), healthy("b"), healthy("c")];

        let picked: Vec<Server> = (0..6).map(|_| engine.select(&servers, "").unwrap()).collect();
        assert_eq!(ids(&picked), vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn concurrent_callers_share_the_counter() {
        let engine = Arc::new(SelectionEngine::new(Algorithm::RoundRobin));
        let servers = Arc::new(vec![healthy("a"), healthy("b"), healthy("c")]);

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let engine = engine.clone();
                let servers = servers.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| engine.select(&servers, "").unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        assert!(counts.values().all(|&c| c == 100));
    }
}
