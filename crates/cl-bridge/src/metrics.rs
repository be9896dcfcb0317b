//! Per-call latencies and live device-buffer counters (`metrics` feature).

use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

/* ───────────── raw latencies ─────────────────────────── */

static TIMES: Lazy<Mutex<Vec<(&'static str, u128)>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// `record("enqueue_write", started)` after the call returns.
pub fn record(name: &'static str, start: Instant) {
    let dur = start.elapsed().as_micros();
    // a poisoned lock only means another thread panicked mid-push
    let mut times = TIMES.lock().unwrap_or_else(|e| e.into_inner());
    times.push((name, dur));
}

/* ───────────── device buffers ────────────────────────── */

/// Device buffers currently alive.
pub static ALLOCS: AtomicUsize = AtomicUsize::new(0);
/// Bytes held by those buffers.
pub static ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Latency {
    pub name: &'static str,
    pub calls: usize,
    pub mean_us: u128,
    pub p95_us: u128,
}

/// Drains the recorded latencies, grouped per call name and sorted by name.
pub fn drain() -> Vec<Latency> {
    let mut map: HashMap<&'static str, Vec<u128>> = HashMap::new();
    {
        let mut times = TIMES.lock().unwrap_or_else(|e| e.into_inner());
        for (name, us) in times.drain(..) {
            map.entry(name).or_default().push(us);
        }
    }

    let mut out: Vec<Latency> = map
        .into_iter()
        .map(|(name, mut v)| {
            v.sort_unstable();
            let mean_us = v.iter().sum::<u128>() / v.len() as u128;
            let p95_us = v[((v.len() * 95) / 100).saturating_sub(1)];
            Latency { name, calls: v.len(), mean_us, p95_us }
        })
        .collect();
    out.sort_by_key(|l| l.name);
    out
}

/// Logs the latency table and the allocation counters. Call once at exit.
pub fn summary() {
    for l in drain() {
        tracing::info!(
            call = l.name,
            calls = l.calls,
            mean_us = l.mean_us as u64,
            p95_us = l.p95_us as u64,
            "latency"
        );
    }
    let allocs = ALLOCS.load(Ordering::Relaxed);
    let bytes = ALLOC_BYTES.load(Ordering::Relaxed);
    tracing::info!(live_buffers = allocs, live_bytes = bytes, "device allocations");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn groups_by_call_name() {
        let start = Instant::now() - Duration::from_millis(2);
        record("metrics_test_a", start);
        record("metrics_test_a", start);
        record("metrics_test_b", start);

        let table = drain();
        let a = table.iter().find(|l| l.name == "metrics_test_a").unwrap();
        assert_eq!(a.calls, 2);
        assert!(a.mean_us >= 2_000);
        assert!(table.iter().any(|l| l.name == "metrics_test_b"));
    }
}
