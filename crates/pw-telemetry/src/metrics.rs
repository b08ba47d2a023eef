use ahash::AHashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};

/// Upper bounds (seconds) used for every duration histogram.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

// ---------------------------------------------------------------------------
// Series key
// ---------------------------------------------------------------------------

/// Metric name plus a label set sorted by label name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub name: String,
    pub labels: Vec<(String, String)>,
}

impl SeriesKey {
    pub fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        labels.sort();
        Self {
            name: name.to_string(),
            labels,
        }
    }

    /// `{a="1",b="2"}`, or empty when unlabelled. Values are escaped.
    pub fn label_block(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }
        let inner: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
            .collect();
        format!("{{{}}}", inner.join(","))
    }
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Histogram {
    /// Per-bucket (non-cumulative) observation counts.
    buckets: Vec<AtomicU64>,
    /// f64 bits.
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            buckets: DURATION_BUCKETS.iter().map(|_| AtomicU64::new(0)).collect(),
            sum: AtomicU64::new(0f64.to_bits()),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, value: f64) {
        if let Some(i) = DURATION_BUCKETS.iter().position(|b| value <= *b) {
            self.buckets[i].fetch_add(1, Ordering::Relaxed);
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .sum
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
    }

    fn sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Thread-safe registry of counters, gauges and histograms.
///
/// Series are created on first use. Lookups take a read lock; only the
/// first touch of a new series takes the write lock.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<AHashMap<SeriesKey, AtomicU64>>,
    gauges: RwLock<AHashMap<SeriesKey, AtomicI64>>,
    histograms: RwLock<AHashMap<SeriesKey, Histogram>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Counters -----------------------------------------------------------

    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, labels, 1);
    }

    pub fn increment_counter_by(&self, name: &str, labels: &[(&str, &str)], amount: u64) {
        let key = SeriesKey::new(name, labels);
        with_series(&self.counters, key, AtomicU64::default, |c| {
            c.fetch_add(amount, Ordering::Relaxed);
        });
    }

    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = SeriesKey::new(name, labels);
        read(&self.counters)
            .get(&key)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    // -- Gauges -------------------------------------------------------------

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: i64) {
        let key = SeriesKey::new(name, labels);
        with_series(&self.gauges, key, AtomicI64::default, |g| {
            g.store(value, Ordering::Relaxed);
        });
    }

    pub fn get_gauge(&self, name: &str, labels: &[(&str, &str)]) -> i64 {
        let key = SeriesKey::new(name, labels);
        read(&self.gauges)
            .get(&key)
            .map_or(0, |g| g.load(Ordering::Relaxed))
    }

    // -- Histograms ---------------------------------------------------------

    /// Record one observation (seconds) into a duration histogram.
    pub fn record_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = SeriesKey::new(name, labels);
        with_series(&self.histograms, key, Histogram::new, |h| h.observe(value));
    }

    /// `(count, sum)` of a histogram series.
    pub fn histogram_stats(&self, name: &str, labels: &[(&str, &str)]) -> (u64, f64) {
        let key = SeriesKey::new(name, labels);
        read(&self.histograms)
            .get(&key)
            .map_or((0, 0.0), |h| (h.count(), h.sum()))
    }

    // -- Export --------------------------------------------------------------

    /// Prometheus text exposition format, series sorted by name then labels.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        let counters = read(&self.counters);
        let mut keys: Vec<&SeriesKey> = counters.keys().collect();
        keys.sort();
        let mut last = None;
        for key in keys {
            if last != Some(&key.name) {
                let _ = writeln!(out, "# TYPE {} counter", key.name);
                last = Some(&key.name);
            }
            let v = counters[key].load(Ordering::Relaxed);
            let _ = writeln!(out, "{}{} {v}", key.name, key.label_block());
        }

        let gauges = read(&self.gauges);
        let mut keys: Vec<&SeriesKey> = gauges.keys().collect();
        keys.sort();
        let mut last = None;
        for key in keys {
            if last != Some(&key.name) {
                let _ = writeln!(out, "# TYPE {} gauge", key.name);
                last = Some(&key.name);
            }
            let v = gauges[key].load(Ordering::Relaxed);
            let _ = writeln!(out, "{}{} {v}", key.name, key.label_block());
        }

        let histograms = read(&self.histograms);
        let mut keys: Vec<&SeriesKey> = histograms.keys().collect();
        keys.sort();
        let mut last = None;
        for key in keys {
            if last != Some(&key.name) {
                let _ = writeln!(out, "# TYPE {} histogram", key.name);
                last = Some(&key.name);
            }
            let h = &histograms[key];
            let mut cumulative = 0u64;
            for (bound, n) in DURATION_BUCKETS.iter().zip(&h.buckets) {
                cumulative += n.load(Ordering::Relaxed);
                let le = bucket_key(key, &bound.to_string());
                let _ = writeln!(out, "{}_bucket{} {cumulative}", key.name, le.label_block());
            }
            let inf = bucket_key(key, "+Inf");
            let _ = writeln!(out, "{}_bucket{} {}", key.name, inf.label_block(), h.count());
            let _ = writeln!(out, "{}_sum{} {}", key.name, key.label_block(), h.sum());
            let _ = writeln!(out, "{}_count{} {}", key.name, key.label_block(), h.count());
        }

        out
    }
}

fn bucket_key(key: &SeriesKey, le: &str) -> SeriesKey {
    let mut labels = key.labels.clone();
    labels.push(("le".to_string(), le.to_string()));
    SeriesKey {
        name: key.name.clone(),
        labels,
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

/// Apply `f` to the series at `key`, creating it with `init` on first use.
fn with_series<V>(
    lock: &RwLock<AHashMap<SeriesKey, V>>,
    key: SeriesKey,
    init: impl FnOnce() -> V,
    f: impl FnOnce(&V),
) {
    if let Some(v) = read(lock).get(&key) {
        f(v);
        return;
    }
    let mut map = lock.write().unwrap_or_else(PoisonError::into_inner);
    f(&*map.entry(key).or_insert_with(init));
}

// ---------------------------------------------------------------------------
// Global singleton
// ---------------------------------------------------------------------------

/// Process-wide collector.
pub fn global_metrics() -> &'static MetricsCollector {
    static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
    INSTANCE.get_or_init(MetricsCollector::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_per_label_set() {
        let m = MetricsCollector::new();
        m.increment_counter("runs_total", &[("outcome", "ok")]);
        m.increment_counter("runs_total", &[("outcome", "ok")]);
        m.increment_counter("runs_total", &[("outcome", "error")]);
        assert_eq!(m.get_counter("runs_total", &[("outcome", "ok")]), 2);
        assert_eq!(m.get_counter("runs_total", &[("outcome", "error")]), 1);
        assert_eq!(m.get_counter("runs_total", &[("outcome", "timeout")]), 0);
    }

    #[test]
    fn label_order_does_not_matter() {
        let m = MetricsCollector::new();
        m.increment_counter("c", &[("a", "1"), ("b", "2")]);
        assert_eq!(m.get_counter("c", &[("b", "2"), ("a", "1")]), 1);
    }

    #[test]
    fn histogram_tracks_count_and_sum() {
        let m = MetricsCollector::new();
        m.record_histogram("d", &[], 0.05);
        m.record_histogram("d", &[], 0.5);
        m.record_histogram("d", &[], 2.0);
        let (count, sum) = m.histogram_stats("d", &[]);
        assert_eq!(count, 3);
        assert!((sum - 2.55).abs() < 1e-9);
    }

    #[test]
    fn prometheus_buckets_are_cumulative() {
        let m = MetricsCollector::new();
        m.record_histogram("d", &[], 0.004);
        m.record_histogram("d", &[], 0.2);
        m.record_histogram("d", &[], 120.0);
        let out = m.export_prometheus();
        assert!(out.contains("# TYPE d histogram"));
        assert!(out.contains("d_bucket{le=\"0.005\"} 1"));
        assert!(out.contains("d_bucket{le=\"0.25\"} 2"));
        assert!(out.contains("d_bucket{le=\"60\"} 2"));
        assert!(out.contains("d_bucket{le=\"+Inf\"} 3"));
        assert!(out.contains("d_count 3"));
    }

    #[test]
    fn label_values_are_escaped() {
        let key = SeriesKey::new("x", &[("path", "a\"b")]);
        assert_eq!(key.label_block(), "{path=\"a\\\"b\"}");
        assert_eq!(SeriesKey::new("x", &[]).label_block(), "");
    }

    #[test]
    fn gauges_overwrite() {
        let m = MetricsCollector::new();
        m.set_gauge("keys", &[], 3);
        m.set_gauge("keys", &[], 1);
        assert_eq!(m.get_gauge("keys", &[]), 1);
        assert!(m.export_prometheus().contains("# TYPE keys gauge\nkeys 1\n"));
    }
}
