//! In-process statistics registry.
//!
//! Every variable lives twice: as an atomic readable in-process (tests and the
//! CLI dump read these) and as a `metrics` facade gauge/histogram so whatever
//! exporter the host installs sees the same numbers.

use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Named signed counter.
#[derive(Debug)]
pub struct Variable {
    name: String,
    value: AtomicI64,
}

impl Variable {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: AtomicI64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Adds `delta` (may be negative) and returns the new value.
    pub fn add(&self, delta: i64) -> i64 {
        let v = self.value.fetch_add(delta, Ordering::Relaxed) + delta;
        metrics::gauge!(self.name.clone()).set(v as f64);
        v
    }

    pub fn increment(&self) -> i64 {
        self.add(1)
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
        metrics::gauge!(self.name.clone()).set(value as f64);
    }

    pub fn clear(&self) {
        self.set(0);
    }
}

/// Count/sum/min/max summary of recorded samples.
#[derive(Debug)]
pub struct Histogram {
    name: String,
    count: AtomicI64,
    sum: AtomicI64,
    min: AtomicI64,
    max: AtomicI64,
}

impl Histogram {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: AtomicI64::new(0),
            sum: AtomicI64::new(0),
            min: AtomicI64::new(i64::MAX),
            max: AtomicI64::new(i64::MIN),
        }
    }

    pub fn add(&self, sample: i64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(sample, Ordering::Relaxed);
        self.min.fetch_min(sample, Ordering::Relaxed);
        self.max.fetch_max(sample, Ordering::Relaxed);
        metrics::histogram!(self.name.clone()).record(sample as f64);
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> i64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn min(&self) -> Option<i64> {
        (self.count() > 0).then(|| self.min.load(Ordering::Relaxed))
    }

    pub fn max(&self) -> Option<i64> {
        (self.count() > 0).then(|| self.max.load(Ordering::Relaxed))
    }

    pub fn average(&self) -> f64 {
        let n = self.count();
        if n == 0 {
            0.0
        } else {
            self.sum() as f64 / n as f64
        }
    }
}

/// Registry shared by all pipeline components of one process (or one test).
#[derive(Debug, Default)]
pub struct Statistics {
    variables: DashMap<String, Arc<Variable>>,
    histograms: DashMap<String, Arc<Histogram>>,
}

impl Statistics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the variable, creating it at zero on first use.
    pub fn variable(&self, name: &str) -> Arc<Variable> {
        if let Some(v) = self.variables.get(name) {
            return v.clone();
        }
        self.variables
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Variable::new(name)))
            .clone()
    }

    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        if let Some(h) = self.histograms.get(name) {
            return h.clone();
        }
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::new(name)))
            .clone()
    }

    /// Current value of a variable; zero if never touched.
    pub fn get(&self, name: &str) -> i64 {
        self.variables.get(name).map(|v| v.get()).unwrap_or(0)
    }

    /// Zeroes every variable. Histograms are kept.
    pub fn clear(&self) {
        for v in self.variables.iter() {
            v.clear();
        }
    }

    /// Snapshot of all statistics as sorted JSON.
    pub fn dump(&self) -> Value {
        let mut vars: Vec<(String, i64)> = self
            .variables
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        vars.sort();
        let mut out = Map::new();
        for (k, v) in vars {
            out.insert(k, json!(v));
        }
        let mut hists: Vec<(String, Arc<Histogram>)> = self
            .histograms
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        hists.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, h) in hists {
            out.insert(
                k,
                json!({
                    "count": h.count(),
                    "avg": h.average(),
                    "min": h.min(),
                    "max": h.max(),
                }),
            );
        }
        Value::Object(out)
    }
}
