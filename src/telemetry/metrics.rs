// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metric instruments and an in-process meter.
//!
//! [`InMemoryMeter`] keeps every series in memory and can print a report. It
//! suits CLI tools and tests where a full export pipeline is overkill.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::attribute::{self, KeyValue};
use crate::error::MetricsError;

/// Maximum instrument name length.
pub const MAX_NAME_LEN: usize = 255;

/// Description and unit attached to an instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentOptions {
    pub description: String,
    pub unit: String,
}

impl InstrumentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Monotonic sum.
pub trait Counter: Send + Sync {
    fn add(&self, value: u64, attrs: &[KeyValue]);
}

/// Sum that can go up and down.
pub trait UpDownCounter: Send + Sync {
    fn add(&self, value: i64, attrs: &[KeyValue]);
}

/// Distribution of recorded values.
pub trait Histogram: Send + Sync {
    fn record(&self, value: f64, attrs: &[KeyValue]);
}

/// Last recorded value.
pub trait Gauge: Send + Sync {
    fn record(&self, value: f64, attrs: &[KeyValue]);
}

/// Creates instruments.
///
/// Asking twice for the same name returns the same instrument. Asking for an
/// existing name with a different kind is an error.
pub trait Meter: Send + Sync {
    fn counter(&self, name: &str, opts: InstrumentOptions)
        -> Result<Arc<dyn Counter>, MetricsError>;

    fn up_down_counter(
        &self,
        name: &str,
        opts: InstrumentOptions,
    ) -> Result<Arc<dyn UpDownCounter>, MetricsError>;

    fn histogram(
        &self,
        name: &str,
        opts: InstrumentOptions,
    ) -> Result<Arc<dyn Histogram>, MetricsError>;

    fn gauge(&self, name: &str, opts: InstrumentOptions) -> Result<Arc<dyn Gauge>, MetricsError>;
}

/// Check an instrument name.
///
/// Names are 1 to 255 characters, start with an ASCII letter and contain
/// only ASCII alphanumerics, `_`, `.`, `-` and `/`.
pub fn validate_name(name: &str) -> Result<(), MetricsError> {
    let invalid = |reason| MetricsError::InvalidName {
        name: name.to_string(),
        reason,
    };

    let first = name.chars().next().ok_or_else(|| invalid("name is empty"))?;
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name exceeds 255 characters"));
    }
    if !first.is_ascii_alphabetic() {
        return Err(invalid("name must start with a letter"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'))
    {
        return Err(invalid("name contains an invalid character"));
    }
    Ok(())
}

// ============================================================================
// Buckets
// ============================================================================

/// Fixed-boundary buckets for latency distributions.
#[derive(Debug, Clone, PartialEq)]
pub struct Buckets {
    /// Upper bounds, inclusive. Default (ms): [0.1, 1, 10, 100, 1000, 10000, +inf]
    bounds: Vec<f64>,

    /// Count per bucket; the last one is the overflow bucket.
    counts: Vec<u64>,
}

impl Buckets {
    /// Create buckets with custom upper bounds, sorted ascending.
    pub fn with_bounds(bounds: Vec<f64>) -> Self {
        let counts = vec![0; bounds.len() + 1];
        Self { bounds, counts }
    }

    pub fn record(&mut self, value: f64) {
        let idx = self
            .bounds
            .iter()
            .position(|&b| value <= b)
            .unwrap_or(self.bounds.len());
        self.counts[idx] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Approximate percentile: the upper bound of the bucket holding it.
    pub fn percentile(&self, p: f64) -> f64 {
        let total: u64 = self.counts.iter().sum();
        if total == 0 {
            return 0.0;
        }

        let target = ((total as f64 * p / 100.0).ceil() as u64).max(1);
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return match self.bounds.get(i) {
                    Some(bound) => *bound,
                    None => self.bounds.last().copied().unwrap_or(0.0) * 10.0,
                };
            }
        }

        0.0
    }

    pub fn p50(&self) -> f64 {
        self.percentile(50.0)
    }

    pub fn p99(&self) -> f64 {
        self.percentile(99.0)
    }
}

impl Default for Buckets {
    fn default() -> Self {
        Self::with_bounds(vec![0.1, 1.0, 10.0, 100.0, 1_000.0, 10_000.0])
    }
}

/// Aggregated histogram series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramData {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub buckets: Buckets,
}

impl HistogramData {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            buckets: Buckets::default(),
        }
    }

    fn record(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.buckets.record(value);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

// ============================================================================
// In-memory meter
// ============================================================================

type Series<T> = Mutex<HashMap<String, T>>;

fn update<T: Default>(series: &Series<T>, attrs: &[KeyValue], f: impl FnOnce(&mut T)) {
    let key = attribute::series_key(attrs);
    let mut map = series.lock().unwrap_or_else(|e| e.into_inner());
    f(map.entry(key).or_default());
}

fn collect<T: Clone>(series: &Series<T>) -> BTreeMap<String, T> {
    series
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[derive(Default)]
struct MemoryCounter {
    series: Series<u64>,
}

impl Counter for MemoryCounter {
    fn add(&self, value: u64, attrs: &[KeyValue]) {
        update(&self.series, attrs, |v| *v += value);
    }
}

#[derive(Default)]
struct MemoryUpDownCounter {
    series: Series<i64>,
}

impl UpDownCounter for MemoryUpDownCounter {
    fn add(&self, value: i64, attrs: &[KeyValue]) {
        update(&self.series, attrs, |v| *v += value);
    }
}

impl Default for HistogramData {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct MemoryHistogram {
    series: Series<HistogramData>,
}

impl Histogram for MemoryHistogram {
    fn record(&self, value: f64, attrs: &[KeyValue]) {
        update(&self.series, attrs, |h| h.record(value));
    }
}

#[derive(Default)]
struct MemoryGauge {
    series: Series<f64>,
}

impl Gauge for MemoryGauge {
    fn record(&self, value: f64, attrs: &[KeyValue]) {
        update(&self.series, attrs, |v| *v = value);
    }
}

#[derive(Clone)]
enum Instrument {
    Counter(Arc<MemoryCounter>),
    UpDownCounter(Arc<MemoryUpDownCounter>),
    Histogram(Arc<MemoryHistogram>),
    Gauge(Arc<MemoryGauge>),
}

impl Instrument {
    fn kind(&self) -> &'static str {
        match self {
            Self::Counter(_) => "counter",
            Self::UpDownCounter(_) => "up-down counter",
            Self::Histogram(_) => "histogram",
            Self::Gauge(_) => "gauge",
        }
    }
}

struct Registered {
    options: InstrumentOptions,
    instrument: Instrument,
}

/// [`Meter`] that aggregates every series in process memory.
pub struct InMemoryMeter {
    instruments: RwLock<HashMap<String, Registered>>,
    start_time: Instant,
}

impl InMemoryMeter {
    pub fn new() -> Self {
        Self {
            instruments: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Get uptime since the meter was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn get_or_create(
        &self,
        name: &str,
        opts: InstrumentOptions,
        make: fn() -> Instrument,
        kind: &'static str,
    ) -> Result<Instrument, MetricsError> {
        validate_name(name)?;

        if let Some(existing) = self.lookup(name) {
            return Self::check_kind(name, existing, kind);
        }

        let mut instruments = self.instruments.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have registered the name between the two locks.
        if let Some(existing) = instruments.get(name) {
            return Self::check_kind(name, existing.instrument.clone(), kind);
        }
        let instrument = make();
        instruments.insert(
            name.to_string(),
            Registered {
                options: opts,
                instrument: instrument.clone(),
            },
        );
        Ok(instrument)
    }

    fn lookup(&self, name: &str) -> Option<Instrument> {
        self.instruments
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|r| r.instrument.clone())
    }

    fn check_kind(
        name: &str,
        existing: Instrument,
        kind: &'static str,
    ) -> Result<Instrument, MetricsError> {
        if existing.kind() == kind {
            Ok(existing)
        } else {
            Err(MetricsError::KindMismatch {
                name: name.to_string(),
                existing: existing.kind(),
            })
        }
    }

    /// Current value of a counter series.
    pub fn counter_value(&self, name: &str, attrs: &[KeyValue]) -> Option<u64> {
        match self.lookup(name)? {
            Instrument::Counter(c) => collect(&c.series)
                .get(&attribute::series_key(attrs))
                .copied(),
            _ => None,
        }
    }

    /// Current aggregate of a histogram series.
    pub fn histogram_data(&self, name: &str, attrs: &[KeyValue]) -> Option<HistogramData> {
        match self.lookup(name)? {
            Instrument::Histogram(h) => collect(&h.series)
                .remove(&attribute::series_key(attrs)),
            _ => None,
        }
    }

    /// Options an instrument was registered with.
    pub fn options(&self, name: &str) -> Option<InstrumentOptions> {
        self.instruments
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|r| r.options.clone())
    }

    /// Take a snapshot of all series.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let instruments = self.instruments.read().unwrap_or_else(|e| e.into_inner());
        let mut snapshot = MetricsSnapshot {
            counters: BTreeMap::new(),
            up_down_counters: BTreeMap::new(),
            histograms: BTreeMap::new(),
            gauges: BTreeMap::new(),
            uptime: self.uptime(),
        };

        for (name, registered) in instruments.iter() {
            let name = name.clone();
            match &registered.instrument {
                Instrument::Counter(c) => {
                    snapshot.counters.insert(name, collect(&c.series));
                }
                Instrument::UpDownCounter(c) => {
                    snapshot.up_down_counters.insert(name, collect(&c.series));
                }
                Instrument::Histogram(h) => {
                    snapshot.histograms.insert(name, collect(&h.series));
                }
                Instrument::Gauge(g) => {
                    snapshot.gauges.insert(name, collect(&g.series));
                }
            }
        }
        snapshot
    }

    /// Drop every instrument.
    pub fn reset(&self) {
        self.instruments
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for InMemoryMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl Meter for InMemoryMeter {
    fn counter(
        &self,
        name: &str,
        opts: InstrumentOptions,
    ) -> Result<Arc<dyn Counter>, MetricsError> {
        match self.get_or_create(name, opts, || Instrument::Counter(Arc::default()), "counter")? {
            Instrument::Counter(c) => Ok(c),
            other => Err(MetricsError::KindMismatch {
                name: name.to_string(),
                existing: other.kind(),
            }),
        }
    }

    fn up_down_counter(
        &self,
        name: &str,
        opts: InstrumentOptions,
    ) -> Result<Arc<dyn UpDownCounter>, MetricsError> {
        match self.get_or_create(
            name,
            opts,
            || Instrument::UpDownCounter(Arc::default()),
            "up-down counter",
        )? {
            Instrument::UpDownCounter(c) => Ok(c),
            other => Err(MetricsError::KindMismatch {
                name: name.to_string(),
                existing: other.kind(),
            }),
        }
    }

    fn histogram(
        &self,
        name: &str,
        opts: InstrumentOptions,
    ) -> Result<Arc<dyn Histogram>, MetricsError> {
        match self.get_or_create(
            name,
            opts,
            || Instrument::Histogram(Arc::default()),
            "histogram",
        )? {
            Instrument::Histogram(h) => Ok(h),
            other => Err(MetricsError::KindMismatch {
                name: name.to_string(),
                existing: other.kind(),
            }),
        }
    }

    fn gauge(&self, name: &str, opts: InstrumentOptions) -> Result<Arc<dyn Gauge>, MetricsError> {
        match self.get_or_create(name, opts, || Instrument::Gauge(Arc::default()), "gauge")? {
            Instrument::Gauge(g) => Ok(g),
            other => Err(MetricsError::KindMismatch {
                name: name.to_string(),
                existing: other.kind(),
            }),
        }
    }
}

/// A snapshot of all series at a point in time, keyed by instrument name and
/// then by series key.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, BTreeMap<String, u64>>,
    pub up_down_counters: BTreeMap<String, BTreeMap<String, i64>>,
    pub histograms: BTreeMap<String, BTreeMap<String, HistogramData>>,
    pub gauges: BTreeMap<String, BTreeMap<String, f64>>,

    /// Uptime when snapshot was taken.
    pub uptime: Duration,
}

impl MetricsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.up_down_counters.is_empty()
            && self.histograms.is_empty()
            && self.gauges.is_empty()
    }

    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Metrics Report ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n\n", self.uptime));

        let label = |key: &str| {
            if key.is_empty() {
                "{}".to_string()
            } else {
                format!("{{{}}}", key)
            }
        };

        if !self.counters.is_empty() {
            report.push_str("Counters:\n");
            for (name, series) in &self.counters {
                for (key, value) in series {
                    report.push_str(&format!("  {}{}: {}\n", name, label(key), value));
                }
            }
            report.push('\n');
        }

        if !self.up_down_counters.is_empty() {
            report.push_str("Up-down counters:\n");
            for (name, series) in &self.up_down_counters {
                for (key, value) in series {
                    report.push_str(&format!("  {}{}: {}\n", name, label(key), value));
                }
            }
            report.push('\n');
        }

        if !self.histograms.is_empty() {
            report.push_str("Histograms:\n");
            for (name, series) in &self.histograms {
                for (key, data) in series {
                    report.push_str(&format!(
                        "  {}{}: {} samples, avg {:.2}, min {:.2}, max {:.2}, p99 <= {}\n",
                        name,
                        label(key),
                        data.count,
                        data.mean(),
                        data.min,
                        data.max,
                        data.buckets.p99()
                    ));
                }
            }
            report.push('\n');
        }

        if !self.gauges.is_empty() {
            report.push_str("Gauges:\n");
            for (name, series) in &self.gauges {
                for (key, value) in series {
                    report.push_str(&format!("  {}{}: {}\n", name, label(key), value));
                }
            }
        }

        report
    }
}

// ============================================================================
// No-op meter
// ============================================================================

/// Meter whose instruments discard every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMeter;

#[derive(Debug, Clone, Copy, Default)]
struct NoopInstrument;

impl Counter for NoopInstrument {
    fn add(&self, _value: u64, _attrs: &[KeyValue]) {}
}

impl UpDownCounter for NoopInstrument {
    fn add(&self, _value: i64, _attrs: &[KeyValue]) {}
}

impl Histogram for NoopInstrument {
    fn record(&self, _value: f64, _attrs: &[KeyValue]) {}
}

impl Gauge for NoopInstrument {
    fn record(&self, _value: f64, _attrs: &[KeyValue]) {}
}

impl Meter for NoopMeter {
    fn counter(&self, _: &str, _: InstrumentOptions) -> Result<Arc<dyn Counter>, MetricsError> {
        Ok(Arc::new(NoopInstrument))
    }

    fn up_down_counter(
        &self,
        _: &str,
        _: InstrumentOptions,
    ) -> Result<Arc<dyn UpDownCounter>, MetricsError> {
        Ok(Arc::new(NoopInstrument))
    }

    fn histogram(
        &self,
        _: &str,
        _: InstrumentOptions,
    ) -> Result<Arc<dyn Histogram>, MetricsError> {
        Ok(Arc::new(NoopInstrument))
    }

    fn gauge(&self, _: &str, _: InstrumentOptions) -> Result<Arc<dyn Gauge>, MetricsError> {
        Ok(Arc::new(NoopInstrument))
    }
}
