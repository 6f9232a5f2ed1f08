use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PerfMeasurement {
    pub name: String,
    pub elapsed_ms: f64,
}

/// Accumulated phase timings for one invocation.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PerfReport {
    pub measurements: Vec<PerfMeasurement>,
}

impl PerfReport {
    pub fn add(&mut self, name: &str, elapsed_ms: f64) {
        match self.measurements.iter_mut().find(|m| m.name == name) {
            Some(existing) => existing.elapsed_ms += elapsed_ms,
            None => self.measurements.push(PerfMeasurement {
                name: name.to_string(),
                elapsed_ms,
            }),
        }
    }

    pub fn get(&self, name: &str) -> f64 {
        self.measurements
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.elapsed_ms)
            .unwrap_or(0.0)
    }

    pub fn log(&self) {
        match serde_json::to_string(self) {
            Ok(json) => tracing::debug!(perf = %json, "timings"),
            Err(err) => tracing::debug!(error = %err, "timings unavailable"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::{PerfReport, Timer};

    #[test]
    fn measurements_accumulate_by_name() {
        let mut report = PerfReport::default();
        report.add("load", 1.5);
        report.add("gc", 2.0);
        report.add("load", 0.5);
        assert_eq!(report.get("load"), 2.0);
        assert_eq!(report.get("gc"), 2.0);
        assert_eq!(report.get("commit"), 0.0);
        assert_eq!(report.measurements.len(), 2);
        assert!(Timer::start().elapsed_ms() >= 0.0);
    }
}
