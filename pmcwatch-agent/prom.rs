//! Prometheus export of the active configuration's overall values

use std::collections::HashMap;

use parking_lot::Mutex;
use prometheus::{Gauge, Opts, Registry};

/// Publishes `overall_raw_values` from each tick as gauges
pub struct OverallMetricsExporter {
    registry: Registry,
    gauges: Mutex<HashMap<String, Gauge>>,
}

impl OverallMetricsExporter {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Update the gauges from one tick's overall values, registering any
    /// gauge seen for the first time
    pub fn publish(&self, values: &[(String, f64)]) {
        let mut gauges = self.gauges.lock();
        for (name, value) in values {
            let key = sanitize(name);
            if !gauges.contains_key(&key) {
                let opts = Opts::new(
                    format!("pmcwatch_{key}"),
                    format!("{name} from the active monitoring configuration"),
                );
                let gauge = match Gauge::with_opts(opts) {
                    Ok(g) => g,
                    Err(e) => {
                        tracing::warn!("Failed to create gauge {key}: {e}");
                        continue;
                    }
                };
                if let Err(e) = self.registry.register(Box::new(gauge.clone())) {
                    tracing::warn!("Failed to register gauge {key}: {e}");
                    continue;
                }
                gauges.insert(key.clone(), gauge);
            }
            if let Some(gauge) = gauges.get(&key) {
                gauge.set(*value);
            }
        }
    }
}

impl Default for OverallMetricsExporter {
    fn default() -> Self {
        Self::new()
    }
}

fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_registers_and_updates() {
        let exporter = OverallMetricsExporter::new();
        exporter.publish(&[("instructions".to_string(), 1.0e9)]);
        exporter.publish(&[("instructions".to_string(), 2.0e9)]);

        let families = exporter.registry().gather();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_name(), "pmcwatch_instructions");
        let metric = &families[0].get_metric()[0];
        assert_eq!(metric.get_gauge().get_value(), 2.0e9);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("L2 Hitrate"), "l2_hitrate");
        assert_eq!(sanitize("3DNow"), "_3dnow");
    }
}
