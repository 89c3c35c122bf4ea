//! Monitored-CPU selection and sysfs topology probing

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CpuSelection {
    pub sockets: Vec<i32>,
    pub cpus: Vec<i32>,
    pub cpu_labels: HashMap<i32, String>,
}

impl CpuSelection {
    /// Create a selection from explicit socket and CPU lists
    pub fn new(sockets: Vec<i32>, cpus: Vec<i32>) -> Self {
        let cpu_labels: HashMap<i32, String> = cpus
            .iter()
            .map(|&cpu| (cpu, format!("cpu_{cpu}")))
            .collect();

        Self {
            sockets,
            cpus,
            cpu_labels,
        }
    }

    /// Auto-detect all online CPUs in the system
    pub fn auto_detect() -> Self {
        let cpus = Self::detect_online_cpus();
        let sockets = Self::detect_sockets(&cpus);

        tracing::info!(
            "Auto-detected {} sockets, {} CPUs",
            sockets.len(),
            cpus.len()
        );

        Self::new(sockets, cpus)
    }

    /// Build a selection from user-supplied range lists, falling back to
    /// auto-detection when none were given
    pub fn from_ranges(ranges: &[String]) -> Self {
        if ranges.is_empty() {
            return Self::auto_detect();
        }
        let cpus = parse_range_list(ranges);
        let sockets = Self::detect_sockets(&cpus);
        Self::new(sockets, cpus)
    }

    /// Detect online CPUs from /sys/devices/system/cpu/online
    pub fn detect_online_cpus() -> Vec<i32> {
        std::fs::read_to_string("/sys/devices/system/cpu/online")
            .ok()
            .and_then(|s| parse_cpu_list(&s))
            .unwrap_or_else(|| {
                tracing::warn!("Failed to detect online CPUs, using default: 0-7");
                (0..8).collect()
            })
    }

    /// Detect which sockets the CPUs belong to
    pub fn detect_sockets(cpus: &[i32]) -> Vec<i32> {
        let mut sockets = std::collections::HashSet::new();

        for &cpu in cpus {
            let socket_path =
                format!("/sys/devices/system/cpu/cpu{cpu}/topology/physical_package_id");
            if let Ok(socket_str) = std::fs::read_to_string(&socket_path) {
                if let Ok(socket) = socket_str.trim().parse::<i32>() {
                    sockets.insert(socket);
                }
            }
        }

        let mut socket_vec: Vec<i32> = sockets.into_iter().collect();
        socket_vec.sort_unstable();

        if socket_vec.is_empty() {
            socket_vec.push(0);
        }

        socket_vec
    }
}

/// Parse a sysfs CPU list like "0-3,8-11" into a vector
fn parse_cpu_list(s: &str) -> Option<Vec<i32>> {
    let mut cpus = Vec::new();
    for part in s.trim().split(',') {
        if let Some((start, end)) = part.split_once('-') {
            let start: i32 = start.parse().ok()?;
            let end: i32 = end.parse().ok()?;
            cpus.extend(start..=end);
        } else {
            cpus.push(part.parse().ok()?);
        }
    }
    Some(cpus)
}

/// Parse user-supplied range strings like ["0-3", "5", "8-11"] or
/// comma-separated mixes like "0-3,5"
pub fn parse_range_list(inputs: &[String]) -> Vec<i32> {
    let mut result = Vec::new();

    for input in inputs {
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            if let Some((start_str, end_str)) = part.split_once('-') {
                if let (Ok(start), Ok(end)) = (
                    start_str.trim().parse::<i32>(),
                    end_str.trim().parse::<i32>(),
                ) {
                    result.extend(start..=end);
                } else {
                    tracing::warn!("Failed to parse range: {}", part);
                }
            } else if let Ok(val) = part.parse::<i32>() {
                result.push(val);
            } else {
                tracing::warn!("Failed to parse value: {}", part);
            }
        }
    }

    result.sort_unstable();
    result.dedup();

    if result.is_empty() {
        tracing::warn!("No valid CPU IDs parsed, using default: 0");
        result.push(0);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_list() {
        let parsed = parse_range_list(&["0-3,5".to_string(), "8-9".to_string()]);
        assert_eq!(parsed, vec![0, 1, 2, 3, 5, 8, 9]);
    }

    #[test]
    fn test_parse_range_list_dedups() {
        let parsed = parse_range_list(&["0-2".to_string(), "2,1".to_string()]);
        assert_eq!(parsed, vec![0, 1, 2]);
    }

    #[test]
    fn test_parse_range_list_empty_defaults_to_zero() {
        let parsed = parse_range_list(&["bogus".to_string()]);
        assert_eq!(parsed, vec![0]);
    }

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3,8-11"), Some(vec![0, 1, 2, 3, 8, 9, 10, 11]));
        assert_eq!(parse_cpu_list("4\n"), Some(vec![4]));
        assert_eq!(parse_cpu_list("junk"), None);
    }
}
