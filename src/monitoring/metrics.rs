// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/monitoring/metrics.rs - Remote resource metrics over ssh

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub xnode_id: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub network_in_mbps: f64,
    pub network_out_mbps: f64,
    pub load_average: (f64, f64, f64),
}

pub struct MetricsCollector {
    pub ssh_timeout: Duration,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            ssh_timeout: Duration::from_secs(10),
        }
    }
}

impl MetricsCollector {
    pub fn new(ssh_timeout: u64) -> Self {
        Self {
            ssh_timeout: Duration::from_secs(ssh_timeout),
        }
    }

    /// One ssh round trip reading cpu, memory, disk and load in a fixed
    /// line order. Any failure, from an unreachable host to an
    /// unparseable line, yields `None` rather than an error; the caller
    /// treats a missing sample as "no data this round".
    pub async fn collect_metrics(
        &self,
        xnode_id: String,
        ip_address: Option<&str>,
        ssh_key_path: Option<&str>,
    ) -> Option<ResourceMetrics> {
        let ip = ip_address?;
        let ssh_key = ssh_key_path.unwrap_or("~/.ssh/id_rsa");

        let remote_cmd = "top -bn1 | grep 'Cpu(s)' | awk '{print $2}' && \
             free | grep Mem | awk '{print ($3/$2) * 100}' && \
             df -h / | tail -1 | awk '{print $5}' && \
             uptime";

        let ssh_cmd = format!(
            "ssh -o StrictHostKeyChecking=no -o ConnectTimeout=5 -i {ssh_key} root@{ip} '{remote_cmd}'"
        );

        let result = tokio::time::timeout(
            self.ssh_timeout,
            Command::new("sh").arg("-c").arg(&ssh_cmd).output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => {
                self.parse_metrics_output(xnode_id, &output.stdout)
            }
            _ => {
                debug!(xnode_id = %xnode_id, "metrics collection failed");
                None
            }
        }
    }

    // The line order here is fixed by the remote command above. A changed
    // remote toolchain (busybox top, localized free) breaks the parse and
    // the whole sample is dropped.
    fn parse_metrics_output(&self, xnode_id: String, stdout: &[u8]) -> Option<ResourceMetrics> {
        let output = String::from_utf8_lossy(stdout);
        let lines: Vec<&str> = output.trim().split('\n').collect();

        if lines.len() < 4 {
            return None;
        }

        let cpu_percent = lines[0].trim().replace('%', "").parse::<f64>().ok()?;
        let memory_percent = lines[1].trim().parse::<f64>().ok()?;
        let disk_percent = lines[2].trim().replace('%', "").parse::<f64>().ok()?;
        let load_average = parse_load_average(lines[3])?;

        Some(ResourceMetrics {
            xnode_id,
            timestamp: Utc::now(),
            cpu_percent,
            memory_percent,
            disk_percent,
            network_in_mbps: 0.0,
            network_out_mbps: 0.0,
            load_average,
        })
    }
}

fn parse_load_average(uptime_line: &str) -> Option<(f64, f64, f64)> {
    // " 12:34:56 up 1 day,  2:34,  1 user,  load average: 0.52, 0.58, 0.59"
    let parts: Vec<&str> = uptime_line.split("load average:").collect();
    if parts.len() != 2 {
        return None;
    }

    let loads: Vec<&str> = parts[1].trim().split(',').collect();
    if loads.len() < 3 {
        return None;
    }

    let load1 = loads[0].trim().parse::<f64>().ok()?;
    let load5 = loads[1].trim().parse::<f64>().ok()?;
    let load15 = loads[2].trim().parse::<f64>().ok()?;
    Some((load1, load5, load15))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_load_average() {
        let line = " 12:34:56 up 1 day,  2:34,  1 user,  load average: 0.52, 0.58, 0.59";
        assert_eq!(parse_load_average(line), Some((0.52, 0.58, 0.59)));
        assert_eq!(parse_load_average("no load average here"), None);
    }

    #[test]
    fn test_parse_metrics_output() {
        let collector = MetricsCollector::default();
        let output =
            b"75.5\n80.2\n85%\n 12:34:56 up 1 day,  2:34,  1 user,  load average: 0.52, 0.58, 0.59";
        let metrics = collector
            .parse_metrics_output("x-1".to_string(), output)
            .unwrap();

        assert_eq!(metrics.cpu_percent, 75.5);
        assert_eq!(metrics.memory_percent, 80.2);
        assert_eq!(metrics.disk_percent, 85.0);
        assert_eq!(metrics.load_average, (0.52, 0.58, 0.59));
        assert_eq!(metrics.network_in_mbps, 0.0);
    }

    #[test]
    fn test_short_or_garbled_output_is_none() {
        let collector = MetricsCollector::default();
        assert!(collector
            .parse_metrics_output("x-1".to_string(), b"75.5\n80.2")
            .is_none());
        assert!(collector
            .parse_metrics_output("x-1".to_string(), b"nan%\nok\nbad\nuptime")
            .is_none());
    }

    #[tokio::test]
    async fn test_no_address_is_none() {
        let collector = MetricsCollector::default();
        assert!(collector
            .collect_metrics("x-1".to_string(), None, None)
            .await
            .is_none());
    }
}
