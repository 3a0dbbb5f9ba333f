//! Read-only pictures of the rolling windows handed to sinks

use crate::models::{SeriesKey, UsageRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every tracked series at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveFrame {
    pub generated_at: Option<DateTime<Utc>>,
    pub series: Vec<SeriesFrame>,
}

/// Window contents of one pod, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesFrame {
    pub namespace: String,
    pub pod_name: String,
    pub records: Vec<UsageRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
}

impl MetricKind {
    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "millicores",
            MetricKind::Memory => "bytes",
        }
    }
}

/// One metric of one pod over time, summed across its containers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub namespace: String,
    pub pod_name: String,
    pub points: Vec<MetricPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    /// `None` when any container of the pod lacked the metric at this instant
    pub value: Option<f64>,
}

impl SeriesFrame {
    pub fn key(&self) -> SeriesKey {
        SeriesKey {
            namespace: self.namespace.clone(),
            pod_name: self.pod_name.clone(),
        }
    }

    /// Per-timestamp pod totals for one metric, oldest first
    pub fn metric_points(&self, metric: MetricKind) -> Vec<MetricPoint> {
        let mut points: Vec<MetricPoint> = Vec::new();

        for record in &self.records {
            let value = match metric {
                MetricKind::Cpu => record.cpu_usage.value(),
                MetricKind::Memory => record.memory_usage.value().map(|b| b as f64),
            };

            match points.last_mut() {
                Some(last) if last.timestamp == record.timestamp => {
                    last.value = last.value.zip(value).map(|(a, b)| a + b);
                }
                _ => points.push(MetricPoint {
                    timestamp: record.timestamp,
                    value,
                }),
            }
        }

        points
    }
}

impl LiveFrame {
    /// Project the frame onto a single metric
    pub fn metric_view(&self, metric: MetricKind) -> Vec<MetricSeries> {
        self.series
            .iter()
            .map(|series| MetricSeries {
                namespace: series.namespace.clone(),
                pod_name: series.pod_name.clone(),
                points: series.metric_points(metric),
            })
            .collect()
    }
}
