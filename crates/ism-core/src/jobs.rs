//! Rollup and transform job definitions.
//!
//! Only the definition shapes and their validation live here; running a
//! job on its schedule is somebody else's business.

use crate::error::{IsmError, Result};
use crate::policy::CronExpression;
use crate::units::TimeValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const MAX_PAGE_SIZE: u32 = 10_000;

fn default_page_size() -> u32 {
    1_000
}

fn default_timezone() -> String {
    "UTC".to_string()
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalUnit {
    #[serde(alias = "minutes", alias = "MINUTES")]
    Minutes,
    #[serde(alias = "hours", alias = "HOURS")]
    Hours,
    #[serde(alias = "days", alias = "DAYS")]
    Days,
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IntervalUnit::Minutes => "Minutes",
            IntervalUnit::Hours => "Hours",
            IntervalUnit::Days => "Days",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntervalSchedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    pub period: u64,
    pub unit: IntervalUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    Interval(IntervalSchedule),
    Cron(CronExpression),
}

impl Schedule {
    pub fn validate(&self) -> Result<()> {
        match self {
            Schedule::Interval(i) if i.period == 0 => Err(IsmError::validation(
                "schedule interval period must be greater than 0",
            )),
            Schedule::Interval(_) => Ok(()),
            Schedule::Cron(c) => {
                c.schedule()?;
                c.timezone()?;
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dimensions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateHistogram {
    pub source_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_interval: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TermsGroup {
    pub source_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistogramGroup {
    pub source_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
    pub interval: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    DateHistogram(DateHistogram),
    Terms(TermsGroup),
    Histogram(HistogramGroup),
}

const CALENDAR_INTERVALS: &[&str] = &[
    "minute", "1m", "hour", "1h", "day", "1d", "week", "1w", "month", "1M", "quarter", "1q",
    "year", "1y",
];

impl Dimension {
    pub fn source_field(&self) -> &str {
        match self {
            Dimension::DateHistogram(d) => &d.source_field,
            Dimension::Terms(t) => &t.source_field,
            Dimension::Histogram(h) => &h.source_field,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.source_field().trim().is_empty() {
            return Err(IsmError::validation("dimension source_field must not be empty"));
        }
        match self {
            Dimension::DateHistogram(d) => {
                match (&d.fixed_interval, &d.calendar_interval) {
                    (Some(fixed), None) => {
                        fixed.parse::<TimeValue>()?;
                    }
                    (None, Some(cal)) if CALENDAR_INTERVALS.contains(&cal.as_str()) => {}
                    (None, Some(cal)) => {
                        return Err(IsmError::validation(format!(
                            "unknown calendar_interval '{cal}'"
                        )))
                    }
                    _ => {
                        return Err(IsmError::validation(format!(
                            "date_histogram on '{}' needs exactly one of fixed_interval or calendar_interval",
                            d.source_field
                        )))
                    }
                }
                d.timezone
                    .parse::<chrono_tz::Tz>()
                    .map_err(|_| IsmError::validation(format!("invalid timezone '{}'", d.timezone)))?;
                Ok(())
            }
            Dimension::Histogram(h) if h.interval.is_nan() || h.interval <= 0.0 => {
                Err(IsmError::validation(format!(
                    "histogram on '{}' needs a positive interval",
                    h.source_field
                )))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricAggregation {
    Min(Empty),
    Max(Empty),
    Sum(Empty),
    Avg(Empty),
    ValueCount(Empty),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSpec {
    pub source_field: String,
    pub metrics: Vec<MetricAggregation>,
}

// ---------------------------------------------------------------------------
// Rollup / Transform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rollup {
    #[serde(default)]
    pub description: String,
    pub source_index: String,
    pub target_index: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub continuous: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    pub schedule: Schedule,
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

impl Rollup {
    pub fn validate(&self) -> Result<()> {
        check_indices(&self.source_index, &self.target_index)?;
        check_page_size(self.page_size)?;
        self.schedule.validate()?;

        match self.dimensions.first() {
            None => return Err(IsmError::validation("rollup needs at least one dimension")),
            Some(Dimension::DateHistogram(_)) => {}
            Some(_) => {
                return Err(IsmError::validation(
                    "the first rollup dimension must be a date_histogram",
                ))
            }
        }
        for dim in &self.dimensions {
            dim.validate()?;
        }
        for metric in &self.metrics {
            if metric.source_field.trim().is_empty() {
                return Err(IsmError::validation("metric source_field must not be empty"));
            }
            if metric.metrics.is_empty() {
                return Err(IsmError::validation(format!(
                    "metric on '{}' names no aggregation",
                    metric.source_field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transform {
    #[serde(default)]
    pub description: String,
    pub source_index: String,
    pub target_index: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub enabled: bool,
    pub schedule: Schedule,
    pub groups: Vec<Dimension>,
    #[serde(default)]
    pub aggregations: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_selection_query: Option<Value>,
}

impl Transform {
    pub fn validate(&self) -> Result<()> {
        check_indices(&self.source_index, &self.target_index)?;
        check_page_size(self.page_size)?;
        self.schedule.validate()?;
        if self.groups.is_empty() {
            return Err(IsmError::validation("transform needs at least one group"));
        }
        for group in &self.groups {
            group.validate()?;
        }
        Ok(())
    }
}

fn check_indices(source: &str, target: &str) -> Result<()> {
    if source.trim().is_empty() || target.trim().is_empty() {
        return Err(IsmError::validation("source_index and target_index are required"));
    }
    if source == target {
        return Err(IsmError::validation(
            "source_index and target_index must differ",
        ));
    }
    Ok(())
}

fn check_page_size(size: u32) -> Result<()> {
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(IsmError::validation(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// JobDefinition
// ---------------------------------------------------------------------------

/// A job file: `{ "rollup": { ... } }` or `{ "transform": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobDefinition {
    Rollup(Rollup),
    Transform(Transform),
}

impl JobDefinition {
    /// Parse JSON or YAML, then validate.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        let job: JobDefinition = serde_json::from_value(value)
            .map_err(|e| IsmError::validation(format!("malformed job definition: {e}")))?;
        job.validate()?;
        Ok(job)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobDefinition::Rollup(_) => "rollup",
            JobDefinition::Transform(_) => "transform",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            JobDefinition::Rollup(r) => r.validate(),
            JobDefinition::Transform(t) => t.validate(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
