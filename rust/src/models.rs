//! Core data types for the schedule network.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing one of the record enums from its wire name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// Wire name used by persistence and bindings.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

/// How a task's dates are decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulingMode {
    /// Dates are set by the caller and act as a fixed anchor.
    #[default]
    Manual,
    /// Dates are derived from incoming dependencies.
    Auto,
}

wire_enum!(SchedulingMode, "scheduling mode", {
    Manual => "MANUAL",
    Auto => "AUTO",
});

/// What propagation is allowed to do with a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Dates are inputs only; never rewritten by propagation.
    Anchor,
    /// Dates are outputs of propagation.
    Derived,
}

impl SchedulingMode {
    /// The single point where mode decides propagation behavior.
    pub fn placement(self) -> Placement {
        match self {
            SchedulingMode::Manual => Placement::Anchor,
            SchedulingMode::Auto => Placement::Derived,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    OnHold,
    Cancelled,
}

wire_enum!(TaskStatus, "task status", {
    NotStarted => "NOT_STARTED",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    OnHold => "ON_HOLD",
    Cancelled => "CANCELLED",
});

/// Precedence semantics of a dependency edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyType {
    #[default]
    FinishToStart,
    StartToStart,
    FinishToFinish,
    StartToFinish,
}

wire_enum!(DependencyType, "dependency type", {
    FinishToStart => "FINISH_TO_START",
    StartToStart => "START_TO_START",
    FinishToFinish => "FINISH_TO_FINISH",
    StartToFinish => "START_TO_FINISH",
});

/// Frozen snapshot of the originally planned placement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: i64,
}

/// Output of a critical path run. All `None` until one has executed.
///
/// `early_finish` and `late_finish` are exclusive: the day after the last
/// working day of the span.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpmFields {
    pub early_start: Option<NaiveDate>,
    pub early_finish: Option<NaiveDate>,
    pub late_start: Option<NaiveDate>,
    pub late_finish: Option<NaiveDate>,
    pub total_float: Option<i64>,
    pub free_float: Option<i64>,
    pub is_critical_path: Option<bool>,
}

/// A task in one schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub schedule_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub wbs_code: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub scheduling_mode: SchedulingMode,
    #[serde(default)]
    pub is_milestone: bool,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub cpm: CpmFields,
    #[serde(default)]
    pub baseline: Option<Baseline>,
}

impl Task {
    /// Inclusive day count of the task's dates.
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Length of the task's span; milestones occupy no time.
    pub fn span_length(&self) -> i64 {
        if self.is_milestone {
            0
        } else {
            self.duration_days()
        }
    }

    /// Exclusive finish of the span.
    pub fn finish(&self) -> Result<NaiveDate, DateOutOfRange> {
        shift_days(self.start_date, self.span_length())
    }

    /// Move the task so it starts on `start`, keeping its length. The task
    /// is left untouched if the new end falls outside the calendar.
    pub fn place_at(&mut self, start: NaiveDate) -> Result<(), DateOutOfRange> {
        let end = end_for(start, self.span_length())?;
        self.start_date = start;
        self.end_date = end;
        Ok(())
    }

    pub fn is_root(&self) -> bool {
        self.parent_task_id.is_none()
    }

    /// Days the start has slipped against the baseline (positive = late).
    pub fn start_variance_days(&self) -> Option<i64> {
        self.baseline
            .as_ref()
            .map(|b| (self.start_date - b.start_date).num_days())
    }

    /// Days the end has slipped against the baseline (positive = late).
    pub fn finish_variance_days(&self) -> Option<i64> {
        self.baseline
            .as_ref()
            .map(|b| (self.end_date - b.end_date).num_days())
    }
}

/// Raised when date arithmetic leaves the calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Date {date} shifted by {days} days is out of range")]
pub struct DateOutOfRange {
    pub date: NaiveDate,
    pub days: i64,
}

/// `date` moved by a signed number of days.
pub fn shift_days(date: NaiveDate, days: i64) -> Result<NaiveDate, DateOutOfRange> {
    let magnitude = Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    };
    shifted.ok_or(DateOutOfRange { date, days })
}

/// Inclusive end date for a span of `length` days starting on `start`.
pub(crate) fn end_for(start: NaiveDate, length: i64) -> Result<NaiveDate, DateOutOfRange> {
    if length <= 0 {
        Ok(start)
    } else {
        shift_days(start, length - 1)
    }
}

/// A precedence edge between two tasks of the same schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    pub predecessor_task_id: String,
    pub successor_task_id: String,
    #[serde(default)]
    pub dependency_type: DependencyType,
    #[serde(default)]
    pub lag_days: i32,
}

impl Dependency {
    pub fn new(
        id: impl Into<String>,
        predecessor_task_id: impl Into<String>,
        successor_task_id: impl Into<String>,
        dependency_type: DependencyType,
        lag_days: i32,
    ) -> Self {
        Self {
            id: id.into(),
            predecessor_task_id: predecessor_task_id.into(),
            successor_task_id: successor_task_id.into(),
            dependency_type,
            lag_days,
        }
    }
}

/// Input for `createTask`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub parent_task_id: Option<String>,
    /// Position among siblings; `None` appends.
    pub order_index: Option<i32>,
    pub scheduling_mode: SchedulingMode,
    pub is_milestone: bool,
    pub status: TaskStatus,
    pub progress: u8,
    pub baseline: Option<Baseline>,
}

impl NewTask {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            notes: None,
            start_date,
            end_date,
            parent_task_id: None,
            order_index: None,
            scheduling_mode: SchedulingMode::Manual,
            is_milestone: false,
            status: TaskStatus::NotStarted,
            progress: 0,
            baseline: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_task_id = Some(parent_id.into());
        self
    }

    pub fn with_order_index(mut self, order_index: i32) -> Self {
        self.order_index = Some(order_index);
        self
    }

    pub fn with_mode(mut self, mode: SchedulingMode) -> Self {
        self.scheduling_mode = mode;
        self
    }

    pub fn milestone(mut self) -> Self {
        self.is_milestone = true;
        self
    }

    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = Some(baseline);
        self
    }
}

/// Partial update for `updateTask`; `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// `Some(None)` moves the task to the root level.
    pub parent_task_id: Option<Option<String>>,
    pub order_index: Option<i32>,
    pub scheduling_mode: Option<SchedulingMode>,
    pub is_milestone: Option<bool>,
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
}

impl TaskUpdate {
    pub fn dates(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..Default::default()
        }
    }

    pub fn parent(parent_task_id: Option<String>) -> Self {
        Self {
            parent_task_id: Some(parent_task_id),
            ..Default::default()
        }
    }

    pub fn mode(mode: SchedulingMode) -> Self {
        Self {
            scheduling_mode: Some(mode),
            ..Default::default()
        }
    }

    pub fn touches_dates(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some() || self.is_milestone.is_some()
    }

    pub fn touches_hierarchy(&self) -> bool {
        self.parent_task_id.is_some() || self.order_index.is_some()
    }
}

/// What happens to the children of a deleted task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChildPolicy {
    /// Children become root-level tasks.
    #[default]
    Promote,
    /// Children take over the deleted task's parent.
    LiftToParent,
    /// Children move under the given task.
    Reparent(String),
}
