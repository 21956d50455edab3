//! Constraint resolution for a single precedence edge.
//!
//! Works on spans `[start, finish)` where `finish` is exclusive, so a
//! finish-to-start edge with zero lag puts the successor on the day after
//! the predecessor's last day.

use chrono::NaiveDate;

use crate::models::{shift_days, DateOutOfRange, Dependency, DependencyType, Task};

/// A task placement as a half-open day range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: NaiveDate,
    pub finish: NaiveDate,
}

impl Span {
    pub fn new(start: NaiveDate, length: i64) -> Result<Self, DateOutOfRange> {
        Ok(Self {
            start,
            finish: shift_days(start, length)?,
        })
    }

    pub fn of(task: &Task) -> Result<Self, DateOutOfRange> {
        Self::new(task.start_date, task.span_length())
    }

    pub fn length(&self) -> i64 {
        (self.finish - self.start).num_days()
    }
}

/// The side of the successor an edge constrains, with its earliest value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    /// Successor may not start before this day.
    Start(NaiveDate),
    /// Successor's exclusive finish may not be before this day.
    Finish(NaiveDate),
}

impl Bound {
    /// Days by which `successor` clears this bound (negative = violated).
    pub fn gap(&self, successor: Span) -> i64 {
        match *self {
            Bound::Start(day) => (successor.start - day).num_days(),
            Bound::Finish(day) => (successor.finish - day).num_days(),
        }
    }
}

/// Earliest bound one edge imposes on its successor, given the
/// predecessor's span.
pub fn resolve(
    dependency_type: DependencyType,
    lag_days: i32,
    predecessor: Span,
) -> Result<Bound, DateOutOfRange> {
    let lag = i64::from(lag_days);
    Ok(match dependency_type {
        DependencyType::FinishToStart => Bound::Start(shift_days(predecessor.finish, lag)?),
        DependencyType::StartToStart => Bound::Start(shift_days(predecessor.start, lag)?),
        DependencyType::FinishToFinish => Bound::Finish(shift_days(predecessor.finish, lag)?),
        DependencyType::StartToFinish => Bound::Finish(shift_days(predecessor.start, lag)?),
    })
}

/// [`resolve`] for a stored edge.
pub fn resolve_edge(edge: &Dependency, predecessor: Span) -> Result<Bound, DateOutOfRange> {
    resolve(edge.dependency_type, edge.lag_days, predecessor)
}

/// Latest exclusive finish the predecessor may have so that `successor`
/// (its late span) still satisfies the edge. Mirror of [`resolve`].
pub fn resolve_backward(
    dependency_type: DependencyType,
    lag_days: i32,
    successor: Span,
    predecessor_length: i64,
) -> Result<NaiveDate, DateOutOfRange> {
    let back = -i64::from(lag_days);
    match dependency_type {
        DependencyType::FinishToStart => shift_days(successor.start, back),
        DependencyType::StartToStart => {
            shift_days(shift_days(successor.start, back)?, predecessor_length)
        }
        DependencyType::FinishToFinish => shift_days(successor.finish, back),
        DependencyType::StartToFinish => {
            shift_days(shift_days(successor.finish, back)?, predecessor_length)
        }
    }
}

/// The binding (latest) start-side and finish-side bounds over many edges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bounds {
    pub start: Option<NaiveDate>,
    pub finish: Option<NaiveDate>,
}

impl Bounds {
    pub fn push(&mut self, bound: Bound) {
        match bound {
            Bound::Start(day) => self.start = Some(self.start.map_or(day, |s| s.max(day))),
            Bound::Finish(day) => self.finish = Some(self.finish.map_or(day, |f| f.max(day))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.finish.is_none()
    }

    /// Earliest start of a span of `length` days satisfying every bound.
    /// A lone finish bound is turned into a start by subtracting the length.
    pub fn earliest_start(&self, length: i64) -> Result<Option<NaiveDate>, DateOutOfRange> {
        let from_finish = self.finish.map(|f| shift_days(f, -length)).transpose()?;
        Ok(match (self.start, from_finish) {
            (Some(s), Some(f)) => Some(s.max(f)),
            (s, f) => s.or(f),
        })
    }
}
