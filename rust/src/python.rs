//! PyO3 bindings for the stateless passes.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::NaiveDate;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::critical_path::TaskTiming;
use crate::models::{CpmFields, Dependency, DependencyType, SchedulingMode, Task, TaskStatus};
use crate::repository::ScheduleSnapshot;
use crate::schedule::Schedule;

// Note: We use std HashMap here for PyO3 interface compatibility

const PYTHON_SCHEDULE_ID: &str = "python";

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// A task record as seen from Python.
#[pyclass(name = "Task")]
#[derive(Clone, Debug)]
pub struct PyTask {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub start_date: NaiveDate,
    #[pyo3(get, set)]
    pub end_date: NaiveDate,
    #[pyo3(get, set)]
    pub scheduling_mode: String,
    #[pyo3(get, set)]
    pub is_milestone: bool,
    #[pyo3(get, set)]
    pub parent_task_id: Option<String>,
    #[pyo3(get, set)]
    pub order_index: i32,
    #[pyo3(get, set)]
    pub wbs_code: String,
}

#[pymethods]
impl PyTask {
    #[new]
    #[pyo3(signature = (
        id,
        start_date,
        end_date,
        scheduling_mode="MANUAL".to_string(),
        is_milestone=false,
        parent_task_id=None,
        order_index=0,
        wbs_code=String::new()
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        scheduling_mode: String,
        is_milestone: bool,
        parent_task_id: Option<String>,
        order_index: i32,
        wbs_code: String,
    ) -> Self {
        Self {
            id,
            start_date,
            end_date,
            scheduling_mode,
            is_milestone,
            parent_task_id,
            order_index,
            wbs_code,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Task(id={:?}, start={}, end={}, mode={})",
            self.id, self.start_date, self.end_date, self.scheduling_mode
        )
    }
}

impl PyTask {
    fn to_record(&self) -> PyResult<Task> {
        let scheduling_mode: SchedulingMode = self.scheduling_mode.parse().map_err(value_error)?;
        Ok(Task {
            id: self.id.clone(),
            schedule_id: PYTHON_SCHEDULE_ID.to_string(),
            title: self.id.clone(),
            description: None,
            notes: None,
            start_date: self.start_date,
            end_date: self.end_date,
            parent_task_id: self.parent_task_id.clone(),
            order_index: self.order_index,
            wbs_code: self.wbs_code.clone(),
            level: 0,
            scheduling_mode,
            is_milestone: self.is_milestone,
            status: TaskStatus::NotStarted,
            progress: 0,
            cpm: CpmFields::default(),
            baseline: None,
        })
    }

    fn from_record(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            start_date: task.start_date,
            end_date: task.end_date,
            scheduling_mode: task.scheduling_mode.as_str().to_string(),
            is_milestone: task.is_milestone,
            parent_task_id: task.parent_task_id.clone(),
            order_index: task.order_index,
            wbs_code: task.wbs_code.clone(),
        }
    }
}

/// A dependency edge as seen from Python.
#[pyclass(name = "Dependency")]
#[derive(Clone, Debug)]
pub struct PyDependency {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub predecessor_task_id: String,
    #[pyo3(get, set)]
    pub successor_task_id: String,
    #[pyo3(get, set)]
    pub dependency_type: String,
    #[pyo3(get, set)]
    pub lag_days: i32,
}

#[pymethods]
impl PyDependency {
    #[new]
    #[pyo3(signature = (
        id,
        predecessor_task_id,
        successor_task_id,
        dependency_type="FINISH_TO_START".to_string(),
        lag_days=0
    ))]
    fn new(
        id: String,
        predecessor_task_id: String,
        successor_task_id: String,
        dependency_type: String,
        lag_days: i32,
    ) -> Self {
        Self {
            id,
            predecessor_task_id,
            successor_task_id,
            dependency_type,
            lag_days,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Dependency({:?} -> {:?}, type={}, lag_days={})",
            self.predecessor_task_id, self.successor_task_id, self.dependency_type, self.lag_days
        )
    }
}

impl PyDependency {
    fn to_record(&self) -> PyResult<Dependency> {
        let dependency_type: DependencyType = self.dependency_type.parse().map_err(value_error)?;
        Ok(Dependency::new(
            self.id.clone(),
            self.predecessor_task_id.clone(),
            self.successor_task_id.clone(),
            dependency_type,
            self.lag_days,
        ))
    }
}

/// CPM output for one task.
#[pyclass(name = "TaskTiming")]
#[derive(Clone, Debug)]
pub struct PyTaskTiming {
    #[pyo3(get)]
    pub early_start: NaiveDate,
    #[pyo3(get)]
    pub early_finish: NaiveDate,
    #[pyo3(get)]
    pub late_start: NaiveDate,
    #[pyo3(get)]
    pub late_finish: NaiveDate,
    #[pyo3(get)]
    pub total_float: i64,
    #[pyo3(get)]
    pub free_float: i64,
    #[pyo3(get)]
    pub is_critical: bool,
}

impl From<&TaskTiming> for PyTaskTiming {
    fn from(timing: &TaskTiming) -> Self {
        Self {
            early_start: timing.early_start,
            early_finish: timing.early_finish,
            late_start: timing.late_start,
            late_finish: timing.late_finish,
            total_float: timing.total_float,
            free_float: timing.free_float,
            is_critical: timing.is_critical(),
        }
    }
}

/// Result of `calculate_critical_path`.
#[pyclass(name = "CriticalPathResult")]
#[derive(Clone, Debug)]
pub struct PyCriticalPathResult {
    #[pyo3(get)]
    pub task_timings: HashMap<String, PyTaskTiming>,
    #[pyo3(get)]
    pub critical_path_tasks: Vec<String>,
    #[pyo3(get)]
    pub project_start: Option<NaiveDate>,
    #[pyo3(get)]
    pub project_finish: Option<NaiveDate>,
}

fn load(tasks: &[PyTask], dependencies: &[PyDependency], verbosity: u8) -> PyResult<Schedule> {
    let snapshot = ScheduleSnapshot {
        schedule_id: PYTHON_SCHEDULE_ID.to_string(),
        schedule_start_date: None,
        schedule_end_date: None,
        tasks: tasks.iter().map(PyTask::to_record).collect::<PyResult<_>>()?,
        dependencies: dependencies
            .iter()
            .map(PyDependency::to_record)
            .collect::<PyResult<_>>()?,
    };
    Schedule::from_snapshot(snapshot, EngineConfig::default().with_verbosity(verbosity))
        .map_err(value_error)
}

/// Propagate dates over the whole network.
///
/// # Returns
/// * Every task with its (possibly moved) dates, sorted by ID
///
/// # Raises
/// * ValueError on unknown enum names, invalid records, a dependency cycle
///   or dates pushed past the calendar range
#[pyfunction]
#[pyo3(signature = (tasks, dependencies, verbosity=0))]
fn auto_schedule_all(
    tasks: Vec<PyTask>,
    dependencies: Vec<PyDependency>,
    verbosity: u8,
) -> PyResult<Vec<PyTask>> {
    let mut schedule = load(&tasks, &dependencies, verbosity)?;
    schedule.auto_schedule_all().map_err(value_error)?;
    Ok(schedule
        .snapshot()
        .tasks
        .iter()
        .map(PyTask::from_record)
        .collect())
}

/// Run the critical path method over the network.
#[pyfunction]
#[pyo3(signature = (tasks, dependencies, verbosity=0))]
fn calculate_critical_path(
    tasks: Vec<PyTask>,
    dependencies: Vec<PyDependency>,
    verbosity: u8,
) -> PyResult<PyCriticalPathResult> {
    let mut schedule = load(&tasks, &dependencies, verbosity)?;
    let result = schedule.calculate_critical_path().map_err(value_error)?;
    Ok(PyCriticalPathResult {
        task_timings: result
            .task_timings
            .iter()
            .map(|(id, timing)| (id.clone(), PyTaskTiming::from(timing)))
            .collect(),
        critical_path_tasks: result.critical_path_tasks,
        project_start: result.project_start,
        project_finish: result.project_finish,
    })
}

/// The schedule_network Python module.
#[pymodule]
fn schedule_network(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Record types
    m.add_class::<PyTask>()?;
    m.add_class::<PyDependency>()?;
    m.add_class::<PyTaskTiming>()?;
    m.add_class::<PyCriticalPathResult>()?;

    // Passes
    m.add_function(wrap_pyfunction!(auto_schedule_all, m)?)?;
    m.add_function(wrap_pyfunction!(calculate_critical_path, m)?)?;

    Ok(())
}
