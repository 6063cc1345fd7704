use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::trace;

use crate::task::{
  Category,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum SortMode {
  /// Effective date, latest first.
  #[default]
  Date,
  /// High, then medium, then low.
  Priority,
  /// Open tasks before completed ones.
  Status
}

impl SortMode {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Date => "date",
      | Self::Priority => "priority",
      | Self::Status => "status"
    }
  }
}

impl fmt::Display for SortMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SortMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "date" | "due" => Ok(Self::Date),
      | "priority" | "pri" => {
        Ok(Self::Priority)
      }
      | "status" | "done" => {
        Ok(Self::Status)
      }
      | other => {
        Err(anyhow!(
          "unknown sort mode: {other} \
           (expected date, priority \
           or status)"
        ))
      }
    }
  }
}

/// Filtered, sorted copy of `tasks`. `Category::All` keeps every task;
/// any other category keeps exact matches only. The sort is stable, so
/// tasks that compare equal keep their input order.
#[tracing::instrument(skip(tasks))]
pub fn view(
  tasks: &[Task],
  category: Category,
  sort: SortMode
) -> Vec<Task> {
  let mut rows: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      category == Category::All
        || task.category == category
    })
    .cloned()
    .collect();

  rows.sort_by(|a, b| {
    compare_tasks(a, b, sort)
  });

  trace!(
    input = tasks.len(),
    output = rows.len(),
    "computed view"
  );
  rows
}

pub fn compare_tasks(
  a: &Task,
  b: &Task,
  sort: SortMode
) -> Ordering {
  match sort {
    | SortMode::Date => {
      b.effective_date()
        .cmp(&a.effective_date())
    }
    | SortMode::Priority => {
      b.priority
        .weight()
        .cmp(&a.priority.weight())
    }
    | SortMode::Status => {
      a.completed.cmp(&b.completed)
    }
  }
}
