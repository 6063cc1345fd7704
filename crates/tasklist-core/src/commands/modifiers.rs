use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::instrument;

use crate::datetime::parse_due_date;
use crate::task::{
  Category,
  Priority
};
use crate::view::SortMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mod {
  Category(Category),
  Priority(Priority),
  Due(Option<NaiveDate>),
  Sort(SortMode)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NewTask {
  pub text:     String,
  pub category: Category,
  pub priority: Priority,
  pub due_date: Option<NaiveDate>
}

/// Splits `add` arguments into task
/// text and attributes. Every token
/// that is not a modifier is text;
/// after `--` everything is text.
/// Text may come back empty; the
/// store decides what to do with it.
#[instrument(skip(args, today))]
pub(crate) fn parse_new_task(
  args: &[String],
  default_category: Category,
  today: NaiveDate
) -> anyhow::Result<NewTask> {
  let mut text_parts = Vec::new();
  let mut new_task = NewTask {
    text:     String::new(),
    category: default_category,
    priority: Priority::default(),
    due_date: None
  };

  let mut literal = false;
  for arg in args {
    if !literal && arg == "--" {
      literal = true;
      continue;
    }

    let one_mod = if literal {
      None
    } else {
      parse_one_mod(arg, today)?
    };

    match one_mod {
      | Some(Mod::Category(c)) => {
        new_task.category = c;
      }
      | Some(Mod::Priority(p)) => {
        new_task.priority = p;
      }
      | Some(Mod::Due(d)) => {
        new_task.due_date = d;
      }
      | Some(Mod::Sort(_)) => {
        return Err(anyhow!(
          "add: sort: only applies \
           to list"
        ));
      }
      | None => {
        text_parts.push(arg.as_str());
      }
    }
  }

  new_task.text = text_parts.join(" ");
  Ok(new_task)
}

pub(crate) fn parse_one_mod(
  tok: &str,
  today: NaiveDate
) -> anyhow::Result<Option<Mod>> {
  let Some((key, value)) = tok
    .split_once(':')
    .or_else(|| tok.split_once('='))
  else {
    return Ok(None);
  };

  let key = key.to_ascii_lowercase();

  match key.as_str() {
    | "cat" | "category" => {
      Ok(Some(Mod::Category(
        value.parse()?
      )))
    }
    | "pri" | "priority" => {
      Ok(Some(Mod::Priority(
        value.parse()?
      )))
    }
    | "due" => {
      Ok(Some(Mod::Due(
        parse_due_date(value, today)?
      )))
    }
    | "sort" => {
      Ok(Some(Mod::Sort(
        value.parse()?
      )))
    }
    | _ => Ok(None)
  }
}
