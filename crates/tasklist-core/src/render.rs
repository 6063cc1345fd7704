use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_due_date;
use crate::task::{Priority, Task, Theme};

/// ANSI SGR codes per theme.
#[derive(Debug, Clone, Copy)]
struct Palette {
    id: &'static str,
    high: &'static str,
    medium: &'static str,
    overdue: &'static str,
    done: &'static str,
}

const LIGHT: Palette = Palette {
    id: "34",
    high: "31",
    medium: "33",
    overdue: "1;31",
    done: "2;9",
};

const DARK: Palette = Palette {
    id: "96",
    high: "91",
    medium: "93",
    overdue: "1;91",
    done: "2;9",
};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    palette: Palette,
}

impl Renderer {
    /// Colour needs both `color` enabled and a terminal on stdout.
    pub fn new(cfg: &Config, theme: Theme) -> Self {
        let mut renderer = Self::plain(theme);
        renderer.color = color_enabled(cfg) && io::stdout().is_terminal();
        renderer
    }

    pub fn plain(theme: Theme) -> Self {
        let palette = match theme {
            Theme::Light => LIGHT,
            Theme::Dark => DARK,
        };
        Self {
            color: false,
            palette,
        }
    }

    #[tracing::instrument(skip(self, out, tasks))]
    pub fn write_task_table<W: Write>(
        &self,
        mut out: W,
        tasks: &[Task],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Due".to_string(),
            "Category".to_string(),
            "Priority".to_string(),
            "Text".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(&task.id.to_string(), self.palette.id);
            let done = if task.completed { "[x]" } else { "[ ]" }.to_string();

            let due = match task.due_date {
                Some(date) if date < today && !task.completed => {
                    self.paint(&format_due_date(date), self.palette.overdue)
                }
                Some(date) => format_due_date(date),
                None => String::new(),
            };

            let priority = match task.priority {
                Priority::High => self.paint(task.priority.as_str(), self.palette.high),
                Priority::Medium => self.paint(task.priority.as_str(), self.palette.medium),
                Priority::Low => task.priority.as_str().to_string(),
            };

            let text = if task.completed {
                self.paint(&task.text, self.palette.done)
            } else {
                task.text.clone()
            };

            rows.push(vec![id, done, due, task.category.to_string(), priority, text]);
        }

        let count = rows.len();
        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        writeln!(out, "{count} task{}", if count == 1 { "" } else { "s" })?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn color_enabled(cfg: &Config) -> bool {
    cfg.get_bool("color").unwrap_or(true)
}

/// One labelled line per field, plus the summary line the list view
/// would show under the text.
pub fn write_task_info<W: Write>(mut out: W, task: &Task) -> anyhow::Result<()> {
    writeln!(out, "id         {}", task.id)?;
    writeln!(out, "text       {}", task.text)?;
    writeln!(out, "completed  {}", if task.completed { "yes" } else { "no" })?;
    writeln!(out, "category   {}", task.category)?;
    writeln!(out, "priority   {}", task.priority)?;
    writeln!(
        out,
        "due        {}",
        task.due_date.map(format_due_date).unwrap_or_default()
    )?;
    writeln!(out, "created    {}", task.created_at.to_rfc3339())?;
    writeln!(out, "summary    {}", summary_line(task))?;
    Ok(())
}

pub fn summary_line(task: &Task) -> String {
    let mut line = format!("{} \u{2022} {} priority", task.category, task.priority);
    if let Some(date) = task.due_date {
        line.push_str(&format!(" \u{2022} Due: {}", format_due_date(date)));
    }
    line
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let line = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| pad(header, *width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{}", line.trim_end())?;

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| pad(cell, *width))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn pad(cell: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
    format!("{cell}{}", " ".repeat(width.saturating_sub(visible)))
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
