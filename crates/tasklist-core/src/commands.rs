mod modifiers;

use std::io::Write;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::render::{Renderer, write_task_info};
use crate::storage::KeyValueStore;
use crate::store::TaskStore;
use crate::task::{Category, Theme};
use crate::view::view;

use self::modifiers::{Mod, parse_new_task, parse_one_mod};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "toggle",
        "delete",
        "info",
        "theme",
        "export",
        "categories",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv, out))]
pub fn dispatch<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
    out: &mut W,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = inv.command.as_str();

    debug!(command, args = ?inv.command_args, "dispatching command");

    match command {
        "add" => cmd_add(store, cfg, &inv.command_args, now, out),
        "list" => cmd_list(store, cfg, renderer, &inv.command_args, now, out),
        "toggle" => cmd_toggle(store, &inv.command_args, out),
        "delete" => cmd_delete(store, &inv.command_args, out),
        "info" => cmd_info(store, &inv.command_args, out),
        "theme" => cmd_theme(store, &inv.command_args, out),
        "export" => cmd_export(store, out),
        "categories" => cmd_categories(store, out),
        "_commands" => {
            for name in known_command_names() {
                writeln!(out, "{name}")?;
            }
            Ok(())
        }
        "_show" => {
            for (k, v) in cfg.iter() {
                writeln!(out, "{k}={v}")?;
            }
            Ok(())
        }
        "help" => cmd_help(out),
        "version" => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, cfg, args, now, out))]
fn cmd_add<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");

    let today = cfg.zone()?.today(now);
    let new_task = parse_new_task(args, cfg.default_category()?, today)?;

    match store.add_at(
        &new_task.text,
        new_task.category,
        new_task.priority,
        new_task.due_date,
        now,
    )? {
        Some(task) => writeln!(out, "Created task {}.", task.id)?,
        None => writeln!(out, "Nothing added: task text is empty.")?,
    }
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, now, out))]
fn cmd_list<S: KeyValueStore, W: Write>(
    store: &TaskStore<S>,
    cfg: &Config,
    renderer: &Renderer,
    args: &[String],
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command list");

    let today = cfg.zone()?.today(now);
    let mut category = cfg.default_category()?;
    let mut sort = cfg.default_sort()?;

    for arg in args {
        match parse_one_mod(arg, today)? {
            Some(Mod::Category(c)) => category = c,
            Some(Mod::Sort(s)) => sort = s,
            Some(other) => {
                return Err(anyhow!("list: {other:?} is not a list option"));
            }
            None => {
                warn!(arg = %arg, "unrecognized list argument ignored");
            }
        }
    }

    let rows = view(store.tasks(), category, sort);
    debug!(%category, %sort, shown = rows.len(), "listing tasks");
    renderer.write_task_table(out, &rows, today)
}

#[instrument(skip(store, args, out))]
fn cmd_toggle<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command toggle");

    for id in parse_ids("toggle", args)? {
        match store.toggle_completed(id)? {
            Some(true) => writeln!(out, "Task {id} marked completed.")?,
            Some(false) => writeln!(out, "Task {id} marked open.")?,
            None => writeln!(out, "No task with id {id}.")?,
        }
    }
    Ok(())
}

#[instrument(skip(store, args, out))]
fn cmd_delete<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command delete");

    for id in parse_ids("delete", args)? {
        match store.delete(id)? {
            Some(_) => writeln!(out, "Deleted task {id}.")?,
            None => writeln!(out, "No task with id {id}.")?,
        }
    }
    Ok(())
}

fn cmd_info<S: KeyValueStore, W: Write>(
    store: &TaskStore<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command info");

    let ids = parse_ids("info", args)?;
    for (n, id) in ids.iter().enumerate() {
        let task = store
            .get(*id)
            .ok_or_else(|| anyhow!("no task with id {id}"))?;
        if n > 0 {
            writeln!(out)?;
        }
        write_task_info(&mut *out, task)?;
    }
    Ok(())
}

#[instrument(skip(store, args, out))]
fn cmd_theme<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command theme");

    let theme = match args {
        [] => store.theme(),
        [arg] if arg.eq_ignore_ascii_case("toggle") => store.toggle_theme()?,
        [arg] => {
            let theme: Theme = arg.to_ascii_lowercase().parse()?;
            store.set_theme(theme)?;
            theme
        }
        _ => return Err(anyhow!("theme takes at most one argument")),
    };

    writeln!(out, "Theme: {theme}")?;
    Ok(())
}

fn cmd_export<S: KeyValueStore, W: Write>(
    store: &TaskStore<S>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command export");

    let payload =
        serde_json::to_string_pretty(store.tasks()).context("failed to encode tasks")?;
    writeln!(out, "{payload}")?;
    Ok(())
}

fn cmd_categories<S: KeyValueStore, W: Write>(
    store: &TaskStore<S>,
    out: &mut W,
) -> anyhow::Result<()> {
    let tasks = store.tasks();
    writeln!(out, "All ({})", tasks.len())?;
    for category in Category::CHOICES {
        let count = tasks.iter().filter(|t| t.category == category).count();
        writeln!(out, "{category} ({count})")?;
    }
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "Commands:\n  \
         add <text...> [cat:<category>] [pri:<low|medium|high>] [due:<date>]\n  \
         list [cat:<category>] [sort:<date|priority|status>]\n  \
         toggle <id...>\n  \
         delete <id...>\n  \
         info <id...>\n  \
         theme [light|dark|toggle]\n  \
         export\n  \
         categories\n\
         Categories: All, Work, Personal, Shopping, Health\n\
         Dates: YYYY-MM-DD, today, tomorrow, yesterday, a weekday, +Nd, +Nw, none"
    )?;
    Ok(())
}

fn parse_ids(command: &str, args: &[String]) -> anyhow::Result<Vec<u64>> {
    if args.is_empty() {
        return Err(anyhow!("{command} requires at least one task id"));
    }

    args.iter()
        .map(|arg| {
            arg.trim()
                .parse::<u64>()
                .with_context(|| format!("{command}: invalid task id {arg:?}"))
        })
        .collect()
}
