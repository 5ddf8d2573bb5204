use std::io::Write;

use anyhow::anyhow;
use tracing::{info, instrument, warn};

use crate::app::App;
use crate::cli::Command;
use crate::codec::EMPTY_LIST;
use crate::render::Renderer;
use crate::storage::KeyValueStore;
use crate::task::Task;

#[instrument(skip(app, renderer, out))]
pub fn dispatch<S: KeyValueStore, W: Write>(
    app: &mut App<S>,
    renderer: &Renderer,
    command: Command,
    mut out: W,
) -> anyhow::Result<()> {
    match command {
        Command::List { json } => cmd_list(app, renderer, json, &mut out),
        Command::Add { title } => cmd_add(app, &title.join(" "), &mut out),
        Command::Done { id } => cmd_done(app, id, &mut out),
        Command::Undone { id } => cmd_undone(app, id, &mut out),
        Command::Remove { id } => cmd_remove(app, id, &mut out),
        Command::Rename { id, title } => cmd_rename(app, id, &title.join(" "), &mut out),
        Command::Update { title } => cmd_update(app, &title.join(" "), &mut out),
        Command::Export => cmd_export(app, &mut out),
    }
}

fn cmd_list<S: KeyValueStore, W: Write>(
    app: &App<S>,
    renderer: &Renderer,
    json: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, &app.view())?;
        writeln!(out)?;
        return Ok(());
    }
    renderer.write_task_table(out, app.title(), app.tasks())
}

fn cmd_add<S: KeyValueStore, W: Write>(
    app: &mut App<S>,
    title: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");
    app.form_mut().set_title(title);
    let task = app.add()?;
    writeln!(out, "Created task {}.", task.id)?;
    Ok(())
}

fn cmd_done<S: KeyValueStore, W: Write>(
    app: &mut App<S>,
    id: u64,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command done");
    let task = find_task(app, id)?;
    if task.done {
        writeln!(out, "Task {id} is already done.")?;
        return Ok(());
    }
    app.mark_as_done(&task)?;
    writeln!(out, "Completed task {id} '{}'.", task.title)?;
    Ok(())
}

fn cmd_undone<S: KeyValueStore, W: Write>(
    app: &mut App<S>,
    id: u64,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command undone");
    let task = find_task(app, id)?;
    if !task.done {
        writeln!(out, "Task {id} is not done.")?;
        return Ok(());
    }
    app.mark_as_undone(&task)?;
    writeln!(out, "Reopened task {id} '{}'.", task.title)?;
    Ok(())
}

fn cmd_remove<S: KeyValueStore, W: Write>(
    app: &mut App<S>,
    id: u64,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command remove");
    let task = find_task(app, id)?;
    app.remove(&task)?;
    writeln!(out, "Removed task {id} '{}'.", task.title)?;
    Ok(())
}

fn cmd_rename<S: KeyValueStore, W: Write>(
    app: &mut App<S>,
    id: u64,
    title: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command rename");
    find_task(app, id)?;

    app.start_edit(id);
    app.set_inline_text(title);
    if app.finish_edit(id)? {
        writeln!(out, "Renamed task {id}.")?;
    } else {
        warn!(id, "blank title, rename skipped");
        writeln!(out, "Task {id} unchanged.")?;
    }
    Ok(())
}

fn cmd_update<S: KeyValueStore, W: Write>(
    app: &mut App<S>,
    title: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command update");
    let existing = app.tasks().iter().find(|t| t.title == title).cloned();
    if let Some(task) = existing {
        app.edit(&task);
    } else {
        app.form_mut().set_title(title);
    }

    if app.update()? {
        writeln!(out, "Updated task '{title}'.")?;
    } else {
        writeln!(out, "No task titled '{title}'.")?;
    }
    Ok(())
}

fn cmd_export<S: KeyValueStore, W: Write>(app: &App<S>, out: &mut W) -> anyhow::Result<()> {
    let store = app.store();
    let raw = store
        .storage()
        .get_item(store.key())?
        .unwrap_or_else(|| EMPTY_LIST.to_string());
    writeln!(out, "{raw}")?;
    Ok(())
}

fn find_task<S: KeyValueStore>(app: &App<S>, id: u64) -> anyhow::Result<Task> {
    app.store()
        .get(id)
        .cloned()
        .ok_or_else(|| anyhow!("no task with id {id}"))
}
