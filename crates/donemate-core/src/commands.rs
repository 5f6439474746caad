use anyhow::anyhow;
use tracing::{debug, info, instrument};

use crate::cli::Command;
use crate::render::Renderer;
use crate::store::KeyValueStore;
use crate::task::{TaskCollection, TaskId};
use crate::tasks::TaskList;

#[instrument(skip(list, renderer, command))]
pub fn dispatch<S: KeyValueStore>(
    list: &mut TaskList<S>,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    debug!(?command, tasks = list.len(), "dispatching command");

    match command {
        Command::Add { description } => cmd_add(list, &description.join(" ")),
        Command::List => renderer.print_tasks(list.tasks()),
        Command::Toggle { task } => cmd_toggle(list, &task),
        Command::Edit { task, description } => cmd_edit(list, &task, &description.join(" ")),
        Command::Delete { task } => cmd_delete(list, &task),
        Command::Clear { yes } => cmd_clear(list, yes),
        Command::Stats => renderer.print_stats(list.stats()),
    }
}

/// Resolves a task reference typed on the command line: a 1-based list
/// position, a full id, or an unambiguous id prefix. A number past the end
/// of the list is tried as an id prefix, since short ids can be all digits.
pub fn resolve_task(tasks: &TaskCollection, reference: &str) -> anyhow::Result<Option<TaskId>> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Ok(None);
    }

    let by_position = reference
        .parse::<usize>()
        .ok()
        .and_then(|position| position.checked_sub(1))
        .and_then(|idx| tasks.as_slice().get(idx));
    if let Some(task) = by_position {
        return Ok(Some(task.id()));
    }

    if let Ok(id) = reference.parse::<TaskId>() {
        return Ok(tasks.contains(id).then_some(id));
    }

    let needle = reference.to_ascii_lowercase();
    let mut matches = tasks
        .iter()
        .map(|task| task.id())
        .filter(|id| id.to_string().starts_with(&needle));

    let Some(first) = matches.next() else {
        return Ok(None);
    };
    if matches.next().is_some() {
        return Err(anyhow!("task reference '{reference}' matches more than one task"));
    }
    Ok(Some(first))
}

fn cmd_add<S: KeyValueStore>(list: &mut TaskList<S>, description: &str) -> anyhow::Result<()> {
    let before = list.len();
    let tasks = list.add(description);
    if tasks.len() == before {
        println!("Nothing to add: the description is empty.");
        return Ok(());
    }

    let position = tasks.len();
    if let Some(task) = tasks.last() {
        info!(id = %task.id(), "added task");
        println!("Added task {position}: {}", task.description());
    }
    Ok(())
}

fn cmd_toggle<S: KeyValueStore>(list: &mut TaskList<S>, reference: &str) -> anyhow::Result<()> {
    let Some(id) = resolve_task(list.tasks(), reference)? else {
        println!("No task matches '{reference}'; nothing changed.");
        return Ok(());
    };

    if let Some(task) = list.toggle(id).get(id) {
        let state = if task.is_packed() { "done" } else { "not done" };
        println!("Marked '{}' {state}.", task.description());
    }
    Ok(())
}

fn cmd_edit<S: KeyValueStore>(
    list: &mut TaskList<S>,
    reference: &str,
    description: &str,
) -> anyhow::Result<()> {
    let Some(id) = resolve_task(list.tasks(), reference)? else {
        println!("No task matches '{reference}'; nothing changed.");
        return Ok(());
    };

    let previous = list.get(id).map(|task| task.description().to_string());
    let tasks = list.edit(id, description);
    match (previous, tasks.get(id)) {
        (Some(old), Some(task)) if old != task.description() => {
            println!("Renamed '{old}' to '{}'.", task.description());
        }
        _ => println!("Nothing changed."),
    }
    Ok(())
}

fn cmd_delete<S: KeyValueStore>(list: &mut TaskList<S>, reference: &str) -> anyhow::Result<()> {
    let Some(id) = resolve_task(list.tasks(), reference)? else {
        println!("No task matches '{reference}'; nothing changed.");
        return Ok(());
    };

    let description = list.get(id).map(|task| task.description().to_string());
    list.delete(id);
    if let Some(description) = description {
        println!("Deleted '{description}'.");
    }
    Ok(())
}

fn cmd_clear<S: KeyValueStore>(list: &mut TaskList<S>, confirmed: bool) -> anyhow::Result<()> {
    if !confirmed {
        return Err(anyhow!(
            "clear removes all {} tasks; re-run with --yes to confirm",
            list.len()
        ));
    }

    let removed = list.len();
    list.clear_all();
    println!("Removed {removed} tasks.");
    Ok(())
}
