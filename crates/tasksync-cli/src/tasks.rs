//! Task subcommands. Each runs one store operation and prints the outcome.

use chrono::{DateTime, Local, Utc};
use color_eyre::Result;
use tasksync_core::{Task, TaskDraft, TaskId};
use tasksync_store::{StoreState, TaskStore};

use crate::cli::TaskFields;

/// Print tasks, refreshing first (and loading `pages` pages) when online.
pub async fn list(store: &TaskStore, refresh: bool, pages: u32) -> Result<()> {
    if store.is_online() {
        store.fetch_tasks(refresh).await;
        for _ in 1..pages {
            if !store.state().has_more {
                break;
            }
            store.load_more_tasks().await;
        }
    }
    print_tasks(&store.state());
    Ok(())
}

pub async fn search(store: &TaskStore, query: &[String]) -> Result<()> {
    let query = query.join(" ");
    if !store.is_online() {
        color_eyre::eyre::bail!("search needs the server; try again when online");
    }
    store.search_tasks(&query).await;
    print_tasks(&store.state());
    Ok(())
}

pub async fn add(store: &TaskStore, fields: TaskFields) -> Result<()> {
    let task = store.add_task(draft(fields)).await?;
    let state = store.state();
    report_error(&state);
    if state.tasks.iter().any(|t| t.id == task.id) {
        println!("Created {}", render_task(&task));
    }
    print_queue_hint(&state, &task.id);
    Ok(())
}

pub async fn edit(store: &TaskStore, id: String, fields: TaskFields) -> Result<()> {
    let id = TaskId::from(id);
    let task = store.update_task(&id, draft(fields)).await?;
    let state = store.state();
    report_error(&state);
    println!("{}", render_task(&task));
    print_queue_hint(&state, &task.id);
    Ok(())
}

pub async fn toggle(store: &TaskStore, id: String) -> Result<()> {
    let id = TaskId::from(id);
    store.toggle_task(&id).await?;
    let state = store.state();
    report_error(&state);
    if let Some(task) = store.task(&id) {
        println!("{}", render_task(&task));
    }
    print_queue_hint(&state, &id);
    Ok(())
}

pub async fn delete(store: &TaskStore, id: String) -> Result<()> {
    let id = TaskId::from(id);
    if store.task(&id).is_none() {
        color_eyre::eyre::bail!("no local task with id {id}; run `tasksync list` first");
    }
    store.delete_task(&id).await;
    let state = store.state();
    report_error(&state);
    if state.tasks.iter().all(|t| t.id != id) {
        println!("Deleted {id}");
    }
    print_queue_hint(&state, &id);
    Ok(())
}

fn draft(fields: TaskFields) -> TaskDraft {
    TaskDraft::new(fields.title, fields.content)
        .with_due_date(fields.due)
        .with_reminder_date(fields.remind)
}

fn report_error(state: &StoreState) {
    if let Some(error) = &state.error {
        eprintln!("warning: {error}");
    }
}

fn print_queue_hint(state: &StoreState, id: &TaskId) {
    if state.pending_queue.iter().any(|a| a.target() == id) {
        println!("    (queued, will sync when the server is reachable)");
    }
}

fn print_tasks(state: &StoreState) {
    report_error(state);
    if state.tasks.is_empty() {
        println!("No tasks yet. Add one with `tasksync add <title> <content>`.");
        return;
    }
    for task in &state.tasks {
        println!("{}", render_task(task));
    }
    if state.has_more && state.is_online {
        println!("... more on the server (use --pages)");
    }
    if !state.pending_queue.is_empty() {
        println!("{} change(s) waiting to sync", state.pending_queue.len());
    }
}

pub fn render_task(task: &Task) -> String {
    let mark = if task.completed { "x" } else { " " };
    let mut out = format!("[{mark}] {}  {}\n    {}", task.id, task.title, task.content);
    if let Some(due) = task.due_date {
        out.push_str(&format!("\n    due: {}", local(due)));
    }
    if let Some(remind) = task.reminder_date {
        out.push_str(&format!("\n    remind: {}", local(remind)));
    }
    if task.id.is_temporary() {
        out.push_str("\n    (not yet on the server)");
    }
    out
}

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
