//! Interactive board console.
//!
//! Reads one command per line from stdin and drives the sync engine, while
//! the engine's pushed frames and REST completions are processed in the
//! same loop.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use taskboard_core::config::ClientConfig;
use taskboard_core::session::MemorySession;
use taskboard_core::signal::UiSignal;
use taskboard_core::task::{TaskFilter, TaskStatus};
use taskboard_realtime::{Step, SyncEngine, UiCommand};

use crate::output;

#[derive(Args)]
pub struct BoardArgs {
    /// Only show tasks authored by this user
    #[arg(long)]
    pub filter_user: Option<String>,

    /// Only show tasks of this category
    #[arg(long)]
    pub filter_category: Option<String>,

    /// Open the trash board instead of the live board
    #[arg(long)]
    pub trash: bool,
}

/// What a console line asks for.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Engine(UiCommand),
    EditTitle { id: i64, title: String },
    Show,
    Notifications,
    Help,
    Quit,
}

const HELP: &str = "\
Commands:
  show                          redraw the current view
  filter [user=<u>] [category=<c>]  change the board filter
  search [term]                 filter cards by title/description
  move <id> <todo|doing|done>   move a task
  left <id> | right <id>        move a task one column
  title <id> <new title>        rename a task
  delete <id>                   move a task to the trash
  trash | board                 switch between trash and live board
  recycle <id> | purge <id>     restore or permanently delete from the trash
  chat <user> | close           open or close a chat
  say <text>                    send a chat message
  notifications                 list pending notifications
  read <user>                   mark a user's notifications read and open the chat
  quit";

fn parse_id(raw: Option<&str>) -> Result<i64, String> {
    let raw = raw.ok_or("missing task id")?;
    raw.trim_start_matches('#')
        .parse()
        .map_err(|_| format!("not a task id: {raw}"))
}

fn parse_filter(args: &[&str]) -> Result<TaskFilter, String> {
    let mut user = None;
    let mut category = None;
    for arg in args {
        match arg.split_once('=') {
            Some(("user", value)) => user = Some(value),
            Some(("category", value)) => category = Some(value),
            _ => return Err(format!("unknown filter: {arg}")),
        }
    }
    Ok(TaskFilter::new(user, category))
}

/// Parse one console line.
fn parse_line(line: &str) -> Result<Option<Action>, String> {
    let line = line.trim();
    let Some((word, rest)) = line
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .or(Some((line, "")))
        .filter(|(w, _)| !w.is_empty())
    else {
        return Ok(None);
    };
    let mut args = rest.split_whitespace();

    let action = match word.to_lowercase().as_str() {
        "show" | "ls" => Action::Show,
        "help" | "?" => Action::Help,
        "quit" | "exit" | "q" => Action::Quit,
        "filter" => {
            let args: Vec<&str> = args.collect();
            Action::Engine(UiCommand::SetFilter(parse_filter(&args)?))
        }
        "search" => Action::Engine(UiCommand::SetSearch(rest.to_string())),
        "move" => {
            let id = parse_id(args.next())?;
            let raw = args.next().ok_or("missing target column")?;
            let status = TaskStatus::parse(raw).ok_or_else(|| format!("unknown column: {raw}"))?;
            Action::Engine(UiCommand::MoveTask { id, status })
        }
        "left" => Action::Engine(UiCommand::StepTask {
            id: parse_id(args.next())?,
            step: Step::Left,
        }),
        "right" => Action::Engine(UiCommand::StepTask {
            id: parse_id(args.next())?,
            step: Step::Right,
        }),
        "title" => {
            let id = parse_id(args.next())?;
            let title = rest
                .split_once(char::is_whitespace)
                .map(|(_, t)| t.trim())
                .filter(|t| !t.is_empty())
                .ok_or("missing title")?;
            Action::EditTitle {
                id,
                title: title.to_string(),
            }
        }
        "delete" | "rm" => Action::Engine(UiCommand::DeleteTask(parse_id(args.next())?)),
        "trash" => Action::Engine(UiCommand::MountTrash),
        "board" => Action::Engine(UiCommand::UnmountTrash),
        "recycle" => Action::Engine(UiCommand::RecycleTask(parse_id(args.next())?)),
        "purge" => Action::Engine(UiCommand::PurgeTask(parse_id(args.next())?)),
        "chat" => Action::Engine(UiCommand::OpenChat(
            args.next().ok_or("missing username")?.to_string(),
        )),
        "close" => Action::Engine(UiCommand::CloseChat),
        "say" => Action::Engine(UiCommand::SendMessage(rest.to_string())),
        "notifications" | "n" => Action::Notifications,
        "read" => Action::Engine(UiCommand::OpenNotifications(
            args.next().ok_or("missing username")?.to_string(),
        )),
        other => return Err(format!("unknown command: {other} (try 'help')")),
    };
    Ok(Some(action))
}

fn render(engine: &SyncEngine) {
    match (engine.trash(), engine.board()) {
        (Some(trash), _) => output::print_trash(trash),
        (None, Some(board)) => output::print_board(board),
        (None, None) => {}
    }
}

fn apply(engine: &mut SyncEngine, action: Action) -> taskboard_core::SyncResult<bool> {
    match action {
        Action::Engine(command) => {
            let remount_board =
                matches!(command, UiCommand::UnmountTrash) && engine.board().is_none();
            engine.execute(command)?;
            if remount_board {
                engine.execute(UiCommand::MountBoard(TaskFilter::default()))?;
            }
        }
        Action::EditTitle { id, title } => {
            let mut task = engine
                .board()
                .and_then(|b| b.get(id))
                .cloned()
                .ok_or(taskboard_core::SyncError::TaskNotFound(id))?;
            task.title = title;
            engine.execute(UiCommand::EditTask(task))?;
        }
        Action::Show => {
            render(engine);
            if let Some(chat) = engine.chat() {
                output::print_chat(chat, 10);
            }
        }
        Action::Notifications => output::print_notifications(engine.notifications()),
        Action::Help => println!("{HELP}"),
        Action::Quit => return Ok(false),
    }
    Ok(true)
}

fn on_signal(engine: &SyncEngine, signal: &UiSignal) {
    if output::print_signal(signal) {
        return;
    }
    match signal {
        UiSignal::BoardChanged if engine.trash().is_none() => render(engine),
        UiSignal::TrashChanged if engine.trash().is_some() => render(engine),
        UiSignal::ChatChanged => {
            if let Some(chat) = engine.chat() {
                output::print_chat(chat, 5);
            }
        }
        UiSignal::NotificationsChanged { total } if *total > 0 => {
            println!("{} {} pending notification(s)", "●".cyan(), total);
        }
        _ => {}
    }
}

pub async fn execute(
    args: BoardArgs,
    config: &ClientConfig,
    session: Arc<MemorySession>,
) -> Result<()> {
    let (mut engine, mut signals) = super::connect(config, session)?;
    engine.start()?;
    let filter = TaskFilter::new(args.filter_user.as_deref(), args.filter_category.as_deref());
    engine.execute(UiCommand::MountBoard(filter))?;
    if args.trash {
        engine.execute(UiCommand::MountTrash)?;
    }
    println!("{}", "Type 'help' for commands.".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut notice = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(action)) => {
                        debug!(?action, "Console action");
                        match apply(&mut engine, action) {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => {
                                warn!(error = %e, "Command failed");
                                println!("{} {}", "✗".red().bold(), e.to_string().red());
                            }
                        }
                    }
                    Err(e) => println!("{} {}", "?".yellow().bold(), e),
                }
            }
            alive = engine.process_next() => {
                if !alive {
                    // Drain what the engine emitted while terminating.
                    while let Ok(signal) = signals.try_recv() {
                        match signal {
                            UiSignal::SessionTerminated { notice: text } => notice = Some(text),
                            other => on_signal(&engine, &other),
                        }
                    }
                    break;
                }
            }
            Some(signal) = signals.recv() => on_signal(&engine, &signal),
        }
    }

    engine.shutdown();
    if let Some(notice) = notice {
        super::acknowledge_logout(notice).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Action {
        parse_line(line).unwrap().unwrap()
    }

    #[test]
    fn test_parse_moves() {
        assert_eq!(
            parse("move #42 doing"),
            Action::Engine(UiCommand::MoveTask {
                id: 42,
                status: TaskStatus::Doing
            })
        );
        assert_eq!(
            parse("left 7"),
            Action::Engine(UiCommand::StepTask {
                id: 7,
                step: Step::Left
            })
        );
        assert!(parse_line("move 42 sideways").is_err());
        assert!(parse_line("move abc todo").is_err());
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse("filter user=alice category=work"),
            Action::Engine(UiCommand::SetFilter(TaskFilter::new(Some("alice"), Some("work"))))
        );
        assert_eq!(
            parse("filter"),
            Action::Engine(UiCommand::SetFilter(TaskFilter::default()))
        );
        assert!(parse_line("filter owner=bob").is_err());
    }

    #[test]
    fn test_parse_free_text() {
        assert_eq!(
            parse("say  hello there "),
            Action::Engine(UiCommand::SendMessage("hello there".into()))
        );
        assert_eq!(
            parse("title 3 Fix the login page"),
            Action::EditTitle {
                id: 3,
                title: "Fix the login page".into()
            }
        );
        assert!(parse_line("title 3").is_err());
    }

    #[test]
    fn test_blank_and_unknown_lines() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(parse_line("frobnicate").is_err());
        assert_eq!(parse("Q"), Action::Quit);
    }
}
