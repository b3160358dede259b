//! Terminal output formatting.

use colored::{ColoredString, Colorize};
use taskboard_core::chat::{ChatView, Side};
use taskboard_core::notification::NotificationMap;
use taskboard_core::signal::{ToastLevel, UiSignal};
use taskboard_core::statistics::DashboardStatistics;
use taskboard_core::task::{DeletedBoard, Task, TaskBoard, TaskStatus};
use unicode_width::UnicodeWidthStr;

/// Get terminal width, defaulting to 80.
fn term_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}

/// Pad a plain string to a given visual width (right-padded).
fn pad_right(s: &str, width: usize) -> String {
    let visual = UnicodeWidthStr::width(s);
    if visual >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - visual))
    }
}

/// Truncate a string respecting visual width.
fn truncate_visual(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width <= 3 {
        return ".".repeat(max_width);
    }
    let mut result = String::new();
    let mut current_width = 0;
    for ch in s.chars() {
        let ch_width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if current_width + ch_width > max_width - 2 {
            break;
        }
        result.push(ch);
        current_width += ch_width;
    }
    result.push_str("..");
    result
}

fn priority_indicator(priority: i32) -> ColoredString {
    match priority {
        3 => "! ".red().bold(),
        2 => "· ".yellow(),
        _ => "  ".normal(),
    }
}

fn column_header(status: TaskStatus, count: usize) -> ColoredString {
    let label = format!("{} {}", status.as_str(), count);
    match status {
        TaskStatus::Todo => label.blue().bold(),
        TaskStatus::Doing => label.yellow().bold(),
        TaskStatus::Done => label.green().bold(),
    }
}

/// One board cell: priority marker, id and title, padded to `width`.
fn task_cell(task: &Task, status: TaskStatus, width: usize) -> String {
    let id = format!("#{} ", task.id);
    let title_width = width.saturating_sub(2 + UnicodeWidthStr::width(id.as_str())).max(1);
    let title = pad_right(&truncate_visual(&task.title, title_width), title_width);
    let title = match status {
        TaskStatus::Doing => title.yellow(),
        TaskStatus::Done => title.green().dimmed(),
        TaskStatus::Todo => title.normal(),
    };
    format!("{}{}{}", priority_indicator(task.priority), id.dimmed(), title)
}

fn border(left: &str, mid: &str, right: &str, cols: usize, width: usize) {
    print!("{}", left.dimmed());
    for i in 0..cols {
        print!("{}", "─".repeat(width).dimmed());
        if i < cols - 1 {
            print!("{}", mid.dimmed());
        }
    }
    println!("{}", right.dimmed());
}

/// Print the live Kanban board.
pub fn print_board(board: &TaskBoard) {
    if !board.is_loaded() {
        println!("{}", "Loading tasks...".dimmed());
        return;
    }
    let filter = board.filter();
    let mut scope = Vec::new();
    if let Some(user) = &filter.username {
        scope.push(format!("user={user}"));
    }
    if let Some(category) = &filter.category {
        scope.push(format!("category={category}"));
    }
    if !board.search().is_empty() {
        scope.push(format!("search={}", board.search()));
    }
    if !scope.is_empty() {
        println!("{} {}", "Showing".dimmed(), scope.join(" ").cyan());
    }

    let width = term_width();
    if width < 60 {
        print_board_compact(board);
    } else {
        print_board_wide(board, width);
    }
}

/// Columns side by side.
fn print_board_wide(board: &TaskBoard, term_w: usize) {
    let cols = TaskStatus::ALL.len();
    let col_width = (term_w.saturating_sub(cols + 1) / cols).clamp(16, 40);
    let columns: Vec<Vec<&Task>> = TaskStatus::ALL.iter().map(|s| board.column(*s)).collect();
    let counts = board.counts();

    border("┌", "┬", "┐", cols, col_width);
    print!("{}", "│".dimmed());
    for (i, status) in TaskStatus::ALL.iter().enumerate() {
        let count = counts.get(*status);
        let plain = format!("{} {}", status.as_str(), count);
        let padding = col_width.saturating_sub(UnicodeWidthStr::width(plain.as_str()));
        let left = padding / 2;
        print!(
            "{}{}{}",
            " ".repeat(left),
            column_header(*status, count),
            " ".repeat(padding - left)
        );
        if i < cols - 1 {
            print!("{}", "│".dimmed());
        }
    }
    println!("{}", "│".dimmed());
    border("├", "┼", "┤", cols, col_width);

    let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
    for row in 0..rows {
        print!("{}", "│".dimmed());
        for (ci, (status, column)) in TaskStatus::ALL.iter().zip(&columns).enumerate() {
            match column.get(row) {
                Some(task) => print!("{}", task_cell(task, *status, col_width)),
                None => print!("{}", " ".repeat(col_width)),
            }
            if ci < cols - 1 {
                print!("{}", "│".dimmed());
            }
        }
        println!("{}", "│".dimmed());
    }
    border("└", "┴", "┘", cols, col_width);

    let total = counts.todo + counts.doing + counts.done;
    if total > 0 {
        println!(
            " {} {} tasks {} {} done ({}%)",
            "■".cyan(),
            total.to_string().bold(),
            "·".dimmed(),
            counts.done.to_string().green(),
            counts.done * 100 / total
        );
    }
}

/// Vertical layout for narrow terminals.
fn print_board_compact(board: &TaskBoard) {
    println!("{}", " TASK BOARD ".on_blue().white().bold());
    println!();
    for status in TaskStatus::ALL {
        let column = board.column(status);
        println!(" {} {}", "▸".dimmed(), column_header(status, column.len()));
        for task in column {
            println!(
                "   {}{} {}",
                priority_indicator(task.priority),
                task.title,
                format!("#{}", task.id).dimmed()
            );
        }
        println!();
    }
}

/// Print the trash board.
pub fn print_trash(trash: &DeletedBoard) {
    if !trash.is_loaded() {
        println!("{}", "Loading deleted tasks...".dimmed());
        return;
    }
    let tasks: Vec<&Task> = trash.visible().collect();
    if tasks.is_empty() {
        println!("{}", "Trash is empty.".dimmed());
        return;
    }

    println!("{}", "Trash".bold());
    println!("{:<8} {:<32} {:<8} {:<16}", "ID", "Title", "Status", "Author");
    println!("{}", "─".repeat(66));
    for task in tasks {
        println!(
            "{:<8} {:<32} {:<8} {:<16}",
            task.id,
            truncate_visual(&task.title, 30),
            task.status.as_str(),
            task.username_author.dimmed()
        );
    }
}

/// Print the most recent `last` messages of an open chat.
pub fn print_chat(chat: &ChatView, last: usize) {
    println!(
        "{} {}",
        "Chat with".bold(),
        chat.counterpart().cyan().bold()
    );
    let entries = chat.entries();
    let skip = entries.len().saturating_sub(last);
    for entry in &entries[skip..] {
        let time = entry.message.sent_at.get(11..16).unwrap_or("");
        match entry.side {
            Side::Left => println!(
                "  {} {} {}",
                time.dimmed(),
                format!("{}:", entry.message.sender_username).cyan(),
                entry.message.content
            ),
            Side::Right => {
                let tick = if entry.message.read { "✓✓".green() } else { "✓".dimmed() };
                println!(
                    "  {} {} {} {}",
                    time.dimmed(),
                    "me:".bold(),
                    entry.message.content,
                    tick
                );
            }
        }
    }
}

/// Print pending notifications grouped by counterpart.
pub fn print_notifications(map: &NotificationMap) {
    let summary = map.summary();
    if summary.is_empty() {
        println!("{}", "No pending notifications.".dimmed());
        return;
    }
    println!("{} ({})", "Notifications".bold(), map.total());
    for (who, count, latest) in summary {
        let when = latest
            .and_then(|n| n.sent_at.as_deref())
            .unwrap_or_default();
        println!(
            "  {} {:<20} {} {}",
            "●".cyan(),
            who.bold(),
            format!("{count} new").yellow(),
            when.dimmed()
        );
    }
}

/// Print the statistics dashboard.
pub fn print_dashboard(stats: &DashboardStatistics) {
    let users = &stats.users;
    println!("{}", "Users".bold());
    println!(
        "  total {}  confirmed {}  unconfirmed {}  avg tasks/user {:.1}",
        users.total_users.to_string().bold(),
        users.confirmed_users.to_string().green(),
        users.unconfirmed_users.to_string().yellow(),
        users.average_tasks_per_user
    );

    let tasks = &stats.tasks;
    println!("{}", "Tasks".bold());
    println!(
        "  {} {}  {} {}  {} {}  avg completion {:.1} days",
        "TO DO".blue(),
        tasks.number_of_todo,
        "DOING".yellow(),
        tasks.number_of_doing,
        "DONE".green(),
        tasks.number_of_done,
        tasks.average_completion_time
    );

    if !stats.categories.is_empty() {
        println!("{}", "Categories".bold());
        let max = stats.categories.iter().map(|c| c.task_count).max().unwrap_or(0).max(1);
        for category in &stats.categories {
            let bar = (category.task_count.max(0) * 30 / max) as usize;
            println!(
                "  {:<16} {} {}",
                truncate_visual(&category.category_type, 16),
                "█".repeat(bar).cyan(),
                category.task_count
            );
        }
    }
}

/// Print a toast or connection signal. Returns false for signals that only
/// ask for a re-render.
pub fn print_signal(signal: &UiSignal) -> bool {
    match signal {
        UiSignal::Toast {
            level: ToastLevel::Success,
            message,
        } => println!("{} {}", "✓".green().bold(), message),
        UiSignal::Toast {
            level: ToastLevel::Error,
            message,
        } => println!("{} {}", "✗".red().bold(), message.red()),
        UiSignal::ChannelClosed { channel } => println!(
            "{} {} channel closed",
            "⚠".yellow().bold(),
            channel.to_string().yellow()
        ),
        UiSignal::CloseChat => println!("{}", "Chat closed.".dimmed()),
        _ => return false,
    }
    true
}
