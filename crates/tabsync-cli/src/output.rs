//! Terminal output formatting.

use colored::{ColoredString, Colorize};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use tabsync_core::issue::model::{BatchedUpdateNotification, PendingIssueEvent};
use tabsync_core::stream::model::ConnectionState;
use tabsync_core::{Role, SessionNotification, TabSyncConfig};
use tabsync_host::TabNotification;

const TITLE_WIDTH: usize = 40;

pub fn print_banner(config: &TabSyncConfig, tabs: usize, relay: bool) {
    println!();
    println!("  {} {}", "tabsync".cyan().bold(), "watch".bold());
    println!();
    println!("  {}     {}", "Stream".green(), config.stream.url);
    println!("  {}       {}", "Tabs".green(), tabs);
    println!(
        "  {}      {}",
        "Relay".green(),
        if relay {
            config.relay.channel_name.normal()
        } else {
            "disabled".yellow()
        }
    );
    println!("  {}  {}", "Lease key".green(), config.leader.lease_key);
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();
}

pub fn print_closing(tabs: usize) {
    println!();
    println!("  {}", format!("Closing {tabs} tab(s)...").dimmed());
}

/// One line per notification. Raw events only when verbose.
pub fn print_notification(note: &TabNotification, verbose: bool) {
    let tab = format!("{:<8}", note.tab_id).bold();
    match &note.notification {
        SessionNotification::RoleChanged(role) => {
            println!("{} {:<10} {}", tab, "role", role_colored(*role));
        }
        SessionNotification::StateChanged(state) => {
            println!("{} {:<10} {}", tab, "state", state_colored(*state));
        }
        SessionNotification::Batch(batch) => print_batch(&tab, batch),
        SessionNotification::Deleted(event) => {
            println!("{} {:<10} {}", tab, "deleted".red(), describe(event));
        }
        SessionNotification::Event(event) if verbose => {
            println!(
                "{} {:<10} {} {}",
                tab,
                "event".dimmed(),
                event.event_type.as_str().dimmed(),
                describe(event)
            );
        }
        SessionNotification::Event(_) => {}
        SessionNotification::DisconnectWarning(d) => {
            println!(
                "{} {:<10} {}",
                tab,
                "warning".yellow(),
                format!("disconnected for {}s", d.as_secs()).yellow()
            );
        }
        SessionNotification::MirroringUnavailable => {
            println!(
                "{} {:<10} {}",
                tab,
                "warning".yellow(),
                "following without a relay, updates will not appear here".yellow()
            );
        }
    }
}

fn print_batch(tab: &ColoredString, batch: &BatchedUpdateNotification) {
    let kinds: Vec<&str> = batch.event_types.iter().map(|t| t.as_str()).collect();
    println!(
        "{} {:<10} {} issue(s) [{}]",
        tab,
        "batch".cyan(),
        batch.len(),
        kinds.join(", ")
    );
    for event in &batch.events {
        println!("{:<19} {}", "", describe(event));
    }
}

fn describe(event: &PendingIssueEvent) -> String {
    let issue = &event.issue;
    let mut line = issue.id.clone();
    if let Some(title) = &issue.title {
        line.push(' ');
        line.push_str(&truncate_visual(title, TITLE_WIDTH));
    }
    if let Some(status) = &issue.status {
        line.push_str(&format!(" ({status})"));
    }
    line
}

fn role_colored(role: Role) -> ColoredString {
    match role {
        Role::Leader => "leader".green().bold(),
        Role::Follower => "follower".blue(),
    }
}

fn state_colored(state: ConnectionState) -> ColoredString {
    let label = state.as_str();
    match state {
        ConnectionState::Open => label.green(),
        ConnectionState::Connecting | ConnectionState::Idle => label.cyan(),
        ConnectionState::Waiting => label.yellow(),
        ConnectionState::Error | ConnectionState::Unsupported => label.red(),
        ConnectionState::Stopped => label.dimmed(),
    }
}

/// Truncate to a display width, ending in an ellipsis.
fn truncate_visual(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width > max_width.saturating_sub(1) {
            break;
        }
        result.push(ch);
        width += ch_width;
    }
    result.push('…');
    result
}
