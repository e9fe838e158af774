// src/utils/log.rs

//! Console helpers for run banners, steps and summaries.
//!
//! Everything goes through the `log` facade at info level, so the binary's
//! logger decides formatting and filtering.

const WIDTH: usize = 60;

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(WIDTH);
    ::log::info!("{}", border);
    ::log::info!("  {}", title);
    ::log::info!("{}", border);
}

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    ::log::info!("{}", format_step(step_num, total, message));
}

/// Log a sub-item (indented), `last` closes the branch.
pub fn sub_item(last: bool, message: &str) {
    ::log::info!("{}", format_sub_item(last, message));
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    for line in format_summary(title, items) {
        ::log::info!("{}", line);
    }
}

fn format_step(step_num: usize, total: usize, message: &str) -> String {
    format!("[STEP {}/{}] {}", step_num, total, message)
}

fn format_sub_item(last: bool, message: &str) -> String {
    let branch = if last { "└─" } else { "├─" };
    format!("    {} {}", branch, message)
}

fn format_summary(title: &str, items: &[(&str, String)]) -> Vec<String> {
    let key_width = items.iter().map(|(key, _)| key.len()).max().unwrap_or(0);

    let mut lines = Vec::with_capacity(items.len() + 1);
    lines.push(format!("[SUMMARY] {}", title));
    for (key, value) in items {
        lines.push(format!("    {:<width$} : {}", key, value, width = key_width));
    }
    lines
}
