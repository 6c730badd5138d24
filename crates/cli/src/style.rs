//! Terminal styling for `git af` output.

use console::Style;

use gitaflow_core::MergeType;

/// Bold section header.
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

/// Dimmed text for hints.
pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Red cross prefix for internal failures printed on stderr.
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Merge type label: FIX red, DEV yellow, EUF green.
pub fn merge_type(t: MergeType) -> String {
    let style = match t {
        MergeType::Fix => Style::new().red().bold(),
        MergeType::Dev => Style::new().yellow(),
        MergeType::Euf => Style::new().green(),
    };
    style.apply_to(t.as_str()).to_string()
}
