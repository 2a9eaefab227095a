use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().title.clone()));
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(theme().label.clone()), value);
}

pub fn success(text: &str) {
    println!("{} {}", Icons::CHECK, text.style(theme().ok.clone()));
}

/// Warnings go to stderr so `schema --format json` output stays parseable.
pub fn warn(text: &str) {
    eprintln!("{} {}", Icons::WARN, text.style(theme().warning.clone()));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", Icons::INFO.style(theme().accent.clone()), label.style(theme().label.clone()), value);
}

/// Title line for one table.
pub fn section(table: &str) {
    println!();
    println!("{} {}", Icons::TABLE, table.style(theme().title.clone()));
}

pub fn dim(text: &str) -> String {
    text.style(theme().label.clone()).to_string()
}

/// SQL statements and other secondary text.
pub fn muted(text: &str) -> String {
    text.style(theme().sql.clone()).to_string()
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().label.clone()), value);
}
