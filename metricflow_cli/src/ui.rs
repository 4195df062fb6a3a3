// Human-readable console output. JSON output never goes through here.
use colored::Colorize;
use std::fmt::Display;

#[derive(Debug, Clone, Copy)]
pub enum Tone {
    Ok,
    Warn,
    Fail,
    Note,
}

pub fn banner(title: &str) {
    println!("\n{} {}", "metricflow".dimmed(), title.bold().cyan());
    println!("{}", "─".repeat(title.len() + 11).cyan());
}

pub fn status(tone: Tone, text: &str) {
    match tone {
        Tone::Ok => println!("{} {}", "✓".green().bold(), text.green()),
        Tone::Warn => println!("{} {}", "!".yellow().bold(), text.yellow()),
        Tone::Fail => println!("{} {}", "✗".red().bold(), text.red()),
        Tone::Note => println!("{} {}", "·".blue().bold(), text),
    }
}

pub fn field(label: &str, value: impl Display) {
    println!("  {}: {}", label, value);
}
