//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use rubric_common::{Outcome, ScenarioResult};
use rubric_e2e::RunOutcome;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for ScenarioResult {
    fn headers() -> Vec<&'static str> {
        vec!["Group", "Scenario", "Points", "Outcome", "Diagnostic"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.group.clone(),
            self.name.clone(),
            format!("{}/{}", self.earned(), self.points),
            self.outcome.to_string(),
            self.diagnostic.clone().unwrap_or_default(),
        ]
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn outcome_color(outcome: Outcome) -> Color {
    match outcome {
        Outcome::Passed => Color::Green,
        Outcome::Failed => Color::Red,
        Outcome::Errored => Color::Yellow,
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// Print the per-scenario report followed by the summary line
pub fn print_outcome(outcome: &RunOutcome, format: OutputFormat) {
    let report = &outcome.report;
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome).unwrap_or_default());
            return;
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(outcome).unwrap_or_default());
            return;
        }
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(ScenarioResult::headers());
            for result in &report.results {
                let row = result.row();
                let cells: Vec<Cell> = row
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| {
                        let cell = Cell::new(value);
                        if i == 3 {
                            cell.fg(outcome_color(result.outcome))
                        } else {
                            cell
                        }
                    })
                    .collect();
                table.add_row(cells);
            }
            println!("{table}");
        }
        OutputFormat::Plain => {
            for result in &report.results {
                let mark = match result.outcome {
                    Outcome::Passed => "✓".green(),
                    Outcome::Failed => "✗".red(),
                    Outcome::Errored => "!".yellow(),
                };
                println!("{} [{}] {} ({})", mark, result.group, result.name, result.points);
                if let Some(diagnostic) = &result.diagnostic {
                    println!("    {}", diagnostic.dimmed());
                }
            }
        }
    }

    println!();
    for name in &outcome.not_run {
        print_warning(&format!("Not run: {}", name));
    }
    let summary = format!("{} ({:.0}%)", report.summary_line(), report.percentage());
    if report.all_passed() && outcome.not_run.is_empty() {
        print_success(&summary);
    } else {
        println!("{}", summary.bold());
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message.bold());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_row_shows_earned_points() {
        let failed = ScenarioResult::failed("Home", "has a navbar", 2, "Expected a navbar.");
        assert_eq!(
            failed.row(),
            vec!["Home", "has a navbar", "0/2", "failed", "Expected a navbar."]
        );
        let passed = ScenarioResult::passed("Home", "loads", 1);
        assert_eq!(passed.row()[2], "1/1");
        assert_eq!(passed.row()[4], "");
        assert_eq!(ScenarioResult::headers().len(), passed.row().len());
    }
}
