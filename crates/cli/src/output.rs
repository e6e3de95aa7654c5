//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

use loadtest_lib::models::AgentState;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color an agent state based on its value
pub fn color_state(state: AgentState) -> String {
    let text = state.to_string();
    match state {
        AgentState::Running => text.green().to_string(),
        AgentState::Created => text.blue().to_string(),
        AgentState::Stopped => text.yellow().to_string(),
        AgentState::Failed => text.red().to_string(),
    }
}
