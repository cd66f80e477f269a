//! UI utilities for the CLI

use colored::*;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, size},
};
use std::io::{self, IsTerminal, Write};

use docrag_core::{RAGEngine, RAGQuery, Result};

use crate::output;

const PROMPT: &str = "docrag>";

/// Display startup banner
pub fn display_banner(collection: &str) {
    let terminal_width = size().map(|(w, _)| w as usize).unwrap_or(80);
    let banner_width = std::cmp::min(60, terminal_width.saturating_sub(4)).max(30);

    let top_border = format!("┌{}┐", "─".repeat(banner_width - 2));
    let bottom_border = format!("└{}┘", "─".repeat(banner_width - 2));
    let empty_line = format!("│{}│", " ".repeat(banner_width - 2));

    println!();
    println!("{}", top_border.blue());
    println!("{}", empty_line.blue());

    let lines = [
        "docrag search shell".to_string(),
        String::new(),
        format!("Collection: {}", collection),
        "Up/Down: history, Esc: clear, 'help' for commands".to_string(),
    ];

    for line in lines {
        if line.is_empty() {
            println!("{}", empty_line.blue());
            continue;
        }
        let pad = (banner_width - 4).saturating_sub(line.chars().count());
        println!("{}", format!("│  {}{}│", line, " ".repeat(pad)).blue());
    }

    println!("{}", empty_line.blue());
    println!("{}", bottom_border.blue());
    println!();
}

/// Display help message
pub fn print_help() {
    println!("{}", "Available commands:".bold());
    println!("  {} - Search the collection", "<query>".green());
    println!("  {} - Set the number of results", ":k <n>".green());
    println!("  {} - Toggle printing the prompt context", ":context".green());
    println!("  {} - Show this help message", "help".green());
    println!("  {} - Exit the shell", "exit/quit".green());
}

/// A line entered in the search shell
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Search(String),
    SetTopK(usize),
    ToggleContext,
    Help,
    Exit,
    Empty,
    Invalid(String),
}

impl ShellCommand {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input {
            "" => ShellCommand::Empty,
            "exit" | "quit" | ":q" => ShellCommand::Exit,
            "help" | ":help" | "?" => ShellCommand::Help,
            ":context" => ShellCommand::ToggleContext,
            _ => {
                if let Some(rest) = input.strip_prefix(":k") {
                    return match rest.trim().parse::<usize>() {
                        Ok(k) if k > 0 => ShellCommand::SetTopK(k),
                        _ => ShellCommand::Invalid(format!(
                            "':k' expects a positive number, got '{}'",
                            rest.trim()
                        )),
                    };
                }
                if input.starts_with(':') {
                    return ShellCommand::Invalid(format!("Unknown command '{}'", input));
                }
                ShellCommand::Search(input.to_string())
            }
        }
    }
}

/// Restores cooked mode when the line editor exits, including on error
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn redraw(input: &[char]) -> Result<()> {
    let line: String = input.iter().collect();
    print!("\r\x1b[2K{} {}", PROMPT.green().bold(), line);
    io::stdout().flush()?;
    Ok(())
}

/// Handle input with command history navigation.
///
/// Returns `None` at end of input (EOF on a pipe, Ctrl+C or Ctrl+D).
pub async fn handle_input_with_history(history: &mut Vec<String>) -> Result<Option<String>> {
    if !io::stdin().is_terminal() {
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        let input = input.trim().to_string();
        if !input.is_empty() {
            history.push(input.clone());
        }
        return Ok(Some(input));
    }

    let guard = RawModeGuard::enable()?;
    let mut input: Vec<char> = Vec::new();
    let mut history_index: Option<usize> = None;

    redraw(&input)?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }

        match key_event.code {
            KeyCode::Enter => {
                drop(guard);
                println!();
                let line: String = input.iter().collect();
                if !line.trim().is_empty() {
                    history.push(line.clone());
                }
                return Ok(Some(line));
            }
            KeyCode::Char('c' | 'd') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
                drop(guard);
                println!();
                return Ok(None);
            }
            KeyCode::Char(c) => {
                input.push(c);
                redraw(&input)?;
            }
            KeyCode::Backspace => {
                if input.pop().is_some() {
                    redraw(&input)?;
                }
            }
            KeyCode::Up => {
                if !history.is_empty() {
                    let new_index = match history_index {
                        None => history.len() - 1,
                        Some(idx) if idx > 0 => idx - 1,
                        Some(idx) => idx,
                    };
                    history_index = Some(new_index);
                    input = history[new_index].chars().collect();
                    redraw(&input)?;
                }
            }
            KeyCode::Down => {
                if let Some(idx) = history_index {
                    if idx + 1 < history.len() {
                        history_index = Some(idx + 1);
                        input = history[idx + 1].chars().collect();
                    } else {
                        history_index = None;
                        input.clear();
                    }
                    redraw(&input)?;
                }
            }
            KeyCode::Esc => {
                input.clear();
                history_index = None;
                redraw(&input)?;
            }
            _ => {}
        }
    }
}

/// Interactive search loop over one collection
pub async fn run_shell(
    engine: &dyn RAGEngine,
    collection: &str,
    top_k: usize,
    score_threshold: Option<f32>,
) -> Result<()> {
    display_banner(collection);

    let mut history = Vec::new();
    let mut top_k = top_k;
    let mut show_context = false;

    while let Some(line) = handle_input_with_history(&mut history).await? {
        match ShellCommand::parse(&line) {
            ShellCommand::Empty => {}
            ShellCommand::Exit => break,
            ShellCommand::Help => print_help(),
            ShellCommand::ToggleContext => {
                show_context = !show_context;
                println!(
                    "{} Context output {}",
                    "ℹ️".blue(),
                    if show_context { "on" } else { "off" }
                );
            }
            ShellCommand::SetTopK(k) => {
                top_k = k;
                println!("{} Returning top {} results", "ℹ️".blue(), k);
            }
            ShellCommand::Invalid(message) => println!("{} {}", "❌".red(), message),
            ShellCommand::Search(query) => {
                let rag_query = RAGQuery {
                    top_k,
                    score_threshold,
                    ..RAGQuery::new(collection, query.as_str())
                };
                match engine.retrieve(&rag_query).await {
                    Ok(result) => {
                        print!("{}", output::format_search_results(&query, &result.documents));
                        if show_context && !result.context.is_empty() {
                            println!("{}", "Context:".bold());
                            println!("{}\n", result.context.dimmed());
                        }
                    }
                    Err(e) => println!("{} {}", "❌".red(), e),
                }
            }
        }
    }

    println!("{}", "Bye!".dimmed());
    Ok(())
}
