//! Colored output helpers for CLI
//!
//! Progress goes to stderr so the final report on stdout can be piped.

use crate::research::{Bibliography, ResearchEvent, WorkerStatus};
use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    pub fn banner(&self) {
        if self.colored {
            eprintln!(
                "\n  {} {}\n",
                "sleuth".bright_cyan().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
            );
        } else {
            eprintln!("\n  sleuth v{}\n", env!("CARGO_PKG_VERSION"));
        }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✓".green().bold(), message.green());
        } else {
            eprintln!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "•".blue(), message);
        } else {
            eprintln!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            eprintln!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a file creation message
    pub fn created(&self, file_type: &str, path: &str) {
        if self.colored {
            eprintln!(
                "  {} {} {}",
                "✓".green().bold(),
                file_type.dimmed(),
                path.bright_white()
            );
        } else {
            eprintln!("  [CREATED] {} {}", file_type, path);
        }
    }

    /// Print a file skipped message
    pub fn skipped(&self, path: &str, reason: &str) {
        if self.colored {
            eprintln!(
                "  {} {} {}",
                "○".yellow(),
                path.dimmed(),
                format!("({})", reason).yellow()
            );
        } else {
            eprintln!("  [SKIPPED] {} ({})", path, reason);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            eprintln!("\n  {}", title.bright_white().bold().underline());
        } else {
            eprintln!("\n  === {} ===", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            eprintln!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            eprintln!("    {}: {}", key, value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if self.colored {
            eprintln!("    {} {}", "•".blue(), item);
        } else {
            eprintln!("    - {}", item);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            eprintln!("\n  {} {}", "💡".dimmed(), message.dimmed().italic());
        } else {
            eprintln!("\n  [TIP] {}", message);
        }
    }

    /// Print a command suggestion
    pub fn command(&self, cmd: &str) {
        if self.colored {
            eprintln!("     {}", format!("$ {}", cmd).bright_cyan());
        } else {
            eprintln!("     $ {}", cmd);
        }
    }

    /// Print completion message with next steps
    pub fn complete(&self, message: &str) {
        if self.colored {
            eprintln!("\n  {} {}", "🚀".green(), message.bright_green().bold());
        } else {
            eprintln!("\n  [DONE] {}", message);
        }
    }

    /// Render one progress event. Terminal events are rendered by the caller.
    pub fn event(&self, event: &ResearchEvent) {
        let Some(line) = progress_line(event) else {
            return;
        };
        match event {
            ResearchEvent::SubagentCompleted { status, .. } if *status != WorkerStatus::Ok => {
                self.warning(&line)
            }
            ResearchEvent::WebSearchResults { error: Some(_), .. } => self.warning(&line),
            ResearchEvent::LeadThinking { .. } => {
                if self.colored {
                    eprintln!("  {} {}", "…".dimmed(), line.dimmed().italic());
                } else {
                    eprintln!("  [THINKING] {}", line);
                }
            }
            _ => self.info(&line),
        }
    }

    /// Print the final report and its bibliography to stdout.
    pub fn report(&self, text: &str, bibliography: &Bibliography) {
        println!("{}", text);
        if bibliography.is_empty() {
            return;
        }
        println!("\n## Sources\n");
        for entry in &bibliography.entries {
            println!("[{}] {} - {}", entry.ordinal, entry.title, entry.url);
        }
    }
}

/// One-line description of a progress event.
pub fn progress_line(event: &ResearchEvent) -> Option<String> {
    let line = match event {
        ResearchEvent::RunCreated { run_id, .. } => format!("Research run {} started", run_id),
        ResearchEvent::LeadThinking { text, .. } => {
            let first = text.lines().find(|l| !l.trim().is_empty())?;
            first.trim().to_string()
        }
        ResearchEvent::LeadAnswer { subtasks, .. } => {
            let mut line = format!("Plan ready: {} sub-task(s)", subtasks.len());
            for task in subtasks {
                line.push_str(&format!("\n      {} {}", task.id, task.instructions));
            }
            line
        }
        ResearchEvent::WebSearchQuery { task_id, query, .. } => {
            format!("{} searching: {}", task_id, query)
        }
        ResearchEvent::WebSearchResults {
            task_id,
            results,
            error,
            ..
        } => match error {
            Some(e) => format!("{} search failed: {}", task_id, e),
            None => format!("{} got {} result(s)", task_id, results.len()),
        },
        ResearchEvent::SubagentCompleted {
            task_id,
            status,
            sources,
            truncated,
        } => {
            let mut line = format!("{} finished ({}, {} source(s))", task_id, status, sources);
            if *truncated {
                line.push_str(", tool budget exhausted");
            }
            line
        }
        ResearchEvent::FinalReport { .. } | ResearchEvent::Error { .. } => return None,
    };
    Some(line)
}
