use colored::*;
use std::io::{self, BufRead, Write};

use crate::core::Resolution;
use crate::oracle::PromptRequest;

/// Console handles terminal prompts and output with colored formatting
pub struct Console {
    prompt_color: Color,
    granted_color: Color,
    denied_color: Color,
}

impl Console {
    /// Create a new Console with default colors
    pub fn new() -> Self {
        Self {
            prompt_color: Color::Cyan,
            granted_color: Color::Green,
            denied_color: Color::Red,
        }
    }

    /// Print a welcome banner
    pub fn print_banner(&self) {
        println!("{}", "=".repeat(60).bright_blue());
        println!("{}", "  Permission Broker".bright_blue().bold());
        println!("{}", "=".repeat(60).bright_blue());
        println!();
    }

    /// Print a status message
    pub fn print_system(&self, message: &str) {
        println!("{} {}", "System:".yellow().bold(), message);
    }

    /// Print an error message
    pub fn print_error(&self, error: &str) {
        eprintln!("{} {}", "Error:".red().bold(), error);
    }

    /// Ask the user to allow a host permission prompt
    ///
    /// Returns true for `y`/`yes`. EOF counts as a refusal.
    pub fn ask_permissions(&self, prompt: &PromptRequest) -> io::Result<bool> {
        let stdin = io::stdin();
        self.ask_permissions_from(prompt, &mut stdin.lock())
    }

    /// Same as `ask_permissions`, reading the answer from `input`
    pub fn ask_permissions_from(&self, prompt: &PromptRequest, input: &mut impl BufRead) -> io::Result<bool> {
        let context = prompt.context.label.as_deref().unwrap_or(&prompt.context.id);
        println!(
            "{} {} wants:",
            "Permission".color(self.prompt_color).bold(),
            context.bold()
        );
        for permission in &prompt.permissions {
            println!("  {} {}", "•".color(self.prompt_color), permission);
        }
        print!("{} ", "Allow? [y/N]".color(self.prompt_color));
        io::stdout().flush()?;

        let mut answer = String::new();
        input.read_line(&mut answer)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    /// Print a resolution as delivered to the content
    pub fn print_resolution(&self, resolution: &Resolution) {
        let granted: Vec<&str> = resolution.granted.iter().map(String::as_str).collect();
        let denied: Vec<&str> = resolution.denied.iter().map(String::as_str).collect();

        println!("{} {}", "Origin:".bold(), resolution.origin);
        if !granted.is_empty() {
            println!(
                "  {} {}",
                "granted".color(self.granted_color).bold(),
                granted.join(", ")
            );
        }
        if !denied.is_empty() {
            println!(
                "  {} {}",
                "denied".color(self.denied_color).bold(),
                denied.join(", ")
            );
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CorrelationToken;
    use crate::oracle::PromptContext;
    use crate::permissions::HostPermission;
    use std::io::Cursor;

    fn prompt() -> PromptRequest {
        PromptRequest {
            token: CorrelationToken(1),
            context: PromptContext::new("main").with_label("Live view"),
            permissions: [HostPermission::from("android.permission.CAMERA")].into(),
        }
    }

    #[test]
    fn test_yes_answers() {
        let console = Console::new();
        assert!(console.ask_permissions_from(&prompt(), &mut Cursor::new("y\n")).unwrap());
        assert!(console.ask_permissions_from(&prompt(), &mut Cursor::new(" YES \n")).unwrap());
    }

    #[test]
    fn test_anything_else_refuses() {
        let console = Console::new();
        assert!(!console.ask_permissions_from(&prompt(), &mut Cursor::new("n\n")).unwrap());
        assert!(!console.ask_permissions_from(&prompt(), &mut Cursor::new("\n")).unwrap());
        assert!(!console.ask_permissions_from(&prompt(), &mut Cursor::new("")).unwrap());
    }

    #[test]
    fn test_status_output() {
        let console = Console::default();
        console.print_system("Waiting for the host");
        console.print_error("could not read answer");
        console.print_resolution(&Resolution::new(
            crate::core::RequestId::new(),
            "https://trusted.example",
            crate::core::AuthorizationOutcome::deny_all(&std::collections::BTreeSet::from(["camera".to_string()])),
        ));
    }
}
