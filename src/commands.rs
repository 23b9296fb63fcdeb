//! Slash commands handled by the relay before any engine call

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    /// Start a fresh engine session
    New,
    Model,
    Mode,
    Thinking,
    Verbose,
    Usage,
    Status,
    Project,
    Help,
}

impl RelayCommand {
    pub fn all() -> &'static [RelayCommand] {
        &[
            RelayCommand::New,
            RelayCommand::Model,
            RelayCommand::Mode,
            RelayCommand::Thinking,
            RelayCommand::Verbose,
            RelayCommand::Usage,
            RelayCommand::Status,
            RelayCommand::Project,
            RelayCommand::Help,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            RelayCommand::New => "new",
            RelayCommand::Model => "model",
            RelayCommand::Mode => "mode",
            RelayCommand::Thinking => "thinking",
            RelayCommand::Verbose => "verbose",
            RelayCommand::Usage => "usage",
            RelayCommand::Status => "status",
            RelayCommand::Project => "project",
            RelayCommand::Help => "help",
        }
    }

    pub fn usage(&self) -> &'static str {
        match self {
            RelayCommand::Model => "/model <a|b|c>",
            RelayCommand::Mode => "/mode <ask|auto-edit|plan|unrestricted>",
            RelayCommand::Thinking => "/thinking <high|medium|low>",
            RelayCommand::Verbose => "/verbose <on|off>",
            RelayCommand::Project => "/project <id|none>",
            RelayCommand::New => "/new",
            RelayCommand::Usage => "/usage",
            RelayCommand::Status => "/status",
            RelayCommand::Help => "/help",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RelayCommand::New => "start a new conversation",
            RelayCommand::Model => "choose the model tier",
            RelayCommand::Mode => "choose the permission mode",
            RelayCommand::Thinking => "choose thinking depth",
            RelayCommand::Verbose => "toggle the usage footer",
            RelayCommand::Usage => "show token usage and cost",
            RelayCommand::Status => "show session settings",
            RelayCommand::Project => "switch the working project",
            RelayCommand::Help => "list commands",
        }
    }

    pub fn takes_args(&self) -> bool {
        matches!(
            self,
            RelayCommand::Model
                | RelayCommand::Mode
                | RelayCommand::Thinking
                | RelayCommand::Verbose
                | RelayCommand::Project
        )
    }

    pub fn parse(name: &str) -> Option<RelayCommand> {
        let name = name.to_lowercase();
        Self::all().iter().find(|cmd| cmd.name() == name).copied()
    }
}

impl fmt::Display for RelayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Known(RelayCommand, String),
    Unknown(String),
}

/// `None` when the input is an ordinary message.
pub fn parse_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return None;
    }

    Some(match RelayCommand::parse(name) {
        Some(cmd) => ParsedCommand::Known(cmd, args.to_string()),
        None => ParsedCommand::Unknown(name.to_string()),
    })
}

/// Parse `on`/`off` style toggles.
pub fn parse_toggle(arg: &str) -> Option<bool> {
    match arg.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

pub fn help_text() -> String {
    let mut text = String::from("Commands:");
    for cmd in RelayCommand::all() {
        text.push_str(&format!("\n  {:<42} {}", cmd.usage(), cmd.description()));
    }
    text
}
