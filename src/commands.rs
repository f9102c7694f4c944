/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    History,
    Agents,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
/history  show the agent's stored messages
/agents   list agents on the server
/help     show this help
/quit     exit";

pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }

    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Send(trimmed.to_string());
    };

    // "//text" sends a message that starts with a slash.
    if rest.starts_with('/') {
        return Command::Send(rest.to_string());
    }

    match rest.split_whitespace().next().unwrap_or_default() {
        "quit" | "exit" | "q" => Command::Quit,
        "history" => Command::History,
        "agents" => Command::Agents,
        "help" | "?" => Command::Help,
        other => Command::Unknown(other.to_string()),
    }
}
