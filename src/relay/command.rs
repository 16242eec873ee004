//! Bot commands.
//!
//! A command word may carry an `@botname` suffix (`/status@relay_bot`), which
//! is ignored. Anything that is not one of the bot's own commands, including
//! unknown slash commands, is relayed to the agent verbatim.

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// `/link <query>`; `query` is empty when no argument was given.
    Link { query: String },
    Unlink,
    Projects,
    Status,
    Clear,
    /// Text for the agent.
    Relay { text: String },
}

impl Command {
    pub fn parse(text: &str) -> Command {
        let trimmed = text.trim();
        let relay = || Command::Relay {
            text: text.to_string(),
        };

        let Some(rest) = trimmed.strip_prefix('/') else {
            return relay();
        };

        let mut words = rest.split_whitespace();
        let Some(head) = words.next() else {
            return relay();
        };
        let name = head
            .split_once('@')
            .map_or(head, |(name, _bot)| name)
            .to_lowercase();

        match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "link" => Command::Link {
                query: words.collect::<Vec<_>>().join(" "),
            },
            "unlink" => Command::Unlink,
            "projects" => Command::Projects,
            "status" => Command::Status,
            "clear" => Command::Clear,
            _ => relay(),
        }
    }
}

/// Reply to `/help`.
pub const HELP_TEXT: &str = "\
Bot commands:
/start - Health check
/help - This message
/link <name> - Link chat to an Eve project
/unlink - Remove link
/projects - List Eve projects
/status - Show current mapping
/clear - Start new session

Other /commands are forwarded to Eve.";
