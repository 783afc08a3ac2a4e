use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::models::Role;

#[derive(Parser, Debug)]
#[command(name = "ledgerchat")]
#[command(about = "Chat with an AI assistant that can search the web and keep your ledger", long_about = None)]
pub struct Args {
    #[arg(short = 'v', long = "verbose", global = true, help = "Log debug details to stderr")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one prompt and stream the answer
    Chat(ChatArgs),

    /// List all threads, newest first
    Threads,

    /// Print the transaction ledger as CSV
    Transactions,

    /// Manage a single thread
    #[command(subcommand)]
    Thread(ThreadCommand),
}

#[derive(ClapArgs, Debug)]
pub struct ChatArgs {
    #[arg(short = 't', long = "thread", help = "Continue an existing thread")]
    pub thread: Option<String>,

    #[arg(long = "response-id", help = "Id to store the final answer under")]
    pub response_id: Option<String>,

    #[arg(long = "prompt-id", help = "Id to store the prompt under")]
    pub prompt_id: Option<String>,

    #[arg(
        long = "max-turns",
        value_parser = parse_turns,
        help = "Upper bound on model calls for this request"
    )]
    pub max_turns: Option<usize>,

    #[arg(
        long = "api-endpoint",
        help = "Custom API base URL (e.g., http://localhost:11434/v1)"
    )]
    pub api_endpoint: Option<String>,

    #[arg(required = true, help = "Prompt to send")]
    pub prompt: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ThreadCommand {
    /// Create an empty thread and print its id
    Create { title: String },

    Rename { id: String, title: String },

    Delete { id: String },

    /// Print the user-facing messages of a thread as JSON
    Messages { id: String },

    /// Append a raw message
    Append {
        id: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
        #[arg(long)]
        content: String,
        #[arg(long = "message-id")]
        message_id: Option<String>,
    },

    /// Replace the message stored under `--message-id`; no-op if absent
    Update {
        id: String,
        #[arg(long = "message-id")]
        message_id: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
        #[arg(long)]
        content: String,
    },
}

impl Args {
    pub fn chat(&self) -> Option<&ChatArgs> {
        match &self.command {
            Command::Chat(chat) => Some(chat),
            _ => None,
        }
    }
}

fn parse_turns(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Roles accepted for raw messages. The system message belongs to chat
/// requests and cannot be written directly.
fn parse_role(s: &str) -> Result<Role, String> {
    match s.to_lowercase().as_str() {
        "system" => Err("system messages are set by chat requests".to_string()),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(format!("unknown role '{}'", other)),
    }
}
