use std::process;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ledgerchat::api::{ChatModel, OpenAiChatModel};
use ledgerchat::cli::{Args, ChatArgs, Command, ThreadCommand};
use ledgerchat::config::Config;
use ledgerchat::error::{LedgerChatError, Result};
use ledgerchat::ledger::{CsvLedger, Ledger};
use ledgerchat::models::{Message, Role, StoredMessage};
use ledgerchat::orchestrator::{self, ChatRequest, OrchestratorContext, RunOutcome};
use ledgerchat::sink::TerminalSink;
use ledgerchat::store::{user_visible, FilesystemThreadStore, ThreadStore};
use ledgerchat::tools::builtin_registry;

const TITLE_CHARS: usize = 40;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::from_env_and_args(&args);
    init_tracing(config.verbose);

    let store = FilesystemThreadStore::new(&config.store_dir);

    let result = match &args.command {
        Command::Chat(chat) => run_chat(&config, chat, Arc::new(store)).await,
        Command::Threads => list_threads(&store).await.map(|_| true),
        Command::Transactions => print_transactions(&config).await.map(|_| true),
        Command::Thread(cmd) => thread_command(&store, cmd).await.map(|_| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ledgerchat={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Returns `Ok(false)` when the loop aborted.
async fn run_chat(config: &Config, chat: &ChatArgs, store: Arc<FilesystemThreadStore>) -> Result<bool> {
    let api_key = config.require_api_key()?;
    let prompt = chat.prompt.join(" ");

    let thread_id = match &chat.thread {
        Some(id) => id.clone(),
        None => {
            let summary = store.create_thread(&title_from(&prompt)).await?;
            eprintln!("{}", format!("Thread: {}", summary.id).dimmed());
            summary.id
        }
    };

    let model = OpenAiChatModel::new(
        api_key,
        config.api_endpoint.clone(),
        config.model.clone(),
        Duration::from_secs(config.stream_timeout),
    )?;
    let artifact_model: Arc<dyn ChatModel> = Arc::new(model.with_model(config.artifact_model.clone()));
    let ledger: Arc<dyn Ledger> = Arc::new(CsvLedger::new(&config.ledger_path));

    let tools = builtin_registry(&config.web_search, ledger.clone(), artifact_model)?;
    let system_prompt = orchestrator::build_system_prompt(config, ledger.as_ref()).await?;
    debug!(model = %model.model(), endpoint = %config.api_endpoint, thread_id = %thread_id, "starting chat");

    let sink = Arc::new(TerminalSink::new());
    let ctx = OrchestratorContext {
        model: Arc::new(model),
        tools: Arc::new(tools),
        store,
        sink: sink.clone(),
        system_prompt,
        max_turns: config.max_turns,
    };

    let request = ChatRequest {
        thread_id,
        prompt_id: chat.prompt_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
        prompt,
        response_id: chat.response_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let outcome = orchestrator::run(&ctx, request, &cancel).await?;
    sink.finish();

    match outcome {
        RunOutcome::Completed => Ok(true),
        RunOutcome::Aborted(reason) => {
            eprintln!("{} {}", "Aborted:".yellow(), reason);
            Ok(false)
        }
    }
}

fn title_from(prompt: &str) -> String {
    let title: String = prompt.chars().take(TITLE_CHARS).collect();
    if prompt.chars().count() > TITLE_CHARS {
        format!("{}...", title.trim_end())
    } else {
        title
    }
}

async fn list_threads(store: &FilesystemThreadStore) -> Result<()> {
    let threads = store.list_threads().await?;
    if threads.is_empty() {
        println!("{}", "No threads yet.".dimmed());
    }
    for thread in threads {
        println!(
            "{}  {}  {}",
            thread.id.cyan(),
            thread.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            thread.title
        );
    }
    Ok(())
}

async fn print_transactions(config: &Config) -> Result<()> {
    let ledger = CsvLedger::new(&config.ledger_path);
    println!("{}", ledger.snapshot().await?.trim_end());
    Ok(())
}

async fn thread_command(store: &FilesystemThreadStore, cmd: &ThreadCommand) -> Result<()> {
    match cmd {
        ThreadCommand::Create { title } => {
            let summary = store.create_thread(title).await?;
            println!("{}", summary.id);
        }
        ThreadCommand::Rename { id, title } => {
            store.update_thread(id, title).await?;
            println!("{}", "Thread renamed.".green());
        }
        ThreadCommand::Delete { id } => {
            store.delete_thread(id).await?;
            println!("{}", "Thread deleted.".green());
        }
        ThreadCommand::Messages { id } => {
            let messages = user_visible(store.get_all_messages(id).await?);
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        ThreadCommand::Append {
            id,
            role,
            content,
            message_id,
        } => {
            let message = text_message(*role, content)?;
            let message_id = message_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
            store
                .append_message(id, StoredMessage::new(message_id.clone(), message))
                .await?;
            println!("{}", message_id);
        }
        ThreadCommand::Update {
            id,
            message_id,
            role,
            content,
        } => {
            let message = text_message(*role, content)?;
            let replaced = store
                .update_message(id, StoredMessage::new(message_id.clone(), message))
                .await?;
            if replaced {
                println!("{}", "Message updated.".green());
            } else {
                println!("{}", format!("No message with id '{}'; nothing changed.", message_id).yellow());
            }
        }
    }
    Ok(())
}

fn text_message(role: Role, content: &str) -> Result<Message> {
    Ok(match role {
        Role::System => {
            return Err(LedgerChatError::StoreError(
                "system messages are set by chat requests".to_string(),
            ))
        }
        Role::User => Message::user(content),
        Role::Assistant => Message::assistant(content),
        Role::Tool => Message {
            role: Role::Tool,
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        },
    })
}
