use anyhow::Result;
use chatdesk::ai::providers::{build_generator, provider_label};
use chatdesk::auth::{AuthProvider, LocalAuth};
use chatdesk::config::AppConfig;
use chatdesk::controller::ConversationController;
use chatdesk::events::{ChatEvent, EventBus};
use chatdesk::store::{ConversationStore, JsonFileStore};
use chatdesk::types::Role;
use chatdesk::views::{
    CommitOutcome, ConversationListPresenter, ExchangePanel, SubmitOutcome,
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const HELP: &str = "\
Type a message and press Enter to send it.
  /list                 show conversations
  /new                  start a new conversation
  /open <n>             switch to conversation n
  /show                 print the active transcript
  /rename <n> <title>   rename conversation n
  /delete <n>           delete conversation n
  /stop                 stop the response in progress
  /logout, /login       sign out or back in
  /quit                 exit";

fn load_dotenv() {
    // A .env file is optional; the process environment always applies.
    if dotenvy::dotenv().is_err() {
        tracing::debug!("No .env file found");
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    init_tracing();

    let config = AppConfig::from_env()?;
    info!(
        provider = provider_label(&config.provider),
        model = %config.model,
        user_id = %config.user.id,
        "Starting chatdesk"
    );

    let events = EventBus::new();
    let store: Arc<dyn ConversationStore> =
        Arc::new(JsonFileStore::in_dir(config.data_dir.as_deref()));
    let auth = Arc::new(LocalAuth::signed_in(config.user.clone()));
    let controller = ConversationController::new(store, events.clone());
    let panel = ExchangePanel::new(
        controller.clone(),
        build_generator(&config.provider),
        config.model.clone(),
    );
    let mut sidebar = ConversationListPresenter::new(controller.clone(), auth.clone());

    tokio::spawn(print_events(events.subscribe()));

    let subscription = auth.subscribe();
    controller.on_auth_change(auth.current_user()).await;
    {
        let controller = controller.clone();
        tokio::spawn(async move { controller.follow_auth(subscription).await });
    }

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('/') {
            let panel = panel.clone();
            let text = line.to_string();
            tokio::spawn(async move {
                if panel.submit(&text).await == SubmitOutcome::Rejected {
                    println!("(still answering, use /stop to cancel)");
                }
            });
            continue;
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/list" => print_list(&sidebar),
            "/new" => {
                if sidebar.new_chat().await.is_none() {
                    println!("(could not create a conversation)");
                }
            }
            "/open" => match nth_id(&sidebar, rest) {
                Some(id) if sidebar.select(&id) => print_transcript(&panel),
                _ => println!("(no such conversation)"),
            },
            "/show" => print_transcript(&panel),
            "/rename" => {
                let (index, title) = rest.split_once(' ').unwrap_or((rest, ""));
                let editing = match nth_id(&sidebar, index) {
                    Some(id) => sidebar.begin_edit(&id),
                    None => false,
                };
                if !editing {
                    println!("(no such conversation)");
                    continue;
                }
                sidebar.set_draft(title);
                match sidebar.commit_edit().await {
                    CommitOutcome::Renamed => print_list(&sidebar),
                    CommitOutcome::Reverted => println!("(empty title, unchanged)"),
                    _ => println!("(rename failed)"),
                }
            }
            "/delete" => {
                let deleted = match nth_id(&sidebar, rest) {
                    Some(id) => sidebar.delete(&id).await,
                    None => false,
                };
                if deleted {
                    print_list(&sidebar);
                } else {
                    println!("(delete failed)");
                }
            }
            "/stop" => panel.cancel(),
            "/logout" => sidebar.logout().await,
            "/login" => auth.login(config.user.clone()),
            other => warn!(command = other, "Unknown command"),
        }
    }

    Ok(())
}

fn nth_id(sidebar: &ConversationListPresenter, index: &str) -> Option<String> {
    let n: usize = index.trim().parse().ok()?;
    sidebar
        .items()
        .into_iter()
        .nth(n.checked_sub(1)?)
        .map(|item| item.id)
}

fn print_list(sidebar: &ConversationListPresenter) {
    let items = sidebar.items();
    if items.is_empty() {
        println!("(no conversations)");
    }
    for (i, item) in items.iter().enumerate() {
        let marker = if item.is_active { '*' } else { ' ' };
        println!("{marker} {:>2}. {}", i + 1, item.title);
    }
}

fn print_transcript(panel: &ExchangePanel) {
    for entry in panel.transcript() {
        let who = match entry.message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        let suffix = if entry.in_progress { " …" } else { "" };
        println!("{who}> {}{suffix}", entry.message.content);
    }
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<ChatEvent>) {
    loop {
        match events.recv().await {
            Ok(ChatEvent::StreamStarted { .. }) => print!("assistant> "),
            Ok(ChatEvent::StreamFragment { text, .. }) => print!("{text}"),
            Ok(ChatEvent::StreamFinished { .. }) => println!(),
            Ok(ChatEvent::UserChanged(None)) => println!("(signed out)"),
            Ok(ChatEvent::UserChanged(Some(user))) => println!("(signed in as {})", user.id),
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        }
        let _ = std::io::stdout().flush();
    }
}
