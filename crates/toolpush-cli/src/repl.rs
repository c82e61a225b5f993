//! Interactive prompt loop. Every action delegates to the conversation
//! store; nothing here touches the backend directly.

use anyhow::Result;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::{Arc, Mutex};
use toolpush_application::{
    ConversationStore, Navigator, SendInput, SendOutcome, StoreError,
};
use toolpush_core::auth::{AuthHandle, AuthSession};
use toolpush_core::chat::{Entry, Role};

/// Navigator backed by a plain string; the terminal has no real URL bar,
/// but the route binder contract still holds.
#[derive(Default)]
pub struct TerminalNavigator {
    current: Mutex<String>,
}

impl Navigator for TerminalNavigator {
    fn current_path(&self) -> String {
        self.current.lock().expect("navigator lock poisoned").clone()
    }

    fn push(&self, path: &str) {
        *self.current.lock().expect("navigator lock poisoned") = path.to_string();
    }

    fn replace(&self, path: &str) {
        *self.current.lock().expect("navigator lock poisoned") = path.to_string();
    }
}

pub async fn run(
    store: Arc<ConversationStore>,
    auth: AuthHandle,
    _navigator: Arc<TerminalNavigator>,
) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("{}", "Toolpush - ask anything about the patch.".bold());
    println!("Type /help for commands.\n");

    loop {
        let prompt = prompt_label(&store);
        match editor.readline(&prompt) {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                if let Some(command) = line.strip_prefix('/') {
                    if handle_command(&store, &auth, command).await? {
                        break;
                    }
                } else {
                    send(&store, &line).await;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn prompt_label(store: &ConversationStore) -> String {
    match store.active_conversation_id() {
        Some(id) => {
            let title = store
                .conversations()
                .into_iter()
                .find(|c| c.id == id)
                .map(|c| c.title)
                .unwrap_or(id);
            format!("{title} > ")
        }
        None => "new chat > ".to_string(),
    }
}

/// Returns true when the loop should exit.
async fn handle_command(
    store: &Arc<ConversationStore>,
    auth: &AuthHandle,
    command: &str,
) -> Result<bool> {
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "help" => {
            println!("  /list            show conversations");
            println!("  /open <n|id>     open a conversation");
            println!("  /new             start a new conversation");
            println!("  /delete [n|id]   delete a conversation (default: active)");
            println!("  /rename <title>  rename the active conversation");
            println!("  /login <token>   sign in with an access token");
            println!("  /logout          sign out");
            println!("  /quit            exit");
        }
        "list" => {
            let conversations = store.conversations();
            if conversations.is_empty() {
                println!("No conversations yet.");
            }
            for (index, summary) in conversations.iter().enumerate() {
                let marker = if store.active_conversation_id().as_deref() == Some(&summary.id) {
                    "*"
                } else {
                    " "
                };
                let digest = summary.last_message_digest.as_deref().unwrap_or("");
                println!(
                    "{marker} {:>2}. {}  {}",
                    index + 1,
                    summary.title.bold(),
                    digest.dimmed()
                );
            }
        }
        "open" => match resolve_id(store, rest) {
            Some(id) => {
                store.select_conversation(&id).await;
                for entry in store.messages() {
                    print_entry(&entry);
                }
            }
            None => println!("Usage: /open <number|id>"),
        },
        "new" => store.new_conversation(),
        "delete" => {
            let target = if rest.is_empty() {
                store.active_conversation_id()
            } else {
                resolve_id(store, rest)
            };
            match target {
                Some(id) => match store.delete_conversation(&id).await {
                    Ok(()) => println!("Deleted."),
                    Err(err) => println!("{}", format!("Delete failed: {err}").red()),
                },
                None => println!("Nothing to delete."),
            }
        }
        "rename" => match (store.active_conversation_id(), rest.is_empty()) {
            (Some(id), false) => match store.rename_conversation(&id, rest).await {
                Ok(()) => println!("Renamed."),
                Err(err) => println!("{}", format!("Rename failed: {err}").red()),
            },
            (None, _) => println!("No active conversation."),
            (_, true) => println!("Usage: /rename <title>"),
        },
        "login" => {
            if rest.is_empty() {
                println!("Usage: /login <token>");
            } else {
                // The identity watch task picks up the change and loads
                // the list.
                auth.sign_in(AuthSession::new(rest));
                println!("Signed in.");
            }
        }
        "logout" => {
            auth.sign_out();
            println!("Signed out.");
        }
        "quit" | "exit" => return Ok(true),
        _ => println!("Unknown command: /{name} (try /help)"),
    }
    Ok(false)
}

fn resolve_id(store: &ConversationStore, reference: &str) -> Option<String> {
    if reference.is_empty() {
        return None;
    }
    let conversations = store.conversations();
    if let Ok(index) = reference.parse::<usize>() {
        return conversations
            .get(index.checked_sub(1)?)
            .map(|c| c.id.clone());
    }
    conversations
        .iter()
        .find(|c| c.id == reference)
        .map(|c| c.id.clone())
}

async fn send(store: &Arc<ConversationStore>, content: &str) {
    match store.send_message(SendInput::text(content)).await {
        Ok(SendOutcome::Completed { reply }) => {
            println!("{} {reply}\n", "assistant:".green().bold());
        }
        Ok(SendOutcome::Failed(err)) if err.is_auth_missing() => {
            println!("{}", "Not signed in. Use /login <token>.".yellow());
        }
        Ok(SendOutcome::Failed(_)) => {
            // The store already appended the error entry; show it.
            if let Some(entry) = store.messages().last() {
                print_entry(entry);
            }
        }
        Ok(SendOutcome::Ignored) => {}
        Err(StoreError::TurnInFlight) => {
            println!("{}", "Still working on the previous message.".yellow());
        }
    }
}

fn print_entry(entry: &Entry) {
    match entry.role {
        Role::User => println!("{} {}", "you:".cyan().bold(), entry.content),
        Role::Assistant => {
            let marker = if entry.flags.unsaved { " (not saved)" } else { "" };
            println!(
                "{} {}{}",
                "assistant:".green().bold(),
                entry.content,
                marker.dimmed()
            );
        }
        Role::SystemError => {
            if entry.flags.is_quota_error {
                println!("{} {}", "limit:".yellow().bold(), entry.content);
            } else {
                println!("{} {}", "error:".red().bold(), entry.content);
            }
        }
    }
}
