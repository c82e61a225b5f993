use anyhow::Result;
use clap::Parser;
use std::env;
use std::sync::Arc;
use toolpush_application::{ConversationStore, RouteBinder};
use toolpush_core::auth::{AuthHandle, AuthSession};
use toolpush_core::config::Config;
use toolpush_infrastructure::{ApiClient, HttpSessionRepository};
use toolpush_interaction::PromptGateway;
use tracing_subscriber::EnvFilter;

mod repl;

/// Environment variable carrying a pre-issued access token.
const ENV_ACCESS_TOKEN: &str = "TOOLPUSH_ACCESS_TOKEN";

#[derive(Parser)]
#[command(name = "toolpush")]
#[command(about = "Toolpush - conversational assistant for oilfield professionals", long_about = None)]
struct Cli {
    /// Backend base URL (overrides TOOLPUSH_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Access token (overrides TOOLPUSH_ACCESS_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "toolpush=info",
        1 => "toolpush=debug",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::from_env();
    if let Some(api_url) = cli.api_url {
        config = config.with_api_url(api_url);
    }
    tracing::info!(api_url = %config.api_url, "starting toolpush");

    let auth = AuthHandle::new();
    let token = cli.token.or_else(|| env::var(ENV_ACCESS_TOKEN).ok());
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        auth.sign_in(AuthSession::new(token.trim()));
    }

    let client = Arc::new(ApiClient::new(&config, Arc::new(auth.clone()))?);
    let repository = Arc::new(HttpSessionRepository::new(client.clone()));
    let gateway = Arc::new(PromptGateway::new(client, &config));
    let store = Arc::new(ConversationStore::new(repository, gateway));

    let navigator = Arc::new(repl::TerminalNavigator::default());
    let binder = Arc::new(RouteBinder::new(store.clone(), navigator.clone()));
    tokio::spawn(binder.run(store.subscribe()));

    // The store reacts to every identity change, including the initial one.
    tokio::spawn(store.clone().watch_identity(auth.subscribe()));

    if auth.current().is_none() {
        eprintln!("Not signed in. Use /login <token> or set {ENV_ACCESS_TOKEN}.");
    }

    repl::run(store, auth, navigator).await
}
