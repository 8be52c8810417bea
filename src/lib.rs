pub mod cli;
pub mod client;
pub mod config;
pub mod export;
pub mod import;
pub mod llm;
pub mod models;
pub mod server;
pub mod sheets;
pub mod store;

use cli::commands::{ self, Workspace };
use cli::{ Args, Command, ServeArgs };
use client::ProxyClient;
use log::info;
use server::{ AppState, Server };
use sheets::GoogleSheetStore;
use std::error::Error;
use std::sync::Arc;

async fn serve(opts: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", opts.server_addr);
    info!("Prompt Path: {}", opts.prompt_path.display());
    info!("App URL: {}", opts.app_url);
    info!("Environment OpenAI Key: {}", if opts.openai_api_key.is_some() { "set" } else { "not set" });
    info!("Rate Limit: {}/s", opts.rate_limit);
    info!("TLS Enabled: {}", opts.enable_tls);
    info!("-------------------------");

    let mut state = AppState::new(opts.openai_api_key.clone(), opts.prompt_path.clone(), opts.app_url.clone())
        .with_rate_limit(opts.rate_limit);

    match (&opts.spreadsheet_id, opts.sheet_credentials()) {
        (Some(spreadsheet_id), Some(credentials)) => {
            info!("Sheets export enabled for spreadsheet {} (gid {})", spreadsheet_id, opts.sheet_gid);
            let store = GoogleSheetStore::new(spreadsheet_id.clone(), opts.sheet_gid.clone(), credentials);
            state = state.with_sheets(Arc::new(store));
        }
        _ => info!("Sheets export disabled: spreadsheet id or credentials missing"),
    }

    let server = Server::new(opts.server_addr.clone(), state, opts.tls());
    server.run().await
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let command = match args.command.clone() {
        Command::Serve(serve_args) => {
            return serve(serve_args).await;
        }
        other => other,
    };

    let mut ws = Workspace::open(&args)?;
    let client = ProxyClient::new(args.server_url.clone());

    match command {
        Command::Serve(_) => {}
        Command::Import { file, target } => commands::import(&mut ws, &file, target)?,
        Command::Export { format, output } => commands::export(&ws, format, output)?,
        Command::List => commands::list(&ws),
        Command::New => commands::new_conversation(&mut ws)?,
        Command::Switch { id } => commands::switch(&mut ws, &id)?,
        Command::Chat { text } => commands::chat(&mut ws, &client, &text).await?,
        Command::Regenerate { message_id } => commands::regenerate(&mut ws, &client, &message_id).await?,
        Command::Edit { message_id, text } => commands::edit(&mut ws, &message_id, &text)?,
        Command::DeleteMessage { message_id } => commands::delete_message(&mut ws, &message_id)?,
        Command::DeleteConversation { id } => commands::delete_conversation(&mut ws, &id)?,
        Command::Models => commands::models(&ws, &client).await?,
        Command::PushSheets { name } => commands::push_sheets(&ws, &client, &name).await?,
        Command::Settings { action } => commands::settings(&mut ws, action)?,
    }
    Ok(())
}
