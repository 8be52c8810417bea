//! Local conversation commands. Each one loads the store and settings,
//! applies a single change and saves.

use log::{ info, warn };
use std::error::Error;
use std::fs;
use std::path::{ Path, PathBuf };

use super::{ Args, SettingsAction };
use crate::client::ProxyClient;
use crate::config::settings::Settings;
use crate::export::{ self, ExportFormat };
use crate::import::{ parse_import, read_import_file };
use crate::models::api::{ ModelInfo, SheetsRequest };
use crate::models::chat::Role;
use crate::store::{ ConversationStore, ImportTarget };

type CommandResult = Result<(), Box<dyn Error + Send + Sync>>;

pub struct Workspace {
    pub store_path: PathBuf,
    pub settings_path: PathBuf,
    pub store: ConversationStore,
    pub settings: Settings,
}

impl Workspace {
    pub fn open(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self {
            store: ConversationStore::load(&args.store_path)?,
            settings: Settings::load(&args.settings_path),
            store_path: args.store_path.clone(),
            settings_path: args.settings_path.clone(),
        })
    }

    pub fn save_store(&self) -> CommandResult {
        self.store.save(&self.store_path)?;
        Ok(())
    }
}

pub fn import(ws: &mut Workspace, file: &Path, target: ImportTarget) -> CommandResult {
    let (text, format) = read_import_file(file)?;
    let records = parse_import(&text, format)?;
    let summary = ws.store.merge_import(records, target);
    ws.save_store()?;

    if let Some(prompt) = &summary.system_prompt {
        info!("Using system prompt from imported data");
        ws.settings.system_prompt = prompt.clone();
        ws.settings.write_to(&ws.settings_path)?;
    }
    println!("{}", summary);
    Ok(())
}

pub fn export(ws: &Workspace, format: ExportFormat, output: Option<PathBuf>) -> CommandResult {
    let path = output.unwrap_or_else(|| PathBuf::from(format.default_file_name()));
    let content = export::encode(&ws.store.conversations, format)?;
    fs::write(&path, content)?;
    println!("Exported {} conversation(s) to {}", ws.store.conversations.len(), path.display());
    Ok(())
}

pub fn list(ws: &Workspace) {
    if ws.store.conversations.is_empty() {
        println!("No conversations yet.");
        return;
    }
    for conversation in &ws.store.conversations {
        let marker = if conversation.id == ws.store.current_conversation_id { "*" } else { " " };
        println!(
            "{} {:>4}  {:>3} msg  {}",
            marker,
            conversation.id,
            conversation.messages.len(),
            ConversationStore::preview(conversation)
        );
    }
}

pub fn new_conversation(ws: &mut Workspace) -> CommandResult {
    let id = ws.store.start_new_conversation();
    ws.save_store()?;
    println!("Started conversation {}", id);
    Ok(())
}

pub fn switch(ws: &mut Workspace, id: &str) -> CommandResult {
    ws.store.switch_to(id)?;
    ws.save_store()?;
    println!("Switched to conversation {}", id);
    Ok(())
}

/// Falls back to the server's default prompt when none has been set locally.
async fn ensure_system_prompt(ws: &mut Workspace, client: &ProxyClient) {
    if !ws.settings.system_prompt.is_empty() {
        return;
    }
    match client.prompt().await {
        Ok(prompt) if !prompt.is_empty() => {
            info!("Using the server's default system prompt");
            ws.settings.system_prompt = prompt;
        }
        Ok(_) => {}
        Err(e) => warn!("Failed to fetch default prompt: {}", e),
    }
}

pub async fn chat(ws: &mut Workspace, client: &ProxyClient, text: &str) -> CommandResult {
    if text.trim().is_empty() {
        return Ok(());
    }
    ws.settings.validate_for_send()?;
    ensure_system_prompt(ws, client).await;

    ws.store.add_message(Role::User, text);
    ws.save_store()?;

    let request = ws.settings.chat_request(ws.store.current_turns());
    let reply = client.chat(&request).await?;
    let message = ws.store.add_message(Role::Assistant, reply);
    ws.save_store()?;

    println!("{}", message.content);
    Ok(())
}

pub async fn regenerate(ws: &mut Workspace, client: &ProxyClient, message_id: &str) -> CommandResult {
    ws.settings.validate_for_send()?;
    let (index, history) = ws.store.regeneration_context(message_id)?;
    ensure_system_prompt(ws, client).await;

    let reply = client.chat(&ws.settings.chat_request(history)).await?;
    let message = ws.store.replace_message(index, reply)?;
    ws.save_store()?;

    println!("{}", message.content);
    Ok(())
}

pub fn edit(ws: &mut Workspace, message_id: &str, text: &str) -> CommandResult {
    ws.store.edit_message(message_id, text)?;
    ws.save_store()
}

pub fn delete_message(ws: &mut Workspace, message_id: &str) -> CommandResult {
    ws.store.delete_message(message_id)?;
    ws.save_store()
}

pub fn delete_conversation(ws: &mut Workspace, id: &str) -> CommandResult {
    ws.store.delete_conversation(id)?;
    ws.save_store()?;
    println!("Deleted conversation {}; active is now {}", id, ws.store.current_conversation_id);
    Ok(())
}

/// Mirrors the selection list: failures still yield a single fallback entry.
pub async fn models(ws: &Workspace, client: &ProxyClient) -> CommandResult {
    let settings = &ws.settings;
    let models: Vec<ModelInfo> = match client.models(&settings.models_request()).await {
        Ok(resp) => {
            if let Some(error) = &resp.error {
                warn!("Model listing reported: {}", error);
            }
            match resp.models {
                Some(models) if !models.is_empty() => settings.filter_models(models),
                _ => settings.fallback_models(),
            }
        }
        Err(e) => {
            warn!("Failed to fetch models: {}", e);
            settings.fallback_models()
        }
    };

    for model in models {
        let marker = if model.id == settings.selected_model { "*" } else { " " };
        println!("{} {}", marker, model.id);
    }
    Ok(())
}

pub async fn push_sheets(ws: &Workspace, client: &ProxyClient, name: &str) -> CommandResult {
    if name.trim().is_empty() {
        return Err("A submitter name is required".into());
    }
    let request = SheetsRequest {
        data: export::sheet_rows(&ws.store.conversations),
        submitter_name: name.to_string(),
    };
    let resp = client.push_sheets(&request).await?;
    println!("Successfully exported {} rows to Google Sheets!", resp.updated_rows);
    Ok(())
}

pub fn settings(ws: &mut Workspace, action: SettingsAction) -> CommandResult {
    match action {
        SettingsAction::Show => {
            let mut shown = ws.settings.clone();
            if !shown.api_key.is_empty() {
                shown.api_key = "********".to_string();
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        SettingsAction::Set(update) => {
            update.apply(&mut ws.settings);
            ws.settings.save(&ws.settings_path)?;
            println!("Settings saved to {}", ws.settings_path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatTurn;

    fn workspace(dir: &Path) -> Workspace {
        Workspace {
            store_path: dir.join("conversations.json"),
            settings_path: dir.join("settings.json"),
            store: ConversationStore::default(),
            settings: Settings::default(),
        }
    }

    #[test]
    fn test_import_applies_system_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.jsonl");
        fs::write(
            &file,
            "{\"id\":\"3\",\"messages\":[{\"role\":\"system\",\"content\":\"be kind\"},{\"role\":\"user\",\"content\":\"hi\"}]}\n"
        ).unwrap();

        let mut ws = workspace(dir.path());
        import(&mut ws, &file, ImportTarget::New).unwrap();

        assert_eq!(ws.settings.system_prompt, "be kind");
        assert_eq!(Settings::load(&ws.settings_path).system_prompt, "be kind");
        let stored = ConversationStore::load(&ws.store_path).unwrap();
        assert_eq!(stored.current_conversation_id, "3");
        assert_eq!(stored.current_turns(), vec![ChatTurn::new(Role::User, "hi")]);
    }

    #[test]
    fn test_export_writes_requested_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path());
        ws.store.add_message(Role::User, "hi");
        let out = dir.path().join("out.csv");
        export(&ws, ExportFormat::Csv, Some(out.clone())).unwrap();
        assert_eq!(fs::read_to_string(out).unwrap(), "Conversation ID,Role,Content\n1,\"user\",\"hi\"\n");
    }

    #[test]
    fn test_settings_set_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path());
        let update = super::super::SettingsUpdate { open_router: Some(true), ..Default::default() };
        assert!(settings(&mut ws, SettingsAction::Set(update)).is_err());
        assert!(!ws.settings_path.exists());
    }
}
