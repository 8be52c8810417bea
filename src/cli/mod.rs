pub mod commands;

use clap::{ Parser, Subcommand };
use std::path::PathBuf;

use crate::config::settings::Settings;
use crate::export::ExportFormat;
use crate::server::TlsPaths;
use crate::sheets::Credentials;
use crate::store::ImportTarget;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the local conversation store (JSON).
    #[arg(long, env = "TRAINSET_STORE", default_value = "conversations.json", global = true)]
    pub store_path: PathBuf,

    /// Path to the saved chat settings (JSON).
    #[arg(long, env = "TRAINSET_SETTINGS", default_value = "settings.json", global = true)]
    pub settings_path: PathBuf,

    /// Base URL of a running proxy server, used by chat, models and push-sheets.
    #[arg(long, env = "TRAINSET_SERVER_URL", default_value = "http://127.0.0.1:3000", global = true)]
    pub server_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the proxy server.
    Serve(ServeArgs),
    /// Import conversations from a .json, .jsonl or .txt file.
    Import {
        file: PathBuf,
        /// `new` groups records into conversations by id; `current` appends to the active one.
        #[arg(long, default_value = "new")]
        target: ImportTarget,
    },
    /// Export all conversations as jsonl, json or csv.
    Export {
        format: ExportFormat,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List stored conversations.
    List,
    /// Start a new conversation.
    New,
    /// Make another conversation active.
    Switch {
        id: String,
    },
    /// Send a message in the active conversation.
    Chat {
        text: String,
    },
    /// Ask again for an assistant reply.
    Regenerate {
        message_id: String,
    },
    /// Replace the content of a message in the active conversation.
    Edit {
        message_id: String,
        text: String,
    },
    DeleteMessage {
        message_id: String,
    },
    DeleteConversation {
        id: String,
    },
    /// List models selectable with the current settings.
    Models,
    /// Append every conversation to the shared spreadsheet.
    PushSheets {
        /// Name recorded next to each submitted row.
        #[arg(long)]
        name: String,
    },
    /// Show or change chat settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Fallback OpenAI key used when a request carries none.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Text file holding the default system prompt.
    #[arg(long, env = "PROMPT_PATH", default_value = "prompt.txt")]
    pub prompt_path: PathBuf,

    /// Public URL of this app, sent to OpenRouter as the referer.
    #[arg(long, env = "NEXT_PUBLIC_APP_URL", default_value = "http://localhost:3000")]
    pub app_url: String,

    // --- Spreadsheet Args ---
    /// Spreadsheet receiving pushed conversations. Sheets support is off when unset.
    #[arg(long, env = "SHEETS_SPREADSHEET_ID")]
    pub spreadsheet_id: Option<String>,

    /// Numeric gid of the target tab.
    #[arg(long, env = "GOOGLE_SHEETS_SHEET_ID", default_value = "0")]
    pub sheet_gid: String,

    /// Service account key file. Takes precedence over the inline credentials.
    #[arg(long, env = "GOOGLE_SHEETS_SA_KEY_PATH")]
    pub sa_key_path: Option<PathBuf>,

    #[arg(long, env = "GOOGLE_SHEETS_CLIENT_EMAIL")]
    pub client_email: Option<String>,

    #[arg(long, env = "GOOGLE_SHEETS_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    #[arg(long, env = "GOOGLE_SHEETS_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Requests per second accepted across all endpoints.
    #[arg(long, env = "RATE_LIMIT_PER_SECOND", default_value = "10")]
    pub rate_limit: u32,

    // --- TLS Args ---
    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,
}

impl ServeArgs {
    pub fn sheet_credentials(&self) -> Option<Credentials> {
        if let Some(path) = &self.sa_key_path {
            return Some(Credentials::KeyFile(path.clone()));
        }
        match (&self.client_email, &self.private_key) {
            (Some(client_email), Some(private_key)) if !client_email.is_empty() && !private_key.is_empty() => {
                Some(Credentials::Inline {
                    client_email: client_email.clone(),
                    private_key: private_key.clone(),
                    project_id: self.project_id.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn tls(&self) -> Option<TlsPaths> {
        if !self.enable_tls {
            return None;
        }
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert_path), Some(key_path)) =>
                Some(TlsPaths { cert_path: cert_path.clone(), key_path: key_path.clone() }),
            _ => None,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsAction {
    Show,
    /// Update one or more settings; the result is validated before saving.
    Set(SettingsUpdate),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct SettingsUpdate {
    #[arg(long)]
    pub system_prompt: Option<String>,
    #[arg(long)]
    pub api_key: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    /// Switch between OpenAI (false) and OpenRouter (true); resets the endpoint.
    #[arg(long)]
    pub open_router: Option<bool>,
    #[arg(long)]
    pub api_endpoint: Option<String>,
    #[arg(long)]
    pub custom_endpoint: Option<bool>,
    /// Model identifier used when the selected model is `custom`.
    #[arg(long)]
    pub open_router_model: Option<String>,
}

impl SettingsUpdate {
    pub fn apply(self, settings: &mut Settings) {
        if let Some(enabled) = self.open_router {
            settings.set_open_router(enabled);
        }
        if let Some(prompt) = self.system_prompt {
            settings.system_prompt = prompt;
        }
        if let Some(key) = self.api_key {
            settings.api_key = key;
        }
        if let Some(model) = self.model {
            settings.selected_model = model;
        }
        if let Some(endpoint) = self.api_endpoint {
            settings.api_endpoint = endpoint;
        }
        if let Some(custom) = self.custom_endpoint {
            settings.is_custom_endpoint = custom;
        }
        if let Some(model) = self.open_router_model {
            settings.custom_open_router_model = model;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_command() {
        let args = Args::try_parse_from(["trainset", "import", "data.jsonl", "--target", "current"]).unwrap();
        match args.command {
            Command::Import { file, target } => {
                assert_eq!(file, PathBuf::from("data.jsonl"));
                assert_eq!(target, ImportTarget::Current);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_export_rejects_unknown_format() {
        assert!(Args::try_parse_from(["trainset", "export", "xml"]).is_err());
    }

    #[test]
    fn test_settings_update_toggles_provider_first() {
        let mut settings = Settings::default();
        SettingsUpdate {
            open_router: Some(true),
            api_endpoint: Some("https://proxy.example/v1".into()),
            ..SettingsUpdate::default()
        }.apply(&mut settings);
        assert!(settings.is_open_router);
        assert_eq!(settings.api_endpoint, "https://proxy.example/v1");
    }

    #[test]
    fn test_inline_sheet_credentials() {
        let args = Args::try_parse_from([
            "trainset",
            "serve",
            "--client-email",
            "bot@x.iam.gserviceaccount.com",
            "--private-key",
            "pem",
        ]).unwrap();
        let Command::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        assert!(matches!(serve.sheet_credentials(), Some(Credentials::Inline { .. })));
        assert!(serve.tls().is_none());
    }
}
