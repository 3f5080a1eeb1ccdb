mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use docchat_client::{ClientConfig, DocChatClient};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let config = ClientConfig::new(cli.api_url).with_credentials_path(credentials_path());
    let client = DocChatClient::connect(config).await?;

    match cli.command {
        Commands::Login { email } => commands::login(&client, &email).await,
        Commands::Signup { name, email } => commands::signup(&client, &name, &email).await,
        Commands::Logout => commands::logout(&client).await,
        Commands::Whoami => commands::whoami(&client).await,
        Commands::Docs(command) => commands::docs(&client, command).await,
        Commands::Chat { document, message } => {
            commands::chat(&client, message.join(" "), document).await
        }
    }
}

fn credentials_path() -> std::path::PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("docchat")
        .join("credentials.json")
}
