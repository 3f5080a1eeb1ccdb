//! Command implementations over [`DocChatClient`]

use std::io::Write;
use std::path::Path;

use anyhow::{Result, bail};
use docchat_client::{ChatEvent, DocChatClient, TurnOutcome};
use tracing::debug;

use crate::cli::DocsCommands;

pub async fn login(client: &DocChatClient, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    client.login(email, &password).await?;
    println!("Logged in as {email}");
    Ok(())
}

pub async fn signup(client: &DocChatClient, name: &str, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("passwords do not match");
    }
    client.signup(name, email, &password).await?;
    println!("Account created, logged in as {email}");
    Ok(())
}

pub async fn logout(client: &DocChatClient) -> Result<()> {
    client.logout().await?;
    println!("Logged out");
    Ok(())
}

pub async fn whoami(client: &DocChatClient) -> Result<()> {
    let profile = client.me().await?;
    println!("{} <{}> (id {})", profile.name, profile.email, profile.id);
    Ok(())
}

pub async fn docs(client: &DocChatClient, command: DocsCommands) -> Result<()> {
    match command {
        DocsCommands::List => {
            let documents = client.list_documents().await?;
            if documents.is_empty() {
                println!("No documents uploaded yet");
                return Ok(());
            }
            for doc in documents {
                let date = doc.upload_date.unwrap_or_default();
                println!("{:>6}  {}  {}", doc.id, doc.filename, date);
            }
        }
        DocsCommands::Upload { path } => {
            upload(client, &path).await?;
        }
        DocsCommands::Remove { id } => {
            client.delete_document(id).await?;
            println!("Deleted document {id}");
        }
    }
    Ok(())
}

async fn upload(client: &DocChatClient, path: &Path) -> Result<()> {
    debug!(path = %path.display(), "Uploading document");
    client.upload_document(path).await?;
    println!("Uploaded {}", path.display());
    Ok(())
}

pub async fn chat(client: &DocChatClient, message: String, document: Option<i64>) -> Result<()> {
    let (session, mut events) = client.chat_session();
    let handle = session.send_message(message, document)?;

    // Ctrl-C cancels the turn; partial content is kept.
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling turn");
            cancel.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::ContentDelta { text, .. } => {
                    let _ = write!(stdout, "{text}");
                    let _ = stdout.flush();
                }
                ChatEvent::MessageCompleted { .. } => break,
                _ => {}
            }
        }
    });

    let result = handle.join().await?;
    let _ = printer.await;
    println!();

    if !result.message.citations.is_empty() {
        println!("\nSources:");
        for citation in &result.message.citations {
            println!("  [{}, page {}]", citation.source, citation.page);
        }
    }

    match result.outcome {
        TurnOutcome::Completed => Ok(()),
        TurnOutcome::Cancelled => {
            println!("(cancelled)");
            Ok(())
        }
        TurnOutcome::Failed(error) if error.auth => {
            bail!("session expired, please run `docchat login` again")
        }
        TurnOutcome::Failed(error) => bail!("chat turn failed: {}", error.message),
    }
}
