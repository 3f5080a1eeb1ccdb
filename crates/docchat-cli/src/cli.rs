//! Command-line interface definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docchat", version, about = "Chat with your uploaded documents")]
pub struct Cli {
    /// Base URL of the backend API
    #[arg(
        long,
        global = true,
        env = "DOCCHAT_API_URL",
        default_value = "http://localhost:8000/api"
    )]
    pub api_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the bearer token
    Login {
        email: String,
    },
    /// Create an account, then log in
    Signup {
        name: String,
        email: String,
    },
    /// Clear the stored credential (best-effort server logout)
    Logout,
    /// Show the logged-in user profile
    Whoami,
    /// Manage uploaded documents
    #[command(subcommand)]
    Docs(DocsCommands),
    /// Ask a question and stream the answer
    Chat {
        /// Restrict retrieval to a single document id
        #[arg(long)]
        document: Option<i64>,
        /// The message to send
        #[arg(required = true)]
        message: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum DocsCommands {
    /// List uploaded documents
    List,
    /// Upload a document for indexing
    Upload { path: PathBuf },
    /// Delete a document
    Remove { id: i64 },
}
