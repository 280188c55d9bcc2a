use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use ragchat_client::{ChatClient, ChatSession, DEFAULT_SERVER_URL, ERROR_MESSAGE, ServerStatus};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragchat")]
#[command(about = "Chat with your documents through ragchat-server", long_about = None)]
struct Cli {
    #[arg(long, env = "RAGCHAT_SERVER", default_value = DEFAULT_SERVER_URL, help = "Server base URL")]
    server: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Start an interactive chat (default)")]
    Chat,

    #[command(about = "Upload a text document for retrieval")]
    Upload {
        #[arg(help = "Path to a UTF-8 text file")]
        file: PathBuf,
    },

    #[command(about = "Show vector store status")]
    Status,

    #[command(about = "Remove all uploaded documents")]
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = ChatClient::new(&cli.server).context("failed to create HTTP client")?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(ChatSession::new(client)).await,
        Command::Upload { file } => upload(&client, &file).await,
        Command::Status => {
            print_status(&client.status().await.context("status request failed")?);
            Ok(())
        }
        Command::Clear => {
            println!("{}", client.clear().await.context("clear request failed")?);
            Ok(())
        }
    }
}

async fn upload(client: &ChatClient, file: &Path) -> anyhow::Result<()> {
    let summary = client
        .upload_file(file)
        .await
        .with_context(|| format!("failed to upload {}", file.display()))?;
    println!("{}: {} ({} chunks)", summary.filename, summary.message, summary.chunks);
    Ok(())
}

fn print_status(status: &ServerStatus) {
    let documents = status.documents.map_or_else(|| "unknown".to_string(), |n| n.to_string());
    println!("server:       {}", status.status);
    println!("vector store: {} ({})", status.vector_store, status.backend.as_deref().unwrap_or("?"));
    println!("retrieval:    {}", if status.rag_available { "available" } else { "unavailable" });
    println!("collection:   {} ({documents} documents)", status.collection);
    if let Some(reason) = &status.reason {
        println!("reason:       {reason}");
    }
}

async fn chat(mut session: ChatSession) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new().context("failed to start line editor")?;
    println!("Connected to {}. Type /help for commands.", session.client().base_url());

    loop {
        let line = match editor.readline(">> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => {
                println!("/upload <file>  index a text file");
                println!("/status         show vector store status");
                println!("/clear          remove all documents");
                println!("/quit           leave");
            }
            ("/upload", path) if !path.trim().is_empty() => {
                if let Err(e) = upload(session.client(), &PathBuf::from(path.trim())).await {
                    eprintln!("{e:#}");
                }
            }
            ("/status", _) => match session.client().status().await {
                Ok(status) => print_status(&status),
                Err(e) => eprintln!("status request failed: {e}"),
            },
            ("/clear", _) => match session.client().clear().await {
                Ok(message) => println!("{message}"),
                Err(e) => eprintln!("clear request failed: {e}"),
            },
            _ => {
                let mut shown = 0;
                let reply = session
                    .send(line, |live| {
                        print!("{}", &live.content[shown..]);
                        let _ = std::io::stdout().flush();
                        shown = live.content.len();
                    })
                    .await;
                if shown == 0 || reply.content == ERROR_MESSAGE {
                    if shown > 0 {
                        println!();
                    }
                    print!("{}", reply.content);
                }
                println!();
            }
        }
    }

    Ok(())
}
