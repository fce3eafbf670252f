//! Minimal terminal shell around the chat controller.
//!
//! This is deliberately not a presentation layer: it wires configuration,
//! backend, and controller together and prints transcript tails, which is
//! enough to exercise every controller operation end to end.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use docchat::{ChatConfig, ChatController, Message, SendOutcome, TransportMode};
use docchat_backend::{ChatBackend, ChatId, HttpBackend};

const HELP: &str = "\
commands:
  /new            start a new chat
  /chats          list stored chats
  /load <id>      load a stored chat
  /delete <id>    delete a stored chat
  /upload <path>  upload a document for indexing
  /regen          regenerate the last answer
  /stream         use the streaming transport
  /buffered       use the buffered transport
  /quit           exit
anything else is sent as a question.";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match ChatConfig::load() {
        Ok(config) => config,
        Err(error) => {
            tracing::warn!(%error, "failed to load configuration, using defaults");
            ChatConfig::default()
        }
    };

    let backend = match HttpBackend::new(&config.base_url) {
        Ok(backend) => Arc::new(backend),
        Err(error) => {
            eprintln!("cannot reach a backend at '{}': {error}", config.base_url);
            std::process::exit(1);
        }
    };

    let mut controller = ChatController::new(backend.clone(), config.transport);

    // Mirror the web client: every launch begins in a fresh chat.
    match controller.new_chat().await {
        Ok(chat_id) => println!("new chat {chat_id} ({})", backend.base_url()),
        Err(error) => {
            eprintln!("failed to create a chat — is the backend running? {error}");
            std::process::exit(1);
        }
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("you> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::error!(%error, "stdin closed unexpectedly");
                break;
            }
        };
        let input = line.trim();

        match input.split_once(' ').map_or((input, ""), |(cmd, rest)| (cmd, rest.trim())) {
            ("/quit", _) => break,
            ("/new", _) => match controller.new_chat().await {
                Ok(chat_id) => println!("new chat {chat_id}"),
                Err(error) => eprintln!("{error}"),
            },
            ("/chats", _) => match backend.list_chats().await {
                Ok(chats) if chats.is_empty() => println!("(no stored chats)"),
                Ok(chats) => {
                    for chat in chats {
                        println!("{}  {}  {}", chat.id, chat.title, chat.updated_at);
                    }
                }
                Err(error) => eprintln!("{error}"),
            },
            ("/load", id) if !id.is_empty() => {
                match controller.load_chat(ChatId::new(id)).await {
                    Ok(()) => print_transcript(&controller),
                    Err(error) => eprintln!("{error}"),
                }
            }
            ("/delete", id) if !id.is_empty() => {
                match backend.delete_chat(&ChatId::new(id)).await {
                    Ok(()) => println!("deleted {id}"),
                    Err(error) => eprintln!("{error}"),
                }
            }
            ("/upload", path) if !path.is_empty() => {
                match backend.upload_document_file(Path::new(path)).await {
                    Ok(receipt) => {
                        println!(
                            "indexed {} ({} bytes, {} chunks)",
                            receipt.filename, receipt.size_bytes, receipt.chunk_count
                        );
                        controller.document_uploaded(&receipt);
                    }
                    Err(error) => eprintln!("{error}"),
                }
            }
            ("/regen", _) => match controller.regenerate().await {
                Ok(outcome) => print_answer(&controller, outcome),
                Err(error) => eprintln!("{error}"),
            },
            ("/stream", _) => {
                controller.set_transport(TransportMode::Streaming);
                println!("transport: streaming");
            }
            ("/buffered", _) => {
                controller.set_transport(TransportMode::Buffered);
                println!("transport: buffered");
            }
            ("/help", _) => println!("{HELP}"),
            _ => match controller.send(input, false).await {
                Ok(outcome) => print_answer(&controller, outcome),
                Err(error) => eprintln!("{error}"),
            },
        }
    }
}

fn print_answer(controller: &ChatController, outcome: SendOutcome) {
    if outcome == SendOutcome::Ignored {
        println!("(nothing sent)");
        return;
    }

    if let Some(Message::Assistant { text, .. }) = controller.transcript().messages().last() {
        println!("assistant> {text}");
    }
}

fn print_transcript(controller: &ChatController) {
    for message in controller.transcript().messages() {
        match message {
            Message::User { text } => println!("you> {text}"),
            Message::Assistant { text, .. } => println!("assistant> {text}"),
            Message::Document {
                filename,
                size_bytes,
                chunk_count,
            } => println!("[document {filename}, {size_bytes} bytes, {chunk_count} chunks]"),
        }
    }
}
