//! Observer tap: listens to a switchboard `/compliance` channel and prints
//! enriched transcription events as they arrive.
//!
//! Usage: `switchboard-tap <target> [--path /compliance] [--insecure] [--raw]`
//!
//! The target may be a bare host (`abc123.ngrok.app`), an http(s) URL, or a
//! full ws(s) URL; everything normalizes to a WebSocket URL.

use chrono::Utc;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

const DEFAULT_PATH: &str = "/compliance";

struct Args {
    target: String,
    path: String,
    insecure: bool,
    raw: bool,
}

fn usage() -> ! {
    eprintln!(
        "usage: switchboard-tap <target> [--path {DEFAULT_PATH}] [--insecure] [--raw]\n\
         \n\
         target: host or full websocket URL\n\
         (e.g. abc123.ngrok.app or wss://abc123.ngrok.app{DEFAULT_PATH})"
    );
    std::process::exit(2);
}

fn parse_args() -> Args {
    let mut target = None;
    let mut path = DEFAULT_PATH.to_string();
    let mut insecure = false;
    let mut raw = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--path" => match args.next() {
                Some(p) => path = p,
                None => usage(),
            },
            "--insecure" => insecure = true,
            "--raw" => raw = true,
            "--help" | "-h" => usage(),
            other if target.is_none() && !other.starts_with('-') => {
                target = Some(other.to_string());
            }
            _ => usage(),
        }
    }

    let Some(target) = target else { usage() };
    Args {
        target,
        path,
        insecure,
        raw,
    }
}

/// Normalizes a target into a WebSocket URL.
///
/// http/https schemes map to ws/wss; an existing ws/wss URL keeps its path
/// unless it has none, in which case `path` applies; a bare host gets the
/// scheme chosen by `use_tls` plus `path`.
fn build_ws_url(target: &str, path: &str, use_tls: bool) -> String {
    let mut normalized = target.trim().to_string();

    if let Some(rest) = normalized.strip_prefix("http://") {
        normalized = format!("ws://{rest}");
    } else if let Some(rest) = normalized.strip_prefix("https://") {
        normalized = format!("wss://{rest}");
    }

    if normalized.starts_with("ws://") || normalized.starts_with("wss://") {
        if let Ok(mut parsed) = Url::parse(&normalized) {
            if parsed.path().is_empty() || parsed.path() == "/" {
                parsed.set_path(path);
            }
            return parsed.to_string();
        }
        return normalized;
    }

    let scheme = if use_tls { "wss" } else { "ws" };
    let host = normalized.trim_matches('/');
    format!("{scheme}://{host}{path}")
}

fn format_message(message: &str, raw: bool) -> String {
    if raw {
        return message.to_string();
    }
    match serde_json::from_str::<serde_json::Value>(message) {
        Ok(payload) => serde_json::to_string_pretty(&payload).unwrap_or_else(|_| message.to_string()),
        Err(_) => message.to_string(),
    }
}

#[tokio::main]
async fn main() {
    let args = parse_args();
    let ws_url = build_ws_url(&args.target, &args.path, !args.insecure);

    println!("Connecting to {ws_url}");
    let (mut ws, _) = match connect_async(&ws_url).await {
        Ok(connection) => connection,
        Err(e) => {
            eprintln!("failed to connect to {ws_url}: {e}");
            std::process::exit(1);
        }
    };
    println!("Connected. Waiting for compliance events... (Ctrl+C to stop)");

    loop {
        tokio::select! {
            message = ws.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        println!("[{}]", Utc::now().to_rfc3339());
                        println!("{}", format_message(&text, args.raw));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        println!("[{}] <binary {} bytes>", Utc::now().to_rfc3339(), bytes.len());
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        println!("Server closed the connection.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        eprintln!("connection error: {e}");
                        std::process::exit(1);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopped.");
                break;
            }
        }
    }
}
