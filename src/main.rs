use ssc_chat::logger::{self, LogConfig};
use ssc_chat::{
    spawn_session, RendezvousFactory, Sender, SessionConfig, SessionHandle, SessionSnapshot, Status,
};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

#[derive(Debug, PartialEq)]
enum Input<'a> {
    Connect(&'a str),
    Recover,
    Status,
    Quit,
    Say(&'a str),
    Unknown(&'a str),
    Blank,
}

fn parse_line(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Say(line);
    };
    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, arg)| (name, arg.trim()));
    match name {
        "connect" => Input::Connect(arg),
        "recover" => Input::Recover,
        "status" => Input::Status,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(name),
    }
}

fn status_lines(snapshot: &SessionSnapshot) -> Vec<String> {
    let id = if snapshot.self_id.is_empty() {
        "-"
    } else {
        snapshot.self_id.as_str()
    };
    let mut lines = vec![match &snapshot.partner_id {
        Some(partner) => format!("* {} (you: {id}, peer: {partner})", snapshot.status),
        None => format!("* {} (you: {id})", snapshot.status),
    }];
    if let Some(err) = &snapshot.last_error {
        lines.push(format!("! {err}"));
    }
    if snapshot.status.needs_recovery() {
        lines.push("* type /recover to register again".into());
    }
    lines
}

fn print_status(snapshot: &SessionSnapshot) {
    for line in status_lines(snapshot) {
        println!("{line}");
    }
}

/// Prints status changes and new messages until the session ends.
async fn render(mut snapshots: watch::Receiver<SessionSnapshot>) {
    let mut shown = SessionSnapshot::default();
    let mut seen = 0;
    loop {
        let current = snapshots.borrow_and_update().clone();
        if current.status != shown.status
            || current.self_id != shown.self_id
            || current.last_error != shown.last_error
        {
            print_status(&current);
        }
        for message in current.messages_since(seen) {
            let who = match message.sender() {
                Sender::Me => "me",
                Sender::Partner => current.partner_id.as_deref().unwrap_or("peer"),
            };
            println!("[{}] {who}: {}", message.at().format("%H:%M:%S"), message.text());
        }
        seen = current.messages.len();
        shown = current;
        if snapshots.changed().await.is_err() {
            break;
        }
    }
}

async fn handle(session: &SessionHandle, input: Input<'_>) -> bool {
    let outcome = match input {
        Input::Blank => Ok(()),
        Input::Connect(peer_id) => session.connect(peer_id).await,
        Input::Recover => session.recover(),
        Input::Status => {
            print_status(&session.snapshot());
            Ok(())
        }
        Input::Say(text) => session.send(text).await,
        Input::Unknown(name) => {
            println!("? unknown command /{name} (try /connect <id>, /recover, /status, /quit)");
            Ok(())
        }
        Input::Quit => return false,
    };
    if let Err(e) = outcome {
        println!("! {e}");
    }
    true
}

#[tokio::main]
async fn main() -> ExitCode {
    logger::init(LogConfig::default());

    let config = match std::env::args().nth(1) {
        Some(path) => match SessionConfig::from_json_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => SessionConfig::default(),
    };

    let (session, task) = spawn_session(config, Box::new(RendezvousFactory));
    let renderer = tokio::spawn(render(session.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !handle(&session, parse_line(&line)).await {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("stdin: {e}");
                break;
            }
        }
    }

    let _ = session.shutdown();
    let _ = task.await;
    drop(session);
    let _ = renderer.await;
    ExitCode::SUCCESS
}
