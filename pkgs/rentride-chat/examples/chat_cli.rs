use anyhow::Context;
use clap::{Parser, ValueEnum};
use rentride_chat::{
    ChatConfig, ChatEvent, ChatSession, EntryState, Identity, LocalSeq, LogEntry,
};
use rentride_store::{Actor, ConversationStore, MemoryBackend, Role};
use rentride_transport::{memory_pair, ClientFrame, MemoryServer, ServerFrame, TransportChannel};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Customer,
    Host,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Customer => Role::Customer,
            RoleArg::Host => Role::Host,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "RentRide chat client", long_about = None)]
struct Args {
    /// Actor id to log in as
    #[arg(short, long, default_value = "u1")]
    actor: String,

    /// Display name
    #[arg(short, long, default_value = "Uma")]
    name: String,

    #[arg(short, long, value_enum, default_value = "customer")]
    role: RoleArg,

    /// Bearer token for the REST API (defaults to RENTRIDE_TOKEN)
    #[arg(short, long)]
    token: Option<String>,

    /// Run against an in-process marketplace instead of a server
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();
    let actor = Actor::new(args.actor.clone(), args.name.clone(), args.role.into());
    let config = ChatConfig::from_env()?;

    let (session, mut events) = if args.demo {
        start_demo(actor, config)?
    } else {
        let token = args
            .token
            .or_else(|| std::env::var("RENTRIDE_TOKEN").ok())
            .context("no token given, pass --token or set RENTRIDE_TOKEN")?;
        ChatSession::login(Identity::new(actor, token), config)?
    };

    println!("Logged in as {} ({})", args.name, args.actor);
    print_help();
    prompt();

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                handle_event(&session, event);
            }
            read = stdin.read_line(&mut line) => {
                if read? == 0 {
                    break;
                }
                let input = line.trim().to_string();
                line.clear();

                if input.is_empty() {
                    prompt();
                    continue;
                }
                if let Some(command) = input.strip_prefix('/') {
                    if !handle_command(&session, command).await {
                        break;
                    }
                } else {
                    send_to_active(&session, &input).await;
                }
                prompt();
            }
        }
    }

    session.shutdown().await;
    println!("Bye");
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

fn print_help() {
    println!("Commands:");
    println!("  /contacts        list who you can chat with");
    println!("  /select <id>     open a conversation");
    println!("  /log             show the open conversation by day");
    println!("  /typing          signal a keystroke to the open conversation");
    println!("  /retry <n>       retry failed message local-<n>");
    println!("  /unread          unread counters");
    println!("  /quit            log out");
    println!("  <text>           send to the open conversation");
}

async fn handle_command(session: &ChatSession, command: &str) -> bool {
    let mut parts = command.splitn(2, ' ');
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match name {
        "contacts" => {
            let directory = session.resolve_contacts().await;
            if directory.degraded {
                println!("(some contacts could not be loaded)");
            }
            for entry in &directory.entries {
                let marker = if entry.is_placeholder { " *" } else { "" };
                println!(
                    "  {:<10} {:<20} {:?}{}",
                    entry.actor.id, entry.actor.display_name, entry.relationship, marker
                );
            }
        }
        "select" => match session.select_peer(arg).await {
            Ok(outcome) => {
                println!("Opened conversation with {arg}: {outcome:?}");
                print_log(&session.log(arg));
            }
            Err(e) => eprintln!("✗ {e}"),
        },
        "log" => match session.active_peer() {
            Some(peer_id) => {
                for group in session.local_day_groups(&peer_id) {
                    println!("── {} ──", group.date);
                    print_log(&group.entries);
                }
            }
            None => println!("No conversation open"),
        },
        "typing" => session.notify_keystroke(),
        "retry" => match (session.active_peer(), arg.parse::<u64>()) {
            (Some(peer_id), Ok(n)) => match session.retry_message(&peer_id, LocalSeq(n)).await {
                Ok(message) => println!("✓ Delivered as {}", message.id),
                Err(e) => eprintln!("✗ {e}"),
            },
            (None, _) => println!("No conversation open"),
            (_, Err(_)) => println!("Usage: /retry <n>"),
        },
        "unread" => {
            for (peer_id, count) in session.unread_counts() {
                println!("  {peer_id}: {count}");
            }
            match session.server_unread_total().await {
                Ok(total) => println!("  server total: {total}"),
                Err(e) => eprintln!("✗ {e}"),
            }
        }
        "quit" | "exit" => return false,
        "help" => print_help(),
        other => println!("Unknown command: /{other}"),
    }
    true
}

async fn send_to_active(session: &ChatSession, text: &str) {
    let Some(peer_id) = session.active_peer() else {
        println!("Open a conversation first with /select <id>");
        return;
    };
    if let Err(e) = session.send_message(&peer_id, text).await {
        eprintln!("✗ {e}");
    }
}

fn handle_event(session: &ChatSession, event: ChatEvent) {
    match event {
        ChatEvent::EntryAppended { entry, .. } if entry.sender_id != session.actor_id() => {
            println!("\n{}: {}", entry.sender_id, entry.body);
            prompt();
        }
        ChatEvent::EntryFailed { seq, reason, .. } => {
            println!("\n✗ message {seq} failed: {reason} (use /retry {})", seq.0);
            prompt();
        }
        ChatEvent::UnreadChanged { peer_id, unread } if unread > 0 => {
            println!("\n● {peer_id} has {unread} unread");
            prompt();
        }
        ChatEvent::TypingChanged { peer_id, typing } => {
            if typing {
                println!("\n{peer_id} is typing...");
                prompt();
            }
        }
        ChatEvent::TransportStateChanged { state } => {
            println!("\n[push channel {state}]");
            prompt();
        }
        _ => {}
    }
}

fn print_log(entries: &[LogEntry]) {
    for entry in entries {
        let status = match &entry.state {
            EntryState::Pending => " (sending)",
            EntryState::Failed { .. } => " (failed)",
            EntryState::Confirmed | EntryState::Received => "",
        };
        println!(
            "  [{}] {}: {}{}",
            entry.created_at.format("%H:%M"),
            entry.sender_id,
            entry.body,
            status
        );
    }
}

/// Marketplace with one booking, a support admin and an auto-replying server
fn start_demo(
    actor: Actor,
    config: ChatConfig,
) -> anyhow::Result<(ChatSession, tokio::sync::mpsc::UnboundedReceiver<ChatEvent>)> {
    let backend = MemoryBackend::new();
    backend.add_actor(Actor::new("u1", "Uma", Role::Customer));
    backend.add_actor(Actor::new("h1", "Hana", Role::Host));
    backend.add_actor(Actor::new("a1", "Ada", Role::Admin));
    backend.add_actor(actor.clone());
    backend.add_booking("h1", "u1");

    let (connector, server) = memory_pair();
    tokio::spawn(auto_reply(backend.clone(), server));

    let transport = TransportChannel::new(Arc::new(connector), config.transport_config());
    let store = Arc::new(backend.session(&actor.id));
    let session = ChatSession::start(Identity::new(actor, "demo"), config, store, transport)?;
    Ok(session)
}

/// Answer every pushed message on behalf of its receiver
async fn auto_reply(backend: MemoryBackend, mut server: MemoryServer) {
    while let Some(mut end) = server.accept().await {
        while let Some(frame) = end.recv().await {
            let ClientFrame::SendMessage {
                sender_id,
                receiver_id,
                body,
            } = frame
            else {
                continue;
            };

            let _ = end.push(&ServerFrame::UserTyping {
                sender_id: receiver_id.clone(),
            });
            tokio::time::sleep(Duration::from_millis(1200)).await;

            let reply = format!("Thanks, got \"{body}\"");
            match backend
                .session(&receiver_id)
                .send_message(&sender_id, &reply)
                .await
            {
                Ok(message) => {
                    let _ = end.push(&ServerFrame::UserStopTyping {
                        sender_id: receiver_id,
                    });
                    let _ = end.push(&ServerFrame::ReceiveMessage {
                        sender_id: message.sender_id,
                        body: message.body,
                        timestamp: message.created_at,
                    });
                }
                Err(e) => eprintln!("demo server could not reply: {e}"),
            }
        }
    }
}
