use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{
    load_settings, AnonymousIdentity, Identity, IdentityProvider, Session, SessionController,
    StaticIdentity, WebSocketTransport,
};
use shared::{
    domain::{LogKind, SessionStatus},
    error::ErrorCode,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Runs one research session and prints its progress.
#[derive(Parser, Debug)]
struct Args {
    /// Overrides the configured research endpoint.
    #[arg(long)]
    endpoint: Option<String>,
    /// Signs in as this user before starting.
    #[arg(long)]
    user: Option<String>,
    topic: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(endpoint) = args.endpoint {
        settings.endpoint = endpoint;
    }
    let identity: Arc<dyn IdentityProvider> = match args.user {
        Some(user_id) => Arc::new(StaticIdentity::new(Identity {
            user_id,
            email: None,
        })),
        None => Arc::new(AnonymousIdentity),
    };

    let controller =
        SessionController::new_with_dependencies(&settings, Arc::new(WebSocketTransport), identity)?;
    let started = controller.start(&args.topic)?;
    println!("Researching \"{}\" via {}", started.snapshot.topic(), controller.endpoint());

    let mut updates = started.updates;
    let mut printer = Printer::default();
    let mut last = started.snapshot;
    loop {
        tokio::select! {
            next = updates.next() => match next {
                Some(snapshot) => {
                    printer.print_new(&snapshot);
                    let done = snapshot.is_terminal();
                    last = snapshot;
                    if done {
                        break;
                    }
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "ctrl-c handler failed");
                }
                controller.cancel();
            }
        }
    }

    Ok(finish(&last))
}

/// Tracks what has been printed so each snapshot only adds new lines.
#[derive(Default)]
struct Printer {
    logs: usize,
    sources: usize,
    stage: Option<String>,
}

impl Printer {
    fn print_new(&mut self, session: &Session) {
        if let Some(stage) = session.stage() {
            if self.stage.as_deref() != Some(stage) {
                println!("[{stage}]");
                self.stage = Some(stage.to_string());
            }
        }
        for entry in session.log_lines().iter().skip(self.logs) {
            let marker = match entry.kind {
                LogKind::Error => "!",
                LogKind::Info => " ",
            };
            println!("{marker} {}", entry.message);
        }
        self.logs = session.log_lines().len();
        for source in session.sources().iter().skip(self.sources) {
            println!("  source: {source}");
        }
        self.sources = session.sources().len();
    }
}

fn finish(session: &Session) -> ExitCode {
    match session.status() {
        SessionStatus::Completed => {
            println!();
            println!("{}", session.report().unwrap_or_default());
            ExitCode::SUCCESS
        }
        SessionStatus::Cancelled => {
            eprintln!("research cancelled");
            ExitCode::from(130)
        }
        status => {
            let message = session.terminal_error().unwrap_or("no report received");
            match session.error_code() {
                Some(code) => eprintln!("research {status} [{code}]: {message}"),
                None => eprintln!("research {status}: {message}"),
            }
            match session.error_code() {
                // EX_TEMPFAIL: the server was busy, a later retry may succeed.
                Some(ErrorCode::RateLimited) => ExitCode::from(75),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
