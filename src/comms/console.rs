//! Console channel: reads lines from stdin, sends each one through the chat
//! worker and prints the reply.
//!
//! Typing `e` (either case) exits the whole application by cancelling the
//! shared shutdown token. Closing stdin only ends this channel.

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};
use crate::session::ModelManager;

pub struct ConsoleChannel {
    channel_id: String,
    manager: Arc<ModelManager>,
}

impl ConsoleChannel {
    pub fn new(channel_id: impl Into<String>, manager: Arc<ModelManager>) -> Self {
        Self { channel_id: channel_id.into(), manager }
    }
}

impl Component for ConsoleChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_console(self.channel_id, self.manager, shutdown))
    }
}

/// What a console line asks for.
#[derive(Debug, PartialEq, Eq)]
enum ConsoleInput<'a> {
    Exit,
    Skip,
    Message(&'a str),
}

fn classify(line: &str) -> ConsoleInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        ConsoleInput::Skip
    } else if line.eq_ignore_ascii_case("e") {
        ConsoleInput::Exit
    } else {
        ConsoleInput::Message(line)
    }
}

async fn run_console(
    channel_id: String,
    manager: Arc<ModelManager>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "console channel started");
    println!("─────────────────────────────────");
    println!(" chatrag console  (e to exit)");
    println!("─────────────────────────────────");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!(%channel_id, "console channel shutting down");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("console read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("console stdin closed");
                        break;
                    }
                    Ok(Some(line)) => match classify(&line) {
                        ConsoleInput::Skip => continue,
                        ConsoleInput::Exit => {
                            info!("console exit requested");
                            shutdown.cancel();
                            break;
                        }
                        ConsoleInput::Message(input) => {
                            debug!(input, "console received line");
                            let reply = manager.process_input(input).await;
                            println!("{reply}");
                        }
                    },
                }
            }
        }
    }
    Ok(())
}
