//! chatrag entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Load config
//!   4. Init logger (CLI `-v` flags > env > config)
//!   5. Build the model manager (documents, index, provider, worker)
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Start channels (web when enabled, console with `-i`)
//!   8. Join channels
//!   9. Stop the chat worker

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use chatrag::config::{self, Config};
use chatrag::error::AppError;
use chatrag::index::IndexStats;
use chatrag::session::ModelManager;
use chatrag::{comms, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        app = %config.app_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        interactive = args.interactive,
        "config loaded"
    );

    let shutdown = CancellationToken::new();

    let manager = Arc::new(ModelManager::new(config, shutdown.clone()).await?);
    let stats = manager.index_stats().await.unwrap_or_default();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    print_startup_summary(manager.config(), &manager, &stats, args.interactive).await;

    let channels = comms::start(Arc::clone(&manager), args.interactive, shutdown.clone());
    let result = channels.join().await;

    shutdown.cancel();
    manager.shutdown().await;

    if args.interactive {
        use std::io::Write as _;
        println!("\nBye :) ...");
        let _ = std::io::stdout().flush();
    }
    result
}

async fn print_startup_summary(config: &Config, manager: &ModelManager, stats: &IndexStats, interactive: bool) {
    let fit = |text: String| -> String {
        const WIDTH: usize = 58;
        if text.chars().count() >= WIDTH {
            let mut out = text.chars().take(WIDTH - 1).collect::<String>();
            out.push('…');
            out
        } else {
            format!("{text:<WIDTH$}")
        }
    };

    let settings = manager.settings().await;
    let github = manager.github_repo().await;
    let web = if config.server.enabled {
        format!("🌐 web: http://{}", config.server.bind)
    } else {
        "🌐 web: disabled".to_string()
    };
    let console = if interactive { "⌨️  console: enabled (e to exit)" } else { "⌨️  console: disabled" };
    let github_line = if github.is_complete() { github.to_string() } else { "not configured".to_string() };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ 📚 chatrag                                                   ║");
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🧾 App: {:<52}║", config.app_name);
    println!("║ 📁 Work dir: {:<47}║", config.work_dir.display().to_string());
    println!("║ 🧠 PID: {:<52}║", std::process::id());
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 📡 Channels                                                  ║");
    println!("║   {}║", fit(web));
    println!("║   {}║", fit(console.to_string()));
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🤖 Model                                                     ║");
    println!("║   {}║", fit(format!("provider={} model={}", settings.provider, settings.model)));
    println!(
        "║   {}║",
        fit(format!(
            "temp={} max_tokens={} top_p={} ctx={}",
            settings.temperature, settings.max_tokens, settings.top_p, settings.context_window
        ))
    );
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🗂️  Index                                                     ║");
    println!(
        "║   {}║",
        fit(format!(
            "{} docs, {} chunks, {} embedded",
            stats.documents, stats.chunks, stats.embedded_chunks
        ))
    );
    println!("║   {}║", fit(format!("github: {github_line}")));
    println!("╚══════════════════════════════════════════════════════════════╝");
}

struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: chatrag [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Also run the console chat on stdin");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, interactive, config_path }
}
