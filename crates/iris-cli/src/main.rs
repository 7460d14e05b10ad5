//! `iris-cli` – IRIS ground-station command line interface.
//!
//! This binary is the operator's entry point.  It:
//!
//! 1. Initialises structured logging (stderr, optional OTLP export).
//! 2. Loads `~/.iris/config.toml`, writing the defaults on first run.
//! 3. Drops the operator into an **interactive REPL** with slash-commands
//!    (`/connect`, `/disconnect`, `/status`, `/kind`, `/topics`, `/help`)
//!    while telemetry and frame rates stream in from the vehicle.
//! 4. Intercepts **Ctrl-C** to disconnect cleanly and exit.

mod config;
mod repl;
mod terminal_sink;

use colored::Colorize;
use std::time::Duration;
use tracing::{error, warn};

/// How long pending blocking work (stdin, image decodes) may delay exit.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn main() {
    // Held for the whole process; dropping it flushes pending spans.
    let tracing_guard = iris_runtime::init_tracing("iris");

    print_banner();
    if tracing_guard.is_exporting() {
        println!("  {}", "Exporting traces over OTLP".dimmed());
    }
    let cfg = load_or_create_config();

    println!(
        "  Transport {} at {}",
        cfg.kind.to_string().bold(),
        cfg.endpoint().bold()
    );
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // One thread: every state change happens inside the controller.
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            eprintln!("{}: {}", "Failed to start runtime".red(), e);
            std::process::exit(1);
        }
    };
    runtime.block_on(repl::run(cfg));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

fn load_or_create_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => {
                    warn!(error = %e, "could not write default config");
                    println!("{}: {}", "Error saving config".red(), e);
                }
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            warn!(error = %e, "config unreadable, using defaults");
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___ ____  ___ ____  "#.bold().cyan());
    println!("{}", r#"  |_ _|  _ \|_ _/ ___| "#.bold().cyan());
    println!("{}", r#"   | || |_) || |\___ \ "#.bold().cyan());
    println!("{}", r#"   | ||  _ < | | ___) |"#.bold().cyan());
    println!("{}", r#"  |___|_| \_\___|____/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "IRIS".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Autonomous Vehicle Ground Station");
    println!();
}
