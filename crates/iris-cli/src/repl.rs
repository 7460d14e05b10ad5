//! REPL – Read-Eval-Print Loop for the IRIS ground station.
//!
//! Supported slash-commands:
//!   /connect [socket|bridge] [endpoint] – connect (defaults from config)
//!   /disconnect   – close the active connection
//!   /status       – connection state, dashboard line and recent log
//!   /kind [k]     – show or switch the transport kind
//!   /topics       – show the bridge topic names
//!   /clear        – clear the log panel
//!   /help         – show this list
//!   /quit | /exit – disconnect and exit

use colored::Colorize;
use std::io::{self, Write};
use std::ops::ControlFlow;
use tokio::io::{AsyncBufReadExt, BufReader};

use iris_runtime::{ConnectionController, RenderSink};
use iris_types::{ConnectionState, ImageChannel, IrisError, TransportKind};

use crate::config::Config;
use crate::terminal_sink::TerminalSink;

/// Log lines shown by `/status`.
const STATUS_LOG_LINES: usize = 5;

/// A parsed slash-command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect {
        kind: Option<TransportKind>,
        endpoint: Option<String>,
    },
    Disconnect,
    Status,
    Kind(Option<TransportKind>),
    Topics,
    Clear,
    Help,
    Quit,
}

/// Parse one input line.  Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let cmd = match head {
        "/connect" => parse_connect(&args)?,
        "/disconnect" => no_args(head, &args, Command::Disconnect)?,
        "/status" => no_args(head, &args, Command::Status)?,
        "/kind" => match args.as_slice() {
            [] => Command::Kind(None),
            [k] => Command::Kind(Some(k.parse()?)),
            _ => return Err("usage: /kind [socket|bridge]".to_string()),
        },
        "/topics" => no_args(head, &args, Command::Topics)?,
        "/clear" => no_args(head, &args, Command::Clear)?,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(format!("Unknown command '{other}'")),
    };
    Ok(Some(cmd))
}

fn parse_connect(args: &[&str]) -> Result<Command, String> {
    let looks_like_url = |s: &str| s.contains("://");
    match args {
        [] => Ok(Command::Connect { kind: None, endpoint: None }),
        [one] if looks_like_url(one) => Ok(Command::Connect {
            kind: None,
            endpoint: Some(one.to_string()),
        }),
        [one] => Ok(Command::Connect {
            kind: Some(one.parse()?),
            endpoint: None,
        }),
        [kind, endpoint] => Ok(Command::Connect {
            kind: Some(kind.parse()?),
            endpoint: Some(endpoint.to_string()),
        }),
        _ => Err("usage: /connect [socket|bridge] [endpoint]".to_string()),
    }
}

fn no_args(head: &str, args: &[&str], cmd: Command) -> Result<Command, String> {
    if args.is_empty() {
        Ok(cmd)
    } else {
        Err(format!("{head} takes no arguments"))
    }
}

/// Entry point for the interactive REPL.
///
/// Multiplexes operator input, controller events and Ctrl-C on the current
/// thread.  Returns after `/quit`, end of input or Ctrl-C, always leaving the
/// controller disconnected.
pub async fn run(mut cfg: Config) {
    let mut controller = ConnectionController::new(TerminalSink::new());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if execute_line(&line, &mut cfg, &mut controller).is_break() {
                        break;
                    }
                    prompt();
                }
                Ok(None) => break,
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    break;
                }
            },
            // Anything surfaced here has already been shown by the sink.
            _ = controller.step() => {}
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{}", "⚠  Ctrl-C received – disconnecting …".yellow().bold());
                break;
            }
        }
    }

    controller.disconnect();
    println!("{}", "Goodbye.".green());
}

/// Parse and run one line against the controller.
pub fn execute_line(
    line: &str,
    cfg: &mut Config,
    controller: &mut ConnectionController<TerminalSink>,
) -> ControlFlow<()> {
    let cmd = match parse_command(line) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return ControlFlow::Continue(()),
        Err(e) => {
            println!("{} {}. Type {} for available commands.", "Error:".red(), e, "/help".bold());
            return ControlFlow::Continue(());
        }
    };

    match cmd {
        Command::Connect { kind, endpoint } => cmd_connect(cfg, controller, kind, endpoint),
        Command::Disconnect => {
            if controller.state() == ConnectionState::Disconnected {
                println!("  {}", "Not connected.".dimmed());
            }
            controller.disconnect();
        }
        Command::Status => cmd_status(cfg, controller),
        Command::Kind(None) => println!("  Transport kind: {} ({})", cfg.kind.to_string().yellow(), cfg.endpoint()),
        Command::Kind(Some(kind)) => {
            cfg.kind = kind;
            println!(
                "  Transport kind set to {}; endpoint {}",
                kind.to_string().yellow(),
                cfg.endpoint().bold()
            );
            if controller.state() != ConnectionState::Disconnected {
                println!("  {}", "Applies to the next /connect.".dimmed());
            }
        }
        Command::Topics => cmd_topics(cfg),
        Command::Clear => controller.sink_mut().clear(),
        Command::Help => cmd_help(),
        Command::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_connect(
    cfg: &Config,
    controller: &mut ConnectionController<TerminalSink>,
    kind: Option<TransportKind>,
    endpoint: Option<String>,
) {
    let kind = kind.unwrap_or(cfg.kind);
    let endpoint = endpoint.unwrap_or_else(|| cfg.endpoint_for(kind).to_string());
    let topics = kind.uses_topics().then(|| cfg.topics.to_names());

    if let Err(e) = controller.connect(kind, &endpoint, topics) {
        let message = match &e {
            IrisError::AlreadyActive(_) => format!("{e}; use /disconnect first"),
            _ => e.to_string(),
        };
        controller.sink_mut().on_log(&message, e.severity());
    }
}

fn cmd_status(cfg: &Config, controller: &ConnectionController<TerminalSink>) {
    println!();
    println!("{}", "Ground Station Status".bold().underline());
    let state = controller.state().to_string();
    let state = match controller.state() {
        ConnectionState::Connected => state.green(),
        ConnectionState::Connecting => state.yellow(),
        ConnectionState::Disconnected => state.red(),
    };
    println!("  State     : {}", state);
    match controller.active_kind() {
        Some(kind) => println!("  Transport : {}", kind.to_string().yellow()),
        None => println!("  Transport : {} (selected)", cfg.kind.to_string().yellow()),
    }
    println!("  Endpoint  : {}", cfg.endpoint().bold());
    println!(
        "  Frames    : raw {} fps, processed {} fps",
        controller.frame_rate(ImageChannel::Raw),
        controller.frame_rate(ImageChannel::Processed)
    );
    println!("  {}", controller.sink().dashboard_line());

    let recent: Vec<_> = controller.sink().recent_logs(STATUS_LOG_LINES).collect();
    if !recent.is_empty() {
        println!("  {}", "Recent log:".bold());
        for line in recent {
            println!("    {}", format!("[{}] {}", line.timestamp, line.message).dimmed());
        }
    }
    println!();
}

fn cmd_topics(cfg: &Config) {
    println!();
    println!("{}", "Bridge Topics".bold().underline());
    println!("  raw image       : {}", cfg.topics.raw_image.cyan());
    println!("  processed image : {}", cfg.topics.processed_image.cyan());
    println!("  steering        : {}", cfg.topics.steering.cyan());
    println!("  speed           : {}", cfg.topics.speed.cyan());
    println!();
}

fn cmd_help() {
    println!();
    println!("{}", "IRIS Commands".bold().underline());
    println!("  {}  – connect (kind and endpoint default to config)", "/connect [socket|bridge] [url]".bold().cyan());
    println!("  {}                     – close the active connection", "/disconnect".bold().cyan());
    println!("  {}                         – state, telemetry and recent log", "/status".bold().cyan());
    println!("  {}         – show or switch the transport kind", "/kind [socket|bridge]".bold().cyan());
    println!("  {}                         – show bridge topic names", "/topics".bold().cyan());
    println!("  {}                          – clear the log panel", "/clear".bold().cyan());
    println!("  {}                    – disconnect and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn prompt() {
    print!("{} ", "iris>".bold().cyan());
    io::stdout().flush().ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use iris_types::Severity;

    fn last_log(controller: &ConnectionController<TerminalSink>) -> String {
        controller
            .sink()
            .recent_logs(1)
            .map(|l| l.message.clone())
            .next()
            .unwrap_or_default()
    }

    #[test]
    fn blank_line_is_ignored() {
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn connect_without_arguments_uses_config() {
        assert_eq!(
            parse_command("/connect"),
            Ok(Some(Command::Connect { kind: None, endpoint: None }))
        );
    }

    #[test]
    fn connect_accepts_kind_endpoint_or_both() {
        assert_eq!(
            parse_command("/connect bridge"),
            Ok(Some(Command::Connect {
                kind: Some(TransportKind::Bridge),
                endpoint: None
            }))
        );
        assert_eq!(
            parse_command("/connect ws://car:8080"),
            Ok(Some(Command::Connect {
                kind: None,
                endpoint: Some("ws://car:8080".to_string())
            }))
        );
        assert_eq!(
            parse_command("/connect ros ws://robot:9090"),
            Ok(Some(Command::Connect {
                kind: Some(TransportKind::Bridge),
                endpoint: Some("ws://robot:9090".to_string())
            }))
        );
    }

    #[test]
    fn connect_rejects_unknown_kind() {
        assert!(parse_command("/connect pigeon").is_err());
        assert!(parse_command("/connect socket ws://a ws://b").is_err());
    }

    #[test]
    fn kind_shows_or_switches() {
        assert_eq!(parse_command("/kind"), Ok(Some(Command::Kind(None))));
        assert_eq!(
            parse_command("/kind websocket"),
            Ok(Some(Command::Kind(Some(TransportKind::Socket))))
        );
        assert!(parse_command("/kind a b").is_err());
    }

    #[test]
    fn simple_commands_parse() {
        assert_eq!(parse_command("/disconnect"), Ok(Some(Command::Disconnect)));
        assert_eq!(parse_command("/status"), Ok(Some(Command::Status)));
        assert_eq!(parse_command("/topics"), Ok(Some(Command::Topics)));
        assert_eq!(parse_command("/clear"), Ok(Some(Command::Clear)));
        assert_eq!(parse_command("/help"), Ok(Some(Command::Help)));
        assert_eq!(parse_command("/quit"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command("/exit"), Ok(Some(Command::Quit)));
        assert!(parse_command("/status now").is_err());
        assert!(parse_command("/launch").is_err());
    }

    #[test]
    fn kind_switch_selects_that_kinds_endpoint() {
        let mut cfg = Config::default();
        let mut controller = ConnectionController::new(TerminalSink::new());
        assert!(execute_line("/kind bridge", &mut cfg, &mut controller).is_continue());
        assert_eq!(cfg.kind, TransportKind::Bridge);
        assert_eq!(cfg.endpoint(), "ws://localhost:9090");
    }

    #[test]
    fn quit_breaks_the_loop() {
        let mut cfg = Config::default();
        let mut controller = ConnectionController::new(TerminalSink::new());
        assert!(execute_line("/quit", &mut cfg, &mut controller).is_break());
        assert!(execute_line("/nope", &mut cfg, &mut controller).is_continue());
    }

    #[tokio::test]
    async fn connect_twice_reports_already_active() {
        let mut cfg = Config::default();
        let mut controller = ConnectionController::new(TerminalSink::new());

        // Nothing listens on port 9; the attempt stays Connecting until the
        // refusal arrives through step().
        execute_line("/connect socket ws://127.0.0.1:9", &mut cfg, &mut controller);
        assert_eq!(controller.state(), ConnectionState::Connecting);

        execute_line("/connect", &mut cfg, &mut controller);
        let last = last_log(&controller);
        assert!(last.contains("use /disconnect first"), "{last}");

        execute_line("/disconnect", &mut cfg, &mut controller);
        assert_eq!(controller.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn invalid_endpoint_is_reported_in_the_log() {
        let mut cfg = Config::default();
        let mut controller = ConnectionController::new(TerminalSink::new());
        execute_line("/connect socket http://not-a-websocket", &mut cfg, &mut controller);
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        let last = last_log(&controller);
        assert!(last.contains("Connect Error"), "{last}");
    }

    #[test]
    fn clear_leaves_only_the_cleared_marker() {
        let mut cfg = Config::default();
        let mut controller = ConnectionController::new(TerminalSink::new());
        controller.sink_mut().on_log("old", Severity::Info);
        execute_line("/clear", &mut cfg, &mut controller);
        assert_eq!(controller.sink().recent_logs(10).count(), 1);
    }
}
