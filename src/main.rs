//! lockbox - lock-coordinated session store
//!
//! CLI entry point. Operates on the filesystem adapters under the configured
//! data directory.

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lockbox::cli::{parse_item, SessionAction, SessionCommand, SessionOptions};
use lockbox::config::Config;
use lockbox::core::{LockToken, SessionManager};
use lockbox::error::exit_codes;
use lockbox::storage::{FileBlobStore, FileMetadataStore};

// =============================================================================
// CLI Definition
// =============================================================================

/// lockbox - lock-coordinated session store
#[derive(Parser)]
#[command(name = "lockbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Application name (defaults to session.application_name from config)
    #[arg(long, short, global = true)]
    app: Option<String>,
    /// Output as JSON
    #[arg(long, short, global = true)]
    json: bool,
    /// Suppress output
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Session addressed by a command.
#[derive(Args, Debug)]
struct Target {
    /// Session ID
    id: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an uninitialized session
    Create {
        #[command(flatten)]
        target: Target,
        /// Session lifetime in minutes
        #[arg(long, default_value_t = 20, allow_negative_numbers = true)]
        timeout: i32,
    },

    /// Read a session without locking it
    Get {
        #[command(flatten)]
        target: Target,
    },

    /// Lock a session and read it
    Acquire {
        #[command(flatten)]
        target: Target,
    },

    /// Release a lock without changing the session
    Release {
        #[command(flatten)]
        target: Target,
        /// Lock token returned by acquire
        #[arg(long)]
        token: u32,
    },

    /// Store items and release the lock
    Set {
        #[command(flatten)]
        target: Target,
        /// Items as key=value
        #[arg(value_parser = parse_item)]
        items: Vec<(String, String)>,
        /// Lock token returned by acquire (ignored with --new)
        #[arg(long, default_value_t = 0)]
        token: u32,
        /// Session lifetime in minutes
        #[arg(long, default_value_t = 20, allow_negative_numbers = true)]
        timeout: i32,
        /// Insert a new session instead of updating a locked one
        #[arg(long)]
        new: bool,
    },

    /// Refresh the expiry of a session
    Touch {
        #[command(flatten)]
        target: Target,
    },

    /// Delete a session and its payloads
    Remove {
        #[command(flatten)]
        target: Target,
        /// Lock token returned by acquire
        #[arg(long)]
        token: u32,
    },

    /// Show the stored record of a session
    Inspect {
        #[command(flatten)]
        target: Target,
    },
}

impl Commands {
    /// Split into the addressed session id and the action to run.
    fn into_action(self) -> (String, SessionAction) {
        match self {
            Commands::Create { target, timeout } => (
                target.id,
                SessionAction::Create {
                    timeout_minutes: timeout,
                },
            ),
            Commands::Get { target } => (target.id, SessionAction::Get),
            Commands::Acquire { target } => (target.id, SessionAction::Acquire),
            Commands::Release { target, token } => (
                target.id,
                SessionAction::Release {
                    token: LockToken(token),
                },
            ),
            Commands::Set {
                target,
                items,
                token,
                timeout,
                new,
            } => (
                target.id,
                SessionAction::Set {
                    token: LockToken(token),
                    items,
                    timeout_minutes: timeout,
                    is_new: new,
                },
            ),
            Commands::Touch { target } => (target.id, SessionAction::Touch),
            Commands::Remove { target, token } => (
                target.id,
                SessionAction::Remove {
                    token: LockToken(token),
                },
            ),
            Commands::Inspect { target } => (target.id, SessionAction::Inspect),
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    init_tracing();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("lockbox error: {}", e);
            ExitCode::from(exit_codes::FAILURE as u8)
        }
    }
}

/// Install a stderr subscriber filtered by `LOCKBOX_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOCKBOX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load()?;
    config.validate()?;

    let application_name = cli
        .app
        .clone()
        .unwrap_or_else(|| config.session.application_name.clone());
    let options = SessionOptions {
        json: cli.json,
        quiet: cli.quiet,
    };

    let manager = SessionManager::new(
        FileMetadataStore::from_config(&config.storage)?,
        FileBlobStore::from_config(&config.storage)?,
    )
    .with_config(&config)
    .open()?;

    let (session_id, action) = cli.command.into_action();
    let cmd = SessionCommand::new(manager);
    let output = cmd.run(&session_id, &application_name, &action);
    let formatted = cmd.format_output(&output, &options);

    if !formatted.is_empty() {
        if output.success {
            println!("{}", formatted);
        } else {
            eprintln!("{}", formatted);
        }
    }

    Ok(exit_code(output.exit_code))
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(exit_codes::FAILURE as u8))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_codes::OK, 0);
        assert_eq!(exit_codes::FAILURE, 1);
        assert_eq!(exit_codes::LOCKED, 2);
        assert_eq!(exit_codes::NOT_FOUND, 3);
    }

    #[test]
    fn test_exit_code_conversion() {
        assert_eq!(exit_code(exit_codes::LOCKED), ExitCode::from(2));
        assert_eq!(exit_code(-1), ExitCode::from(exit_codes::FAILURE as u8));
    }

    #[test]
    fn test_cli_parse_create() {
        let cli = Cli::parse_from(["lockbox", "create", "abc", "--app", "app1", "--timeout", "30"]);
        assert_eq!(cli.app.as_deref(), Some("app1"));
        let (id, action) = cli.command.into_action();
        assert_eq!(id, "abc");
        assert_eq!(action, SessionAction::Create { timeout_minutes: 30 });
    }

    #[test]
    fn test_cli_parse_create_negative_timeout() {
        let cli = Cli::parse_from(["lockbox", "create", "abc", "--timeout", "-1"]);
        let (_, action) = cli.command.into_action();
        assert_eq!(action, SessionAction::Create { timeout_minutes: -1 });
    }

    #[test]
    fn test_cli_parse_set() {
        let cli = Cli::parse_from([
            "lockbox", "set", "abc", "x=1", "user=ada", "--token", "3", "--json",
        ]);
        assert!(cli.json);
        let (id, action) = cli.command.into_action();
        assert_eq!(id, "abc");
        assert_eq!(
            action,
            SessionAction::Set {
                token: LockToken(3),
                items: vec![
                    ("x".to_string(), "1".to_string()),
                    ("user".to_string(), "ada".to_string())
                ],
                timeout_minutes: 20,
                is_new: false,
            }
        );
    }

    #[test]
    fn test_cli_parse_set_rejects_bad_item() {
        assert!(Cli::try_parse_from(["lockbox", "set", "abc", "novalue"]).is_err());
    }

    #[test]
    fn test_cli_parse_release_requires_token() {
        assert!(Cli::try_parse_from(["lockbox", "release", "abc"]).is_err());
        let cli = Cli::parse_from(["lockbox", "release", "abc", "--token", "7", "-q"]);
        assert!(cli.quiet);
        let (_, action) = cli.command.into_action();
        assert_eq!(
            action,
            SessionAction::Release {
                token: LockToken(7)
            }
        );
    }

    #[test]
    fn test_cli_parse_simple_commands() {
        for (name, expected) in [
            ("get", SessionAction::Get),
            ("acquire", SessionAction::Acquire),
            ("touch", SessionAction::Touch),
            ("inspect", SessionAction::Inspect),
        ] {
            let cli = Cli::parse_from(["lockbox", name, "abc"]);
            let (id, action) = cli.command.into_action();
            assert_eq!(id, "abc");
            assert_eq!(action, expected);
        }
    }

    #[test]
    fn test_cli_parse_remove() {
        let cli = Cli::parse_from(["lockbox", "remove", "abc", "--token", "2"]);
        let (_, action) = cli.command.into_action();
        assert_eq!(
            action,
            SessionAction::Remove {
                token: LockToken(2)
            }
        );
    }
}
