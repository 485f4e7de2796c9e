//! Admin CLI for the automated equities trading runtime.
//!
//! `trust run` is the long-running daemon (spec §5); every other
//! subcommand is a short-lived client that either talks to that daemon
//! over the admin Unix socket (`start`/`stop`/`pause`/`resume`/`status`,
//! `broker *`, `sync-now`, `shutdown`) or touches the local OS keychain
//! directly (`keys *`, spec §6).

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::float_arithmetic,
    clippy::arithmetic_side_effects,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

mod client;
mod config;
mod daemon;
mod ipc;
mod keys;
mod views;
mod wiring;

use clap::{Arg, ArgMatches, Command};
use config::AppConfig;
use ipc::DaemonCommand;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn build_cli() -> Command {
    Command::new("trust")
        .about("Admin CLI for the automated equities trading runtime")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Path to trust's TOML config file (default ~/.trust/config.toml)")
                .global(true),
        )
        .arg(
            Arg::new("socket")
                .long("socket")
                .value_name("PATH")
                .help("Path to the daemon's admin socket (default ~/.trust/trust.sock)")
                .global(true),
        )
        .subcommand(Command::new("run").about("Start the trading daemon in the foreground"))
        .subcommand(Command::new("start").about("Start the scheduler's evaluation and exit loops"))
        .subcommand(Command::new("stop").about("Stop the scheduler, draining both loops"))
        .subcommand(Command::new("pause").about("Pause the scheduler without stopping it"))
        .subcommand(Command::new("resume").about("Resume a paused scheduler"))
        .subcommand(Command::new("status").about("Show scheduler state and running counters"))
        .subcommand(Command::new("sync-now").about("Force an immediate position reconciliation pass"))
        .subcommand(Command::new("shutdown").about("Stop the scheduler and terminate the daemon process"))
        .subcommand(
            Command::new("broker")
                .about("Broker gateway session control")
                .subcommand_required(true)
                .subcommand(Command::new("connect").about("Open a gateway session"))
                .subcommand(Command::new("disconnect").about("Close the gateway session"))
                .subcommand(Command::new("status").about("Show the gateway connection state")),
        )
        .subcommand(
            Command::new("keys")
                .about("Manage the gateway auth token in the OS keychain")
                .subcommand_required(true)
                .subcommand(
                    Command::new("set")
                        .about("Store the gateway token for a profile")
                        .arg(Arg::new("profile").long("profile").default_value("default"))
                        .arg(Arg::new("token").long("token").value_name("TOKEN").required(false)),
                )
                .subcommand(
                    Command::new("show")
                        .about("Print whether a token is stored for a profile")
                        .arg(Arg::new("profile").long("profile").default_value("default")),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Remove the stored token for a profile")
                        .arg(Arg::new("profile").long("profile").default_value("default")),
                ),
        )
}

fn config_path(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(shellexpand::tilde("~/.trust/config.toml").into_owned()))
}

fn socket_path(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>("socket")
        .cloned()
        .unwrap_or_else(ipc::default_socket_path)
}

fn init_logging(log_dir: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::daily(log_dir, "trust.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking.and(std::io::stdout))
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();
    let config = AppConfig::load(&config_path(&matches))?;
    let socket = socket_path(&matches);

    match matches.subcommand() {
        Some(("run", _)) => {
            let _guard = init_logging(&config.log_dir());
            daemon::run(config, socket).await?;
        }
        Some(("start", _)) => dispatch(&socket, DaemonCommand::SchedulerStart).await?,
        Some(("stop", _)) => dispatch(&socket, DaemonCommand::SchedulerStop).await?,
        Some(("pause", _)) => dispatch(&socket, DaemonCommand::SchedulerPause).await?,
        Some(("resume", _)) => dispatch(&socket, DaemonCommand::SchedulerResume).await?,
        Some(("status", _)) => dispatch(&socket, DaemonCommand::SchedulerStatus).await?,
        Some(("sync-now", _)) => dispatch(&socket, DaemonCommand::SyncNow).await?,
        Some(("shutdown", _)) => dispatch(&socket, DaemonCommand::Shutdown).await?,
        Some(("broker", sub)) => match sub.subcommand() {
            Some(("connect", _)) => dispatch(&socket, DaemonCommand::BrokerConnect).await?,
            Some(("disconnect", _)) => dispatch(&socket, DaemonCommand::BrokerDisconnect).await?,
            Some(("status", _)) => dispatch(&socket, DaemonCommand::BrokerStatus).await?,
            _ => unreachable!("clap enforces a broker subcommand"),
        },
        Some(("keys", sub)) => run_keys(sub)?,
        _ => unreachable!("clap enforces a top-level subcommand"),
    }

    Ok(())
}

async fn dispatch(socket: &str, command: DaemonCommand) -> anyhow::Result<()> {
    match client::send(socket, command).await {
        Ok(response) => {
            views::print_response(&response);
            Ok(())
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn run_keys(sub: &ArgMatches) -> anyhow::Result<()> {
    match sub.subcommand() {
        Some(("set", args)) => {
            let profile = args.get_one::<String>("profile").map(String::as_str).unwrap_or("default");
            let token = match args.get_one::<String>("token") {
                Some(token) => token.clone(),
                None => dialoguer::Password::new().with_prompt("Gateway token").interact()?,
            };
            keys::store_token(profile, &token)?;
            println!("stored gateway token for profile '{profile}'");
            Ok(())
        }
        Some(("show", args)) => {
            let profile = args.get_one::<String>("profile").map(String::as_str).unwrap_or("default");
            match keys::read_token(profile) {
                Ok(_) => println!("a token is stored for profile '{profile}'"),
                Err(_) => println!("no token stored for profile '{profile}'"),
            }
            Ok(())
        }
        Some(("delete", args)) => {
            let profile = args.get_one::<String>("profile").map(String::as_str).unwrap_or("default");
            keys::delete_token(profile)?;
            println!("deleted gateway token for profile '{profile}'");
            Ok(())
        }
        _ => unreachable!("clap enforces a keys subcommand"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_requires_a_subcommand() {
        let result = build_cli().try_get_matches_from(["trust"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_registers_expected_top_level_subcommands() {
        let names: Vec<String> = build_cli().get_subcommands().map(|sc| sc.get_name().to_string()).collect();
        for expected in ["run", "start", "stop", "pause", "resume", "status", "broker", "keys", "sync-now", "shutdown"] {
            assert!(names.iter().any(|n| n == expected), "missing subcommand: {expected}");
        }
    }

    #[test]
    fn broker_requires_a_nested_subcommand() {
        let result = build_cli().try_get_matches_from(["trust", "broker"]);
        assert!(result.is_err());
    }

    #[test]
    fn keys_set_accepts_a_profile_and_token() {
        let matches = build_cli()
            .try_get_matches_from(["trust", "keys", "set", "--profile", "paper", "--token", "abc"])
            .expect("valid keys set invocation");
        let (name, sub) = matches.subcommand().expect("top-level subcommand");
        assert_eq!(name, "keys");
        let (nested, args) = sub.subcommand().expect("nested keys subcommand");
        assert_eq!(nested, "set");
        assert_eq!(args.get_one::<String>("profile").map(String::as_str), Some("paper"));
    }

    #[test]
    fn config_path_defaults_to_the_dotfile_location() {
        let matches = build_cli().try_get_matches_from(["trust", "status"]).expect("valid");
        let path = config_path(&matches);
        assert!(path.ends_with(".trust/config.toml"));
    }
}
