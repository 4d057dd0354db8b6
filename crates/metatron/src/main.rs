// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metatron - a queue-backed generation bot.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use metatron_config::MetatronConfig;
use metatron_core::{AdmissionKey, UserStateStore};
use metatron_jobs::render;
use metatron_storage::JsonUserStore;

/// Metatron - a queue-backed generation bot.
#[derive(Parser, Debug)]
#[command(name = "metatron", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bot: queue processor, Telegram surface, and Twitch bridge.
    Serve,
    /// Toggle the ban flag for a user id without starting the bot.
    Ban {
        /// Telegram user id, or an external key such as `twitch`.
        id: String,
    },
    /// Print the effective configuration with secrets hidden.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> MetatronConfig {
    let loaded = match path {
        Some(path) => metatron_config::load_and_validate_path(path),
        None => metatron_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            metatron_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Ban { id }) => {
            let store = JsonUserStore::new(&config.history.users_dir);
            match store.toggle_ban(&AdmissionKey::from(id.as_str())).await {
                Ok(banned) => println!("{}", render::ban_toggled(&id, banned)),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Config) => match metatron_config::render_redacted(&config) {
            Ok(rendered) => print!("{rendered}"),
            Err(e) => {
                eprintln!("error: failed to render config: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("metatron: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_parses_ban_with_global_config() {
        let cli = Cli::try_parse_from(["metatron", "ban", "42", "--config", "bot.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("bot.toml")));
        assert!(matches!(cli.command, Some(Commands::Ban { id }) if id == "42"));
    }

    #[test]
    fn cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
