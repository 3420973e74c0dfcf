//-
// Copyright (c) 2023, Jason Lingle
//
// This file is part of Maildepot.
//
// Maildepot is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Maildepot is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or
// FITNESS FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License
// for more details.
//
// You should have received a copy of the GNU General Public License along with
// Maildepot. If not, see <http://www.gnu.org/licenses/>.

use std::path::{Path, PathBuf};

use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use structopt::StructOpt;

use crate::model::folder::Role;
use crate::support::context::Context;
use crate::support::log_prefix::LogPrefix;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;
use crate::usecase::Depot;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// The system configuration file. Relative storage paths inside it are
    /// resolved against its directory, which is also where `logging.toml`
    /// is looked for.
    #[structopt(
        long,
        parse(from_os_str),
        default_value = "maildepot.toml"
    )]
    config: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Manage accounts.
    Account(AccountSubcommand),
    /// Manage the folders of an account.
    Folder(FolderSubcommand),
}

#[derive(StructOpt)]
pub(super) enum AccountSubcommand {
    /// List all accounts, oldest first.
    List,
    /// Create a new, empty account.
    Create {
        /// Name of the account to create.
        name: String,
    },
    /// Delete an account along with all its folders.
    ///
    /// Messages which were filed in the account's folders are not deleted.
    Delete {
        /// Name of the account to delete.
        name: String,
    },
}

#[derive(StructOpt)]
pub(super) struct FolderPathOptions {
    /// The account owning the folder.
    pub(super) account: String,
    /// The full, `/`-separated path of the folder.
    pub(super) path: String,
}

#[derive(StructOpt)]
pub(super) enum FolderSubcommand {
    /// List the folders of an account as a tree, with message counts.
    List {
        /// The account whose folders to list.
        account: String,
    },
    /// Create a folder. Missing parent folders are created as well.
    Create {
        #[structopt(flatten)]
        folder: FolderPathOptions,
        /// A special-use role for the folder, e.g. `Sent` or `Trash`.
        role: Option<Role>,
    },
    /// Rename or move a folder, along with everything below it.
    Rename {
        /// The account owning the folder.
        account: String,
        /// The current path of the folder.
        old: String,
        /// The new path of the folder.
        new: String,
    },
    /// Delete a folder.
    Delete {
        #[structopt(flatten)]
        folder: FolderPathOptions,
        /// Also delete any folders below this one.
        #[structopt(long)]
        recursive: bool,
    },
    /// Mark a folder as subscribed.
    Subscribe(FolderPathOptions),
    /// Mark a folder as not subscribed.
    Unsubscribe(FolderPathOptions),
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options =
        Options::from_clap(&match Options::clap().get_matches_safe() {
            Ok(matches) => matches,
            Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::HelpDisplayed,
                    ..
                },
            )
            | Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::VersionDisplayed,
                    ..
                },
            ) => {
                println!("{}", e.message);
                return;
            },
            Err(e) => {
                eprintln!("{}", e.message);
                EX_USAGE.exit()
            },
        });

    let config = match SystemConfig::load(&options.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Error loading config file at '{}': {}",
                options.config.display(),
                e
            );
            EX_CONFIG.exit()
        },
    };

    init_logging(&options.config, &config);

    let depot = match Depot::open(&config, LogPrefix::new("cli")) {
        Ok(depot) => depot,
        Err(e) => {
            eprintln!("Error opening storage: {e}");
            Sysexit::for_error(&e).exit()
        },
    };

    let ctx = Context::background();
    let result = match options.command {
        Command::Account(cmd) => super::account::run(&depot, &ctx, cmd),
        Command::Folder(cmd) => super::folder::run(&depot, &ctx, cmd),
    };

    if let Err(e) = result {
        eprintln!("{e}");
        Sysexit::for_error(&e).exit();
    }
}

fn init_logging(config_path: &Path, config: &SystemConfig) {
    let log_config_file = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) =
            log4rs::init_file(&log_config_file, Default::default())
        {
            eprintln!(
                "Error in logging config at '{}': {}",
                log_config_file.display(),
                e
            );
            EX_CONFIG.exit();
        }
        return;
    }

    let level = match config.logging.level.parse::<log::LevelFilter>() {
        Ok(level) => level,
        Err(_) => {
            eprintln!("Unknown log level {:?}", config.logging.level);
            EX_CONFIG.exit()
        },
    };

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S%.3f)} [{l}][{t}] {m}{n}",
        )))
        .build();
    let log_config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level));

    if let Err(e) = log_config
        .map_err(|e| e.to_string())
        .and_then(|c| log4rs::init_config(c).map_err(|e| e.to_string()))
    {
        eprintln!("Failed to initialise logging: {e}");
        EX_SOFTWARE.exit();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        Options::from_iter_safe(
            std::iter::once("maildepot").chain(args.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn parse_command_lines() {
        let options = parse(&["account", "create", "alice"]);
        assert_eq!(PathBuf::from("maildepot.toml"), options.config);
        match options.command {
            Command::Account(AccountSubcommand::Create { name }) => {
                assert_eq!("alice", name);
            },
            _ => panic!("parsed as the wrong subcommand"),
        }

        let options = parse(&[
            "--config",
            "/etc/maildepot/maildepot.toml",
            "folder",
            "create",
            "alice",
            "Sent Items",
            "sent",
        ]);
        assert_eq!(
            PathBuf::from("/etc/maildepot/maildepot.toml"),
            options.config
        );
        match options.command {
            Command::Folder(FolderSubcommand::Create { folder, role }) => {
                assert_eq!("alice", folder.account);
                assert_eq!("Sent Items", folder.path);
                assert_eq!(Some(Role::Sent), role);
            },
            _ => panic!("parsed as the wrong subcommand"),
        }

        match parse(&["folder", "delete", "--recursive", "bob", "Work"])
            .command
        {
            Command::Folder(FolderSubcommand::Delete { folder, recursive }) => {
                assert_eq!("Work", folder.path);
                assert!(recursive);
            },
            _ => panic!("parsed as the wrong subcommand"),
        }

        assert!(Options::from_iter_safe([
            "maildepot",
            "folder",
            "create",
            "alice",
            "INBOX",
            "nonsense",
        ])
        .is_err());
    }
}
