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

use super::main::{FolderPathOptions, FolderSubcommand};
use crate::support::{
    context::Context, error::Error, safe_name::PATH_SEPARATOR,
};
use crate::usecase::{Depot, FolderListing, ListOptions, ListRequest};

pub(super) fn run(
    depot: &Depot,
    ctx: &Context,
    cmd: FolderSubcommand,
) -> Result<(), Error> {
    match cmd {
        FolderSubcommand::List { account } => {
            let account = depot.account(ctx, &account)?;
            let request = ListRequest {
                options: ListOptions {
                    children: true,
                    stats: true,
                    tree: true,
                    ..ListOptions::default()
                },
                ..ListRequest::default()
            };
            for listing in depot.list_folders(ctx, &account, &request)? {
                println!("{}", format_listing(&listing));
            }
        },

        FolderSubcommand::Create { folder, role } => {
            let account = depot.account(ctx, &folder.account)?;
            let created =
                depot.create_folder(ctx, &account, &folder.path, role)?;
            println!("Created {} ({})", created.path, created.id);
        },

        FolderSubcommand::Rename { account, old, new } => {
            let account = depot.account(ctx, &account)?;
            for renamed in depot.rename_folder(ctx, &account, &old, &new)? {
                println!("{} -> {}", renamed.old_path, renamed.new_path);
            }
        },

        FolderSubcommand::Delete { folder, recursive } => {
            let account = depot.account(ctx, &folder.account)?;
            for deleted in
                depot.delete_folder(ctx, &account, &folder.path, recursive)?
            {
                println!("Deleted {}", deleted.path);
            }
        },

        FolderSubcommand::Subscribe(folder) => {
            set_subscribed(depot, ctx, folder, true)?;
        },

        FolderSubcommand::Unsubscribe(folder) => {
            set_subscribed(depot, ctx, folder, false)?;
        },
    }

    Ok(())
}

fn set_subscribed(
    depot: &Depot,
    ctx: &Context,
    folder: FolderPathOptions,
    subscribed: bool,
) -> Result<(), Error> {
    let account = depot.account(ctx, &folder.account)?;
    if subscribed {
        depot.subscribe(ctx, &account, &folder.path)?;
    } else {
        depot.unsubscribe(ctx, &account, &folder.path)?;
    }
    Ok(())
}

/// Formats one line of `folder list` output: the folder's name indented by
/// depth, followed by its attributes and message counts.
fn format_listing(listing: &FolderListing) -> String {
    let folder = &listing.folder;
    let depth = folder.path.matches(PATH_SEPARATOR).count();
    let mut line = format!("{}{}", "  ".repeat(depth), folder.name);

    if let Some(role) = folder.role {
        line.push_str(&format!(" {role:?}"));
    }
    match listing.has_children {
        Some(true) => line.push_str(" \\HasChildren"),
        Some(false) => line.push_str(" \\HasNoChildren"),
        None => (),
    }
    if !folder.subscribed {
        line.push_str(" (unsubscribed)");
    }
    if let Some(stats) = listing.stats {
        line.push_str(&format!(
            "\t{} messages, {} unseen, {} deleted, {} octets",
            stats.messages, stats.unseen, stats.deleted, stats.size,
        ));
    }
    line
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::folder::{Folder, Role};
    use crate::model::id::AccountId;
    use crate::usecase::FolderStats;

    #[test]
    fn listing_format() {
        let parent =
            Folder::new(None, AccountId::generate(), "Mail", None).unwrap();
        let folder = Folder::new(
            Some(&parent),
            parent.account_id,
            "Sent",
            Some(Role::Sent),
        )
        .unwrap();

        let listing = FolderListing {
            folder,
            has_matching_descendants: None,
            has_children: Some(false),
            stats: Some(FolderStats {
                messages: 3,
                unseen: 1,
                deleted: 0,
                size: 1024,
            }),
        };
        assert_eq!(
            "  Sent \\Sent \\HasNoChildren (unsubscribed)\t\
             3 messages, 1 unseen, 0 deleted, 1024 octets",
            format_listing(&listing),
        );
    }
}
