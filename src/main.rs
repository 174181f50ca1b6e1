mod checkout;
mod commands;
mod delta;
mod error;
mod fetch;
mod object;
mod pack;
mod pktline;
mod refs;
mod sideband;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use object::ObjectType;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty Git repository
    Init,

    /// Provide content or type and size information for repository objects
    CatFile {
        /// Show object type
        #[arg(short, conflicts_with = "size_only")]
        type_only: bool,

        /// Show object size
        #[arg(short, conflicts_with = "type_only")]
        size_only: bool,

        /// Pretty-print object's content
        #[arg(short, conflicts_with_all = ["size_only", "type_only"])]
        pretty_print: bool,

        /// Object hash
        #[arg(id = "object")]
        hash: String,
    },

    /// Compute object ID and optionally create an object from a file
    HashObject {
        /// Actually write the object into the object database
        #[arg(short)]
        write: bool,

        /// Object type
        #[arg(short, id = "type", default_value = "blob")]
        typ: String,

        #[arg(id = "file")]
        file: String,
    },

    /// List the contents of a tree object
    LsTree {
        /// Recurse into sub-trees
        #[arg(short = 'r')]
        recurse: bool,

        /// Print only filenames
        #[arg(long = "name-only")]
        name_only: bool,

        #[arg(id = "tree-ish")]
        hash: String,
    },

    /// Create a tree object from the current working directory
    WriteTree,

    /// Create a commit object from a tree
    CommitTree {
        #[arg(id = "tree")]
        tree_hash: String,

        /// Id of a parent commit
        #[arg(short = 'p')]
        parent: Option<String>,

        /// Commit message
        #[arg(short = 'm')]
        message: String,
    },

    /// Clone a repository over the smart-HTTP transport into a new directory
    Clone {
        /// Repository URL
        repository: String,

        /// Destination directory (defaults to the repository's name)
        directory: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Cli::parse();
    match args.command {
        Commands::Init => commands::init::invoke(),
        Commands::CatFile {
            pretty_print: _,
            type_only,
            size_only,
            hash,
        } => commands::cat_file::invoke(&hash, type_only, size_only),
        Commands::HashObject { write, file, typ } => {
            let typ: ObjectType = typ.parse()?;
            let hash = commands::hash_object::invoke(&file, write, typ)?;
            println!("{}", hex::encode(hash));
            Ok(())
        }
        Commands::LsTree {
            recurse,
            name_only,
            hash,
        } => commands::ls_tree::invoke(&hash, recurse, name_only),
        Commands::WriteTree => commands::write_tree::invoke(),
        Commands::CommitTree {
            tree_hash,
            parent,
            message,
        } => {
            let hash = commands::commit_tree::invoke(&tree_hash, &message, parent)?;
            println!("{}", hex::encode(hash));
            Ok(())
        }
        Commands::Clone {
            repository,
            directory,
        } => commands::clone::invoke(&repository, directory),
    }
}
