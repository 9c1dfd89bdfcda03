use clap::{Parser, Subcommand};

/// Scaffold projects from versioned git template repositories.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Location of the template cache directory
    #[clap(short, long, global = true)]
    pub cache_directory: Option<String>,
    /// Git executable used for every repository operation
    #[clap(long, global = true)]
    pub git: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prints the latest version tag of a template
    Latest {
        location: String,
        /// Version constraint such as ">=1.0,<2"
        #[clap(short, long)]
        specifier: Option<String>,
    },
    /// Lists the version tags of a template, oldest first
    Tags {
        location: String,
        #[clap(short, long)]
        specifier: Option<String>,
    },
    /// Resolves a branch, tag or commit of a template to a commit hash
    RevParse { location: String, reference: String },
    /// Copies a revision of a template into a new directory
    Checkout {
        location: String,
        destination: String,
        /// Branch, tag or commit to use instead of the latest version tag
        #[clap(long)]
        checkout: Option<String>,
        #[clap(short, long)]
        specifier: Option<String>,
    },
    /// Prints where the mirror of a template is cached
    CachePath { location: String },
    /// Removes every cached template
    ClearCache,
}
