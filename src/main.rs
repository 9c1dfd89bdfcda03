use std::{error::Error, path::Path};

use clap::Parser;
use log::warn;

use stencil::{
    cli::args::{CliArgs, Command},
    Stencil,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = CliArgs::parse();

    let mut builder = Stencil::builder();
    if let Some(cache_directory) = &cli_args.cache_directory {
        builder = builder.cache_directory(cache_directory);
    }
    if let Some(git) = &cli_args.git {
        builder = builder.git_program(git);
    }
    let stencil = builder.try_build()?;

    match cli_args.cmd {
        Command::Latest {
            location,
            specifier,
        } => match stencil.find_latest(&location, specifier.as_deref())? {
            Some(tag) => println!("{tag}"),
            None => warn!("No version tag of {} matches", location),
        },
        Command::Tags {
            location,
            specifier,
        } => {
            for tag in stencil.tags(&location, specifier.as_deref())? {
                println!("{tag}");
            }
        }
        Command::RevParse {
            location,
            reference,
        } => println!("{}", stencil.rev_parse(&location, &reference)?),
        Command::Checkout {
            location,
            destination,
            checkout,
            specifier,
        } => {
            let commit = stencil.checkout(
                &location,
                Path::new(&destination),
                checkout.as_deref(),
                specifier.as_deref(),
            )?;
            println!("{commit}");
        }
        Command::CachePath { location } => {
            println!("{}", stencil.cache_path(&location).display())
        }
        Command::ClearCache => stencil.clear_cache()?,
    }

    Ok(())
}
