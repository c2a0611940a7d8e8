mod aggregator;
mod batch;
mod cli;
mod error;
mod extractor;
mod fmt;
mod layout;
mod models;
mod pdf;
mod rules;
mod settings;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Init { force } => cli::init::run(config, force),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "mapas", &mut std::io::stdout());
            Ok(())
        }
        Commands::Generate {
            input,
            output,
            rules,
            dry_run,
        } => settings::load_settings(config).and_then(|settings| {
            cli::generate::run(&settings, input.as_deref(), output.as_deref(), &rules, dry_run)
        }),
        Commands::Rules { rules } => settings::load_settings(config)
            .and_then(|settings| cli::rules::list(&settings, &rules)),
        Commands::Inspect { file, rules } => settings::load_settings(config)
            .and_then(|settings| cli::inspect::run(&settings, &file, &rules)),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
