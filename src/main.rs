use clap::Parser;
use colored::Colorize;

use commerce_engine::cli::{Cli, Commands, run_cli_command};
use commerce_engine::config::{get_config, init_config};
use commerce_engine::runtime::modes::run_server;
use commerce_engine::system::init_logging;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_config(cli.config.as_deref()) {
        eprintln!("{}", e.format_colored());
        std::process::exit(1);
    }

    match cli.command {
        None | Some(Commands::Serve) => {
            let config = get_config();
            let _guard = match init_logging(&config.logging) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("{}", e.format_colored());
                    std::process::exit(1);
                }
            };

            if let Err(e) = run_server().await {
                eprintln!("{} {:#}", "Server error:".red().bold(), e);
                std::process::exit(1);
            }
        }
        Some(cmd) => {
            if let Err(e) = run_cli_command(cmd).await {
                eprintln!("{}", e.format_colored());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
