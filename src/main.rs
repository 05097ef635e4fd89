mod cli;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};
use tracing_subscriber::EnvFilter;

use doralite::DoraClient;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let client = DoraClient::new().insecure_fallback(cli.insecure);

    let result = match &cli.command {
        Commands::Meta { id } => command::meta(&client, id).await,
        Commands::Search { query, attribute } => command::search(&client, query, attribute).await,
        Commands::Projects => command::projects(&client).await,
        Commands::Catalog {
            id,
            variable,
            frequency,
            kind,
            trange,
            output,
        } => {
            command::catalog(
                &client,
                id,
                variable.clone(),
                frequency.clone(),
                kind,
                trange.clone(),
                output.clone(),
            )
            .await
        }
        Commands::GlobalMean {
            id,
            component,
            start,
            end,
            yearshift,
            convert,
            output,
        } => {
            command::global_mean(
                &client,
                id,
                component,
                *start,
                *end,
                *yearshift,
                *convert,
                output.clone(),
            )
            .await
        }
        Commands::Db {
            db_file,
            variable,
            legacy_land,
            yearshift,
            output,
        } => command::db(db_file, variable, *legacy_land, *yearshift, output.clone()).await,
        Commands::Missing {
            id,
            component,
            start,
            end,
        } => command::missing(&client, id, component, *start, *end).await,
        Commands::Repair { id, component } => command::repair(&client, id, component).await,
    };

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => eprintln!("Error: {}", e),
    }

    Ok(())
}
