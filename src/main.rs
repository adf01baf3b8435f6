//! smokers CLI entry point.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

mod cli;

use cli::{Cli, Command};
use smokers::config::Config;
use smokers::coordination::{Event, EventKind, Subscription};
use smokers::driver::Driver;

fn setup_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    match cli.command {
        Some(Command::Config) => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
        Some(Command::Run {
            rounds,
            seed,
            policy,
            json,
        }) => {
            if rounds.is_some() {
                config.agent.rounds = rounds;
            }
            if seed.is_some() {
                config.agent.seed = seed;
            }
            if let Some(policy) = policy {
                config.table.policy = policy;
            }
            run(&config, json).await
        }
        None => run(&config, false).await,
    }
}

async fn run(config: &Config, json: bool) -> Result<()> {
    let driver = Driver::new(config.to_driver_config()).context("Invalid configuration")?;

    let events = driver.table().events();
    let subscription = if json {
        events.subscribe()
    } else {
        events.subscribe_to(vec![
            EventKind::IngredientsPlaced,
            EventKind::IngredientsTaken,
            EventKind::SmokingFinished,
        ])
    };
    let narrator = tokio::spawn(narrate(subscription, json));

    let outcome = {
        let running = driver.run();
        tokio::pin!(running);

        tokio::select! {
            stats = &mut running => stats,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("{} Shutting down, letting the last cigarettes burn out...", "→".blue());
                driver.shutdown();
                running.await
            }
        }
    };

    // Dropping the driver closes the event bus, letting the narrator drain
    drop(driver);
    if let Err(e) = narrator.await {
        log::warn!("Narrator stopped abnormally: {}", e);
    }
    let stats = outcome.context("Table stopped with an error")?;

    if !json {
        println!(
            "{} {} placements, {} cigarettes smoked, {} hand-backs",
            "✓".green(),
            stats.placements,
            stats.finishes,
            stats.hand_backs
        );
    }
    Ok(())
}

async fn narrate(mut subscription: Subscription, json: bool) {
    while let Some(event) = subscription.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("Failed to serialize event: {}", e),
            }
            continue;
        }
        println!("{}", styled(&event));
    }
}

fn styled(event: &Event) -> String {
    let time = event.timestamp.format("%H:%M:%S%.3f").to_string().dimmed();
    let text = event.narration();
    let text = match event.kind {
        EventKind::IngredientsPlaced => text.cyan(),
        EventKind::IngredientsTaken => text.green(),
        EventKind::SmokingFinished => text.yellow(),
        EventKind::WakeHandedBack => text.dimmed(),
    };
    format!("{} {}", time, text)
}
