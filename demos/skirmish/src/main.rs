//! Skirmish: a small territory game served by Conquest.
//!
//! Territories sit on a ring, dealt round-robin to the seats. Each turn a
//! player places reinforcements, attacks neighbouring enemy territory as
//! long as they like, then ends the turn. Whoever holds the whole ring
//! wins.

mod rules;

use conquest::prelude::*;

use crate::rules::{Skirmish, SkirmishConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = ServerConfig::from_env()?;
    tracing::info!(bind = %config.bind, http = ?config.http_bind, "starting skirmish server");

    let server = ConquestServerBuilder::from_config(config)
        .build::<Skirmish>(SkirmishConfig::default())
        .await?;

    server.run().await?;
    Ok(())
}
