mod advisor;
mod api;
mod artifacts;
mod codec;
mod database;
mod estimator;
mod export;
mod features;
mod market;
mod rules;
mod settings;
mod web;

use std::{process::exit, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{error, info};

use crate::{
    advisor::{Advisor, ZipcodeRange},
    artifacts::Artifacts,
    database::Database,
    market::MarketTrends,
    settings::{Args, Settings},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    if let Err(e) = run().await {
        error!("{e:#}");
        exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let (codec, estimator) = Artifacts::load(&settings.model)?.into_parts();

    let mut rng = match settings.market.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let trends = MarketTrends::generate(settings.market.zip_start, settings.market.zip_end, &mut rng);
    info!("Generated synthetic market trends for {} zipcodes", trends.len());

    let db = Database::connect(&settings.database.path).with_context(|| {
        format!(
            "failed to open database at {}",
            settings.database.path.display()
        )
    })?;

    let zipcodes = ZipcodeRange {
        min: settings.validation.zipcode_min,
        max: settings.validation.zipcode_max,
    };
    let advisor = Arc::new(Advisor::new(
        codec,
        estimator,
        Arc::new(trends),
        zipcodes,
        db.clone(),
    ));
    let offset = settings.display.utc_offset;
    let schema = api::schema(db.clone(), advisor.clone(), offset);

    let tls = args.cert.zip(args.key);
    web::serve(
        web::State {
            schema,
            advisor,
            db,
            offset,
        },
        settings.web.address,
        tls,
    )
    .await;
    Ok(())
}
