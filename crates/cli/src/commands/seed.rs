use funnelsight_db::{migrations, FunnelSeedDataset, SeedResult};

use crate::bootstrap::connect_warehouse;
use crate::commands::{build_runtime, load_config, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_warehouse(&config)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = FunnelSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = FunnelSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 5u8))?;

        let outcome: Result<SeedResult, CommandFailure> = if verification.all_present {
            Ok(seeded)
        } else {
            Err(("seed_verification", verification_failure_message(&verification.checks), 5u8))
        };

        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", seed_summary(&seeded)),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn seed_summary(seeded: &SeedResult) -> String {
    let window = match (seeded.first_day, seeded.last_day) {
        (Some(first), Some(last)) => {
            format!("{} to {}", first.format("%Y-%m-%d"), last.format("%Y-%m-%d"))
        }
        _ => "an empty window".to_string(),
    };
    format!(
        "funnel demo dataset loaded: {} daily rows from {window} for markets {}",
        seeded.rows_seeded,
        seeded.markets.join(", ")
    )
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
