use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Market profiles for the demo funnel. `active_until` leaves a market without
/// data for part of the window so "no data" answers can be exercised.
const SEED_MARKETS: &[SeedMarket] = &[
    SeedMarket { culture: "BR", base_traffic: 9_000, conversion_bp: 260, active_until: None },
    SeedMarket { culture: "CL", base_traffic: 4_200, conversion_bp: 310, active_until: None },
    SeedMarket { culture: "PE", base_traffic: 3_100, conversion_bp: 240, active_until: None },
    SeedMarket { culture: "CO", base_traffic: 2_600, conversion_bp: 220, active_until: None },
    SeedMarket { culture: "AR", base_traffic: 2_900, conversion_bp: 190, active_until: None },
    SeedMarket { culture: "US", base_traffic: 1_800, conversion_bp: 340, active_until: None },
    SeedMarket {
        culture: "EC",
        base_traffic: 900,
        conversion_bp: 200,
        active_until: Some((2025, 7, 31)),
    },
];

const SEED_DEVICES: &[(&str, u32)] = &[("desktop", 40), ("mobile", 60)];

const SEED_TRAFFIC_TYPES: &[(&str, u32)] = &[("Organico", 55), ("Pagado", 35), ("Promoted", 10)];

const SEED_FIRST_DAY: (i32, u32, u32) = (2025, 7, 1);
const SEED_LAST_DAY: (i32, u32, u32) = (2025, 8, 31);

/// Deterministic demo dataset for the `funnels_resumido` table: two full
/// months of daily snapshots across markets, devices and traffic types.
pub struct FunnelSeedDataset;

impl FunnelSeedDataset {
    pub fn first_day() -> Option<NaiveDate> {
        ymd(SEED_FIRST_DAY)
    }

    pub fn last_day() -> Option<NaiveDate> {
        ymd(SEED_LAST_DAY)
    }

    /// Every snapshot row the dataset contains, in insertion order.
    pub fn rows() -> Vec<FunnelRow> {
        let (Some(first), Some(last)) = (Self::first_day(), Self::last_day()) else {
            return Vec::new();
        };

        let mut rows = Vec::new();
        let mut day = first;
        let mut day_index = 0u32;
        while day <= last {
            for (market_index, market) in SEED_MARKETS.iter().enumerate() {
                if market.active_until.and_then(ymd).is_some_and(|until| day > until) {
                    continue;
                }
                for (device_index, (device, device_share)) in SEED_DEVICES.iter().enumerate() {
                    for (traffic_index, (traffic_type, traffic_share)) in
                        SEED_TRAFFIC_TYPES.iter().enumerate()
                    {
                        let seed = day_index * 37
                            + market_index as u32 * 11
                            + device_index as u32 * 7
                            + traffic_index as u32 * 3;
                        rows.push(FunnelRow::generate(
                            day,
                            market,
                            device,
                            *device_share,
                            traffic_type,
                            *traffic_share,
                            seed,
                        ));
                    }
                }
            }
            day += Duration::days(1);
            day_index += 1;
        }
        rows
    }

    /// Loads the dataset. Existing snapshot rows with the same key are
    /// replaced, so loading twice leaves the same table contents.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let rows = Self::rows();
        let mut tx = pool.begin().await?;

        for row in &rows {
            sqlx::query(
                "INSERT OR REPLACE INTO funnels_resumido (
                    date,
                    culture,
                    device,
                    traffic_type,
                    traffic,
                    flight_dom_loaded_flight,
                    payment_confirmation_loaded,
                    median_time_seconds,
                    median_time_minutes
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.date.format("%Y-%m-%d").to_string())
            .bind(row.culture)
            .bind(row.device)
            .bind(row.traffic_type)
            .bind(row.traffic)
            .bind(row.flight_dom_loaded_flight)
            .bind(row.payment_confirmation_loaded)
            .bind(row.median_time_seconds)
            .bind(row.median_time_seconds / 60.0)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            event_name = "fixtures.funnel_seeded",
            rows_seeded = rows.len(),
            "funnel demo dataset loaded"
        );

        Ok(SeedResult {
            rows_seeded: rows.len(),
            markets: SEED_MARKETS.iter().map(|market| market.culture).collect(),
            first_day: Self::first_day(),
            last_day: Self::last_day(),
        })
    }

    /// Checks that the seeded rows are present and internally consistent.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let expected_rows = Self::rows().len() as i64;
        let mut checks = Vec::new();

        let (first, last) = match (Self::first_day(), Self::last_day()) {
            (Some(first), Some(last)) => {
                (first.format("%Y-%m-%d").to_string(), last.format("%Y-%m-%d").to_string())
            }
            _ => return Err(RepositoryError::Decode("invalid seed window".to_string())),
        };

        let row_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM funnels_resumido WHERE date BETWEEN ?1 AND ?2",
        )
        .bind(&first)
        .bind(&last)
        .fetch_one(pool)
        .await?;
        checks.push(("funnel-row-count", row_count == expected_rows));

        let market_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT culture) FROM funnels_resumido WHERE date BETWEEN ?1 AND ?2",
        )
        .bind(&first)
        .bind(&last)
        .fetch_one(pool)
        .await?;
        checks.push(("funnel-markets", market_count == SEED_MARKETS.len() as i64));

        let bounds = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT MIN(date), MAX(date) FROM funnels_resumido WHERE date BETWEEN ?1 AND ?2",
        )
        .bind(&first)
        .bind(&last)
        .fetch_one(pool)
        .await?;
        checks.push((
            "funnel-date-window",
            bounds.0.as_deref() == Some(first.as_str()) && bounds.1.as_deref() == Some(last.as_str()),
        ));

        let broken_funnels: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM funnels_resumido
             WHERE date BETWEEN ?1 AND ?2
               AND (payment_confirmation_loaded > flight_dom_loaded_flight
                    OR flight_dom_loaded_flight > traffic)",
        )
        .bind(&first)
        .bind(&last)
        .fetch_one(pool)
        .await?;
        checks.push(("funnel-monotonic-steps", broken_funnels == 0));

        let ecuador_august: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM funnels_resumido WHERE culture = 'EC' AND date >= '2025-08-01'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("funnel-ecuador-gap", ecuador_august == 0));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded window from a test database.
    pub async fn clean(pool: &DbPool) -> Result<u64, RepositoryError> {
        let (Some(first), Some(last)) = (Self::first_day(), Self::last_day()) else {
            return Ok(0);
        };
        let result = sqlx::query("DELETE FROM funnels_resumido WHERE date BETWEEN ?1 AND ?2")
            .bind(first.format("%Y-%m-%d").to_string())
            .bind(last.format("%Y-%m-%d").to_string())
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedMarket {
    culture: &'static str,
    base_traffic: u32,
    /// Payment confirmations per 10,000 sessions.
    conversion_bp: u32,
    active_until: Option<(i32, u32, u32)>,
}

/// One daily snapshot as written to `funnels_resumido`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelRow {
    pub date: NaiveDate,
    pub culture: &'static str,
    pub device: &'static str,
    pub traffic_type: &'static str,
    pub traffic: i64,
    pub flight_dom_loaded_flight: i64,
    pub payment_confirmation_loaded: i64,
    pub median_time_seconds: f64,
}

impl FunnelRow {
    fn generate(
        date: NaiveDate,
        market: &SeedMarket,
        device: &'static str,
        device_share: u32,
        traffic_type: &'static str,
        traffic_share: u32,
        seed: u32,
    ) -> Self {
        let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        let day_factor: u32 = if weekend { 85 } else { 100 };
        // +/- 8% wobble that repeats every 17 steps.
        let wobble = 92 + (seed % 17);

        let traffic = u64::from(market.base_traffic)
            * u64::from(device_share)
            * u64::from(traffic_share)
            * u64::from(day_factor)
            * u64::from(wobble)
            / 100_000_000;
        let traffic = traffic.max(1) as i64;

        let flight_rate = 52 + i64::from(seed % 13);
        let flight = traffic * flight_rate / 100;

        let mobile_penalty = if device == "mobile" { 80 } else { 100 };
        let conversion_bp = i64::from(market.conversion_bp) * mobile_penalty / 100
            + i64::from(seed % 5) * 10
            - 20;
        let payments = (traffic * conversion_bp.max(1) / 10_000).min(flight);

        let median_time_seconds = 540.0 + f64::from(seed % 29) * 12.5;

        Self {
            date,
            culture: market.culture,
            device,
            traffic_type,
            traffic,
            flight_dom_loaded_flight: flight,
            payment_confirmation_loaded: payments,
            median_time_seconds,
        }
    }
}

fn ymd((year, month, day): (i32, u32, u32)) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

#[derive(Debug)]
pub struct SeedResult {
    pub rows_seeded: usize,
    pub markets: Vec<&'static str>,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
