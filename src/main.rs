use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use meteo_bcn::aggregate::{
    aggregate_by_bucket, build_daily_summary, calculate_stats, day_bucket, exceeds_acoustic_limit,
};
use meteo_bcn::config::DataMode;
use meteo_bcn::coverage::{CoverageResolution, compute_daily_coverage, compute_subdaily_coverage};
use meteo_bcn::diagnostics::dataset_stats;
use meteo_bcn::exceedance::exceedance_intervals;
use meteo_bcn::stations::{BARCELONA_CENTER, DEFAULT_RADIUS_KM, within_radius};
use meteo_bcn::wind::direction_to_cardinal;
use meteo_bcn::{
    DateRange, Granularity, MeteoConfig, MeteoError, Observation, ObservationField,
    ProviderSelection, Station, WeatherService, logging,
};
use serde::Serialize;
use serde_json::json;
use tracing::info;

#[derive(Parser)]
#[command(name = "meteo-bcn", author, version, about)]
struct Cli {
    /// Path to the config file (meteo-bcn.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serve simulated data instead of calling upstream providers
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stations around Barcelona, nearest first
    Stations {
        /// Provider id, or "auto" for fallback through the configured priority
        #[arg(long, default_value = "auto")]
        provider: ProviderSelection,

        #[arg(long, default_value_t = DEFAULT_RADIUS_KM)]
        radius_km: f64,
    },

    /// Latest reading of a station
    Latest {
        #[arg(long)]
        station: String,

        #[arg(long, default_value = "auto")]
        provider: ProviderSelection,
    },

    /// Observations over a date range, as JSON with summary statistics
    Observations {
        #[arg(long)]
        station: String,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last day (YYYY-MM-DD), inclusive
        #[arg(long)]
        to: NaiveDate,

        /// subdaily (30min), hourly or daily
        #[arg(long, default_value = "subdaily")]
        granularity: Granularity,

        #[arg(long, default_value = "auto")]
        provider: ProviderSelection,
    },

    /// Per-day summary and wind buckets with the acoustic limit flag
    Summary {
        #[arg(long)]
        station: String,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        #[arg(long, default_value = "auto")]
        provider: ProviderSelection,
    },

    /// Expected versus available slots over a date range
    Coverage {
        #[arg(long)]
        station: String,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        /// day or half-hour
        #[arg(long, default_value = "day")]
        resolution: CoverageResolution,

        #[arg(long, default_value = "auto")]
        provider: ProviderSelection,
    },

    /// Intervals where a field stays strictly above a threshold
    Exceedance {
        #[arg(long)]
        station: String,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        #[arg(long)]
        threshold: f64,

        /// Observation field, e.g. windSpeed or windSpeedMax
        #[arg(long, default_value = "windSpeed")]
        field: ObservationField,

        #[arg(long, default_value = "auto")]
        provider: ProviderSelection,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Find a station by id in the selected provider's station list
async fn resolve_station(
    service: &WeatherService,
    selection: ProviderSelection,
    station_id: &str,
) -> Result<Station> {
    let stations = service
        .list_stations(selection)
        .await
        .into_result()
        .map_err(MeteoError::from)?;
    stations
        .into_iter()
        .find(|s| s.id.eq_ignore_ascii_case(station_id))
        .ok_or_else(|| anyhow!("Unknown station '{station_id}'"))
}

async fn fetch_observations(
    service: &WeatherService,
    selection: ProviderSelection,
    station_id: &str,
    range: &DateRange,
    granularity: Granularity,
) -> Result<Vec<Observation>> {
    let station = resolve_station(service, selection, station_id).await?;
    let result = service
        .get_observations(selection, &station, range, granularity)
        .await;
    info!("Observations served by {}", result.provider());
    Ok(result.into_result().map_err(MeteoError::from)?)
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = MeteoConfig::load_from_path(cli.config)?;
    if cli.mock {
        config.data_mode = DataMode::Mock;
    }
    logging::init(&config.logging);

    let service = WeatherService::from_config(&config).map_err(MeteoError::from)?;

    match cli.command {
        Commands::Stations {
            provider,
            radius_km,
        } => {
            let result = service
                .list_stations_cached(None, provider, Utc::now())
                .await;
            let served_by = result.provider();
            let cached = result.into_result().map_err(MeteoError::from)?;
            let nearby = within_radius(BARCELONA_CENTER, radius_km, cached.data);
            println!(
                "{} stations within {radius_km} km (source: {served_by})",
                nearby.len()
            );
            for (station, distance) in &nearby {
                println!(
                    "  {:<4} {:<40} {:>6.1} km  ({})",
                    station.id,
                    station.name,
                    distance,
                    station.format_coordinates()
                );
            }
        }
        Commands::Latest { station, provider } => {
            let latest = service
                .get_latest(provider, &station)
                .await
                .into_result()
                .map_err(MeteoError::from)?;
            let cardinal = latest
                .observation
                .wind_direction
                .map(direction_to_cardinal);
            print_json(&json!({ "latest": latest, "windFrom": cardinal }))?;
        }
        Commands::Observations {
            station,
            from,
            to,
            granularity,
            provider,
        } => {
            let range = DateRange::from_dates(from, to).map_err(MeteoError::from)?;
            let observations =
                fetch_observations(&service, provider, &station, &range, granularity).await?;
            print_json(&json!({
                "observations": observations,
                "stats": calculate_stats(&observations),
                "diagnostics": dataset_stats(&observations),
            }))?;
        }
        Commands::Summary {
            station,
            from,
            to,
            provider,
        } => {
            let range = DateRange::from_dates(from, to).map_err(MeteoError::from)?;
            let observations =
                fetch_observations(&service, provider, &station, &range, Granularity::Subdaily)
                    .await?;
            let wind: Vec<_> = aggregate_by_bucket(&observations, day_bucket)
                .into_iter()
                .map(|bucket| {
                    let over_limit = bucket.wind_avg.is_some_and(exceeds_acoustic_limit);
                    json!({ "bucket": bucket, "exceedsAcousticLimit": over_limit })
                })
                .collect();
            print_json(&json!({
                "daily": build_daily_summary(&observations),
                "wind": wind,
            }))?;
        }
        Commands::Coverage {
            station,
            from,
            to,
            resolution,
            provider,
        } => {
            let range = DateRange::from_dates(from, to).map_err(MeteoError::from)?;
            let report = match resolution {
                CoverageResolution::Day => {
                    let observations =
                        fetch_observations(&service, provider, &station, &range, Granularity::Daily)
                            .await?;
                    compute_daily_coverage(&range, &observations)
                }
                CoverageResolution::HalfHour => {
                    let observations = fetch_observations(
                        &service,
                        provider,
                        &station,
                        &range,
                        Granularity::Subdaily,
                    )
                    .await?;
                    compute_subdaily_coverage(&range, &observations)
                }
            };
            print_json(&report)?;
        }
        Commands::Exceedance {
            station,
            from,
            to,
            threshold,
            field,
            provider,
        } => {
            let range = DateRange::from_dates(from, to).map_err(MeteoError::from)?;
            let observations =
                fetch_observations(&service, provider, &station, &range, Granularity::Subdaily)
                    .await?;
            let intervals = exceedance_intervals(&observations, threshold, field);
            print_json(&json!({
                "field": field,
                "threshold": threshold,
                "intervals": intervals,
            }))?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await.context("meteo-bcn failed") {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<MeteoError>() {
                Some(meteo_err) => eprintln!("Error: {}", meteo_err.user_message()),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
