//! # Tide Watch Application Entry Point
//!
//! Thin glue over the library: loads configuration, composes the directory
//! service from its collaborators (NOAA client, file cache store), and
//! prints results to stdout. Three modes, selected by the first argument:
//!
//! - `--search <text>`      free-text station lookup
//! - `--nearest <lat,lng>`  stations closest to a coordinate
//! - `--select <id>`        persist a station as the active selection
//! - (default)              derive and print the tide snapshot for the
//!   active selection, falling back to the configured station
//!
//! Everything interesting lives in the library; this file only parses
//! arguments and formats output.

// Scenario tests exercising the composed service
#[cfg(test)]
mod tests;

use std::env;

use anyhow::Context;
use chrono::Utc;
use tide_watch_lib::cache::FileCacheStore;
use tide_watch_lib::config::Config;
use tide_watch_lib::directory::StationDirectory;
use tide_watch_lib::engine::derive_with_window;
use tide_watch_lib::noaa::{NoaaClient, PredictionFetcher};
use tide_watch_lib::{Station, TideEvent, TideSnapshot, Trend};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = Config::load();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args))
}

async fn run(config: Config, args: Vec<String>) -> anyhow::Result<()> {
    let store = FileCacheStore::new(config.directory.cache_dir.clone());
    let client = NoaaClient::new().context("building NOAA client")?;
    let directory = StationDirectory::with_ttl(
        client.clone(),
        store,
        chrono::Duration::days(config.directory.staleness_ttl_days),
    );

    match args.first().map(String::as_str) {
        Some("--search") => {
            let query = args[1..].join(" ");
            let results = directory.search(&query).await;
            if results.is_empty() {
                println!("No stations matched \"{query}\".");
            }
            for station in &results {
                print_station(station);
            }
        }
        Some("--nearest") => {
            let coordinate = args
                .get(1)
                .context("usage: tide-watch --nearest <lat,lng>")?;
            let (lat, lng) = parse_coordinate(coordinate)?;
            let results = directory.nearest(lat, lng).await;
            if results.is_empty() {
                println!("No stations available.");
            }
            for station in &results {
                print_station(station);
            }
        }
        Some("--select") => {
            let id = args.get(1).context("usage: tide-watch --select <id>")?;
            let station = directory
                .station_by_id(id)
                .await
                .with_context(|| format!("no station with id {id}"))?;
            directory.select_station(&station)?;
            println!("Selected {} ({})", station.name, station.id);
        }
        Some(other) => {
            anyhow::bail!("unknown argument: {other}");
        }
        None => {
            // Resolve the station: persisted selection first, config default
            // otherwise.
            let (station_id, station_name) = match directory.active_selection() {
                Some(selection) => (selection.station_id, selection.name),
                None => (config.station.id.clone(), config.station.name.clone()),
            };

            // A failed fetch degrades to an empty series: the snapshot comes
            // back with an unknown trend and the display shows dashes.
            let predictions = match client.fetch_predictions(&station_id).await {
                Ok(points) => points,
                Err(error) => {
                    eprintln!("Prediction fetch failed: {error}");
                    Vec::new()
                }
            };

            let snapshot = derive_with_window(
                Utc::now(),
                &predictions,
                chrono::Duration::hours(config.chart.window_back_hours),
                chrono::Duration::hours(config.chart.window_forward_hours),
            );
            print_snapshot(&station_name, &snapshot);
        }
    }

    Ok(())
}

/// Parse a "lat,lng" argument.
fn parse_coordinate(arg: &str) -> anyhow::Result<(f64, f64)> {
    let (lat, lng) = arg
        .split_once(',')
        .context("coordinate must be <lat,lng>")?;
    let lat: f64 = lat.trim().parse().context("latitude is not a number")?;
    let lng: f64 = lng.trim().parse().context("longitude is not a number")?;
    Ok((lat, lng))
}

fn print_station(station: &Station) {
    let region = station.region.as_deref().unwrap_or("—");
    println!(
        "{:<10} {:<32} {:<4} ({:.4}, {:.4})",
        station.id, station.name, region, station.latitude, station.longitude
    );
}

fn print_snapshot(station_name: &str, snapshot: &TideSnapshot) {
    let trend = match snapshot.trend {
        Trend::Rising => "rising ↑",
        Trend::Falling => "falling ↓",
        Trend::Unknown => "unknown",
    };

    println!("{station_name}");
    println!("  height: {:.1} ft  ({trend})", snapshot.current_height);
    println!(
        "  last high: {:<18} next high: {}",
        format_event(snapshot.last_high),
        format_event(snapshot.next_high)
    );
    println!(
        "  last low:  {:<18} next low:  {}",
        format_event(snapshot.last_low),
        format_event(snapshot.next_low)
    );

    if snapshot.chart_series.is_empty() {
        return;
    }

    // Simple text chart of the windowed extrema, scaled to the series range.
    let min = snapshot
        .chart_series
        .iter()
        .map(|p| p.height)
        .fold(f32::INFINITY, f32::min);
    let max = snapshot
        .chart_series
        .iter()
        .map(|p| p.height)
        .fold(f32::NEG_INFINITY, f32::max);
    let span = (max - min).max(0.1);

    println!();
    for point in &snapshot.chart_series {
        let width = (((point.height - min) / span) * 30.0).round() as usize;
        let label = match point.kind {
            tide_watch_lib::TideKind::High => "H",
            tide_watch_lib::TideKind::Low => "L",
        };
        println!(
            "  {} {} {:>5.1} ft |{}",
            point.timestamp.format("%m-%d %H:%M"),
            label,
            point.height,
            "█".repeat(width)
        );
    }
}

fn format_event(event: Option<TideEvent>) -> String {
    match event {
        Some(e) => format!("{} ({:.1} ft)", e.timestamp.format("%H:%M"), e.height),
        None => "—".to_string(),
    }
}
