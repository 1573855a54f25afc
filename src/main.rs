// Command-line front end for the UMO IQ transit feed

use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;
use tracing::info;
use tracing::level_filters::LevelFilter;

use umo_feed::{CacheOptions, FeedHandler, HandlerConfig, Prediction, logger};

#[derive(Parser, Debug)]
#[command(
    name = "umo-feed",
    author,
    version,
    about = "Query agencies, routes, stops and arrival predictions from the UMO IQ feed"
)]
struct Args {
    /// Per-attempt timeout in seconds (0 disables it)
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Additional attempts after a failed request
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Delay between attempts in milliseconds (at least 50)
    #[arg(long, default_value_t = 100)]
    retry_delay: u64,

    /// Extra request header, as NAME=VALUE (repeatable)
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Feed endpoint
    #[arg(long, default_value = umo_feed::FEED_URI)]
    base_uri: String,

    /// Print entities as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List all agencies
    Agencies,
    /// List the routes of an agency
    Routes { agency: String },
    /// List every stop of an agency
    Stops { agency: String },
    /// Show one stop and the services calling at it
    Stop { agency: String, stop_id: String },
    /// Show arrival predictions for a stop
    Predictions {
        agency: String,
        stop_id: String,
        /// Only predictions for this route
        #[arg(long)]
        route: Option<String>,
        /// IANA time zone for arrival times
        #[arg(long, default_value = "UTC")]
        tz: String,
    },
}

fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    logger::init_logger(if args.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO });

    let config = HandlerConfig::builder()
        .base_uri(args.base_uri)
        .timeout(Duration::from_secs(args.timeout))
        .retry_limit(args.retries)
        .retry_delay(Duration::from_millis(args.retry_delay))
        .headers(args.headers.into_iter().collect())
        .build();
    let mut feed = FeedHandler::with_config(config).context("Failed to create feed handler")?;
    info!(
        timeout_s = feed.config().fetch.timeout.as_secs(),
        retries = feed.config().fetch.retry_limit,
        "Using feed {}",
        feed.config().base_uri
    );
    let opts = CacheOptions::default();

    match args.command {
        Cmd::Agencies => {
            let agencies = feed.get_agencies(opts)?;
            if args.json {
                return print_json(agencies);
            }
            println!("🏢 {} agencies", agencies.len());
            for agency in agencies {
                println!("  {:<24} {} ({})", agency.tag, agency.title, agency.region_title);
            }
        }
        Cmd::Routes { agency } => {
            let routes = feed.get_routes(&agency, opts)?;
            if args.json {
                return print_json(routes);
            }
            println!("🚌 {} routes for {}", routes.len(), agency);
            for route in routes {
                println!(
                    "  {:<8} {} - {} stops, {} services",
                    route.tag,
                    route.title,
                    route.stops().len(),
                    route.services().len()
                );
            }
        }
        Cmd::Stops { agency } => {
            let stops = feed.get_stops(&agency, opts)?;
            if args.json {
                return print_json(&stops);
            }
            println!("📍 {} stops for {}", stops.len(), agency);
            for stop in stops {
                let id = stop.id.as_ref().map(|id| id.as_str()).unwrap_or("-");
                println!("  {:<8} {} ({:.5}, {:.5})", id, stop.title, stop.latitude, stop.longitude);
            }
        }
        Cmd::Stop { agency, stop_id } => {
            let stop = feed.get_stop(&agency, &stop_id)?.clone();
            let services = feed.get_stop_service_routes(&agency, &stop_id)?;
            if args.json {
                return print_json(&services);
            }
            println!("📍 {} ({}) - {:.5}, {:.5}", stop.title, stop_id, stop.latitude, stop.longitude);
            for service in services {
                println!("  🚌 {:<8} {}", service.route, service.title);
            }
        }
        Cmd::Predictions { agency, stop_id, route, tz } => {
            let tz: Tz = tz.parse().map_err(|e| anyhow!("Invalid time zone '{}': {}", tz, e))?;
            let predictions: Vec<Prediction> = match route {
                Some(route) => feed.fetch_route_predictions(&agency, &stop_id, &route)?,
                None => feed.get_predictions(&agency, &stop_id, opts)?.to_vec(),
            };
            if args.json {
                return print_json(&predictions);
            }

            let title = feed.get_stop(&agency, &stop_id)?.title.clone();
            if predictions.is_empty() {
                println!("⚠️  No predictions for {} ({})", title, stop_id);
                return Ok(());
            }
            println!("🕐 {} predictions for {} ({})", predictions.len(), title, stop_id);
            for prediction in &predictions {
                let service = feed.get_service_by_route(&agency, prediction.route.as_str(), prediction.service.as_str())?;
                let mut notes = Vec::new();
                if prediction.schedule_based {
                    notes.push("scheduled");
                }
                if prediction.is_departure {
                    notes.push("departure");
                }
                if prediction.affected_by_layover {
                    notes.push("layover");
                }
                if prediction.delayed {
                    notes.push("delayed");
                }
                println!(
                    "  🚌 {:<8} {:<40} {:>3} min  {}{}",
                    prediction.route,
                    service.title,
                    prediction.minutes,
                    prediction.eta.with_timezone(&tz).format("%H:%M:%S"),
                    if notes.is_empty() { String::new() } else { format!("  [{}]", notes.join(", ")) }
                );
            }
        }
    }

    Ok(())
}
