//! ACCU Estimator
//!
//! Estimates Australian Carbon Credit Units for a land parcel using the
//! LOOC-C carbon estimation API.

mod aggregator;
mod calculator;
mod client;
mod cobenefits;
mod config;
mod db;
mod error;
mod geometry;
mod keys;
mod merger;
mod models;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::{EstimationProvider, LooccClient};
use crate::cobenefits::{CobenefitCatalog, ERF_METHODS};
use crate::config::{DEFAULT_BASE_URI, Settings};
use crate::models::{DEFAULT_PROJECT_LENGTH, ProjectMetadata};

#[derive(Parser)]
#[command(name = "accu-estimator")]
#[command(about = "ACCU estimates for land parcels via the LOOC-C API")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "accu_estimates.db")]
    database: PathBuf,

    /// LOOC-C API key
    #[arg(long, env = "LOOCC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// LOOC-C API base URI
    #[arg(long, env = "LOOCC_BASE_URI", default_value = DEFAULT_BASE_URI)]
    base_uri: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Create or replace the estimate for an asset
    Estimate {
        /// Asset ID the estimate belongs to
        asset_id: i64,

        /// Parcel geometry file (WKT or GeoJSON)
        geometry: PathBuf,

        /// Soil project type to estimate (repeatable)
        #[arg(short = 't', long = "project-type")]
        project_types: Vec<String>,

        /// Expected soil organic carbon improvement, in percentage points
        #[arg(short, long, default_value = "0")]
        carbon_improvement: f64,

        /// The project will introduce new irrigation
        #[arg(long)]
        new_irrigation: bool,

        /// Project length in years
        #[arg(long, default_value_t = DEFAULT_PROJECT_LENGTH)]
        project_length: u32,
    },

    /// List all stored estimates
    List,

    /// Show one estimate with all of its methods
    Show {
        estimate_id: i64,
    },

    /// Instant provisional SOC estimate for new carbon values (no API call)
    Preview {
        estimate_id: i64,

        #[arg(long)]
        carbon_average: f64,

        #[arg(long)]
        carbon_target: f64,
    },

    /// Commit new carbon values or a selected method
    Update {
        estimate_id: i64,

        /// Method to mark as selected
        #[arg(short, long)]
        method: Option<String>,

        #[arg(long, requires = "carbon_target")]
        carbon_average: Option<f64>,

        #[arg(long, requires = "carbon_average")]
        carbon_target: Option<f64>,
    },

    /// Delete an estimate and its method estimates
    Delete {
        estimate_id: i64,
    },

    /// Show ERF method co-benefits
    Cobenefits {
        /// Only show this method
        method: Option<String>,
    },

    /// Check the LOOC-C API is reachable
    Ping,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accu_estimator=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings {
        database: cli.database,
        api_key: cli.api_key,
        base_uri: cli.base_uri,
        timeout_secs: cli.timeout_secs,
    };

    let conn = Connection::open(&settings.database)
        .with_context(|| format!("Failed to open {}", settings.database.display()))?;
    db::init_schema(&conn)?;
    let now = chrono::Utc::now().timestamp();

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", settings.database.display());
        }

        Commands::Estimate {
            asset_id,
            geometry: geometry_path,
            project_types,
            carbon_improvement,
            new_irrigation,
            project_length,
        } => {
            let client = authenticated_client(&settings)?;

            // Load the parcel
            let area = geometry::load_project_area(&geometry_path)
                .map_err(error::EstimateError::from)
                .with_context(|| format!("Asset {} has no project area", asset_id))?;
            info!(asset_id, points = area.points().len(), "loaded project area");
            if let Some(existing) = db::get_baseline_for_asset(&conn, asset_id)? {
                info!(estimate_id = existing.id, "replacing existing estimate");
            }

            // Query every method family and store the result
            let metadata = ProjectMetadata {
                project_types,
                carbon_improvement,
                new_irrigation,
                project_length,
            };
            let aggregation = aggregator::aggregate(&client, asset_id, &area, &metadata, now)
                .with_context(|| format!("Could not create an estimate for asset {}", asset_id))?;
            let estimate_id = aggregator::persist(&conn, &aggregation)?;

            // Display names come from the ERF co-benefit metadata
            let catalog = CobenefitCatalog::load(&conn, Some(&client), now)?;
            println!("{}", calculator::summarize_estimate(&conn, estimate_id, &catalog)?);
        }

        Commands::List => {
            let baselines = db::list_baselines(&conn)?;
            if baselines.is_empty() {
                println!("No estimates in database. Run 'estimate' first.");
            } else {
                let catalog = offline_catalog(&conn, &settings, now)?;
                println!(
                    "{:>5} {:>8} {:<32} {:>10} {:>8} {:>8}",
                    "ID", "Asset", "Top method", "Annual", "Carbon", "LRF"
                );
                println!("{}", "-".repeat(76));
                for b in baselines {
                    // Selected method first, else the highest annual estimate
                    let methods = db::list_method_estimates(&conn, b.id)?;
                    let top = b
                        .selected_method
                        .as_deref()
                        .and_then(|id| methods.iter().find(|m| m.method_id == id))
                        .or_else(|| methods.first());
                    let (name, annual) = match top {
                        Some(m) => (catalog.display_name(&m.method_id), format!("{:.0}", m.annual)),
                        None => ("-".to_string(), "-".to_string()),
                    };
                    let rating = db::average_summary_rating(&conn, b.id)?
                        .map_or_else(|| "N/A".to_string(), |r| format!("{:.1}", r));
                    println!(
                        "{:>5} {:>8} {:<32} {:>10} {:>7.1}% {:>8}",
                        b.id, b.asset_id, name, annual, b.carbon_target, rating
                    );
                }
            }
        }

        Commands::Show { estimate_id } => {
            let catalog = offline_catalog(&conn, &settings, now)?;
            println!("{}", calculator::summarize_estimate(&conn, estimate_id, &catalog)?);
        }

        Commands::Preview {
            estimate_id,
            carbon_average,
            carbon_target,
        } => {
            // Local only, nothing is written
            let preview =
                calculator::preview_carbon_change(&conn, estimate_id, carbon_average, carbon_target)?;
            println!("{}", preview);
        }

        Commands::Update {
            estimate_id,
            method,
            carbon_average,
            carbon_target,
        } => {
            if db::get_baseline(&conn, estimate_id)?.is_none() {
                bail!("Estimate {} not found", estimate_id);
            }

            if let Some(method) = method {
                db::set_selected_method(&conn, estimate_id, &method)?;
                println!("Selected method: {}", method);
            }

            // Confirm new carbon values against the provider
            if let (Some(average), Some(target)) = (carbon_average, carbon_target) {
                let client = authenticated_client(&settings)?;
                match aggregator::commit_carbon_update(&conn, &client, estimate_id, average, target)? {
                    Some(estimate) => println!(
                        "Confirmed SOC estimate: {:.0} ACCUs/yr ({:.0} over project)",
                        estimate.annual, estimate.project_total
                    ),
                    None => println!("SOC estimate unavailable; carbon values saved without a new estimate"),
                }
            }
        }

        Commands::Delete { estimate_id } => {
            if db::delete_estimate(&conn, estimate_id)? {
                println!("Deleted estimate {}", estimate_id);
            } else {
                println!("Estimate {} not found", estimate_id);
            }
        }

        Commands::Cobenefits { method } => {
            let catalog = offline_catalog(&conn, &settings, now)?;
            let methods: Vec<&str> = match &method {
                Some(m) => vec![m.as_str()],
                None => ERF_METHODS.to_vec(),
            };
            // Cached metadata is used even without an API key
            let mut shown = 0;
            for method_id in methods {
                if let Some(cobenefits) = catalog.get(method_id) {
                    println!("{}", cobenefits);
                    shown += 1;
                }
            }
            if shown == 0 {
                println!("No co-benefit information available. Check the API key and try again.");
            }
        }

        Commands::Ping => {
            let client = authenticated_client(&settings)?;
            if client.ping()? {
                println!("LOOC-C API reachable at {}", settings.base_uri);
            } else {
                bail!("LOOC-C API did not respond with 200");
            }
        }
    }

    Ok(())
}

fn authenticated_client(settings: &Settings) -> Result<LooccClient> {
    if settings.api_key.as_deref().is_none_or(str::is_empty) {
        bail!("No API key configured. Pass --api-key or set LOOCC_API_KEY.");
    }
    Ok(LooccClient::new(&settings.client_config())?)
}

/// Catalog from cache, topped up from the API only when a key is configured
fn offline_catalog(conn: &Connection, settings: &Settings, now: i64) -> Result<CobenefitCatalog> {
    let client = authenticated_client(settings).ok();
    CobenefitCatalog::load(conn, client.as_ref(), now)
}
