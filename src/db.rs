//! Database schema and operations

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{BaselineEstimate, ChangeRate, MethodEstimate, RatingCategory, RatingSet};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One baseline estimate per asset
        CREATE TABLE IF NOT EXISTS estimates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_id INTEGER NOT NULL UNIQUE,
            timestamp INTEGER NOT NULL,
            project_length INTEGER NOT NULL,
            new_irrigation INTEGER NOT NULL DEFAULT 0,
            polygon_area REAL NOT NULL,
            bd_average REAL NOT NULL,
            carbon_average REAL NOT NULL,
            carbon_target REAL NOT NULL,
            warning_message TEXT,
            selected_method TEXT,
            change_rate REAL
        );

        -- ACCU estimates per method, related to a baseline
        CREATE TABLE IF NOT EXISTS accu_estimates (
            estimate_id INTEGER NOT NULL,
            method_id TEXT NOT NULL,
            annual REAL NOT NULL,
            project REAL NOT NULL,
            warning_message TEXT,
            great_barrier_reef REAL,
            coastal_ecosystems REAL,
            wetlands REAL,
            threatened_ecosystems REAL,
            threatened_wildlife REAL,
            native_vegetation REAL,
            summary REAL,
            PRIMARY KEY (estimate_id, method_id)
        );

        -- Provider co-benefit metadata, refreshed weekly
        CREATE TABLE IF NOT EXISTS cobenefit_cache (
            method_id TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            expires INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_accu_estimates_estimate ON accu_estimates(estimate_id);
        "#,
    )?;
    Ok(())
}

/// Insert or update the baseline for `baseline.asset_id`, returning its id.
/// `baseline.id` is ignored; an existing row keeps its id so method rows stay attached.
pub fn upsert_baseline(conn: &Connection, baseline: &BaselineEstimate) -> Result<i64> {
    conn.execute(
        "INSERT INTO estimates (asset_id, timestamp, project_length, new_irrigation, polygon_area,
                                bd_average, carbon_average, carbon_target, warning_message, change_rate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(asset_id) DO UPDATE SET
            timestamp = excluded.timestamp,
            project_length = excluded.project_length,
            new_irrigation = excluded.new_irrigation,
            polygon_area = excluded.polygon_area,
            bd_average = excluded.bd_average,
            carbon_average = excluded.carbon_average,
            carbon_target = excluded.carbon_target,
            warning_message = excluded.warning_message,
            change_rate = excluded.change_rate",
        params![
            baseline.asset_id,
            baseline.timestamp,
            baseline.project_length,
            baseline.new_irrigation,
            baseline.polygon_area,
            baseline.bulk_density_average,
            baseline.carbon_average,
            baseline.carbon_target,
            baseline.warning_message,
            baseline.change_rate.as_option(),
        ],
    )?;

    let id = conn.query_row(
        "SELECT id FROM estimates WHERE asset_id = ?1",
        [baseline.asset_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Insert or replace a method estimate. ACCU figures are stored as whole units.
pub fn upsert_method_estimate(conn: &Connection, estimate_id: i64, estimate: &MethodEstimate) -> Result<()> {
    let rating = |category: RatingCategory| {
        estimate
            .cobenefit_ratings
            .as_ref()
            .and_then(|ratings| ratings.get(&category).copied())
    };

    conn.execute(
        "INSERT OR REPLACE INTO accu_estimates (estimate_id, method_id, annual, project, warning_message,
                great_barrier_reef, coastal_ecosystems, wetlands, threatened_ecosystems,
                threatened_wildlife, native_vegetation, summary)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            estimate_id,
            estimate.method_id,
            estimate.annual.round(),
            estimate.project_total.round(),
            estimate.warning_message,
            rating(RatingCategory::GreatBarrierReef),
            rating(RatingCategory::CoastalEcosystems),
            rating(RatingCategory::Wetlands),
            rating(RatingCategory::ThreatenedEcosystems),
            rating(RatingCategory::ThreatenedWildlife),
            rating(RatingCategory::NativeVegetation),
            rating(RatingCategory::Summary),
        ],
    )?;
    Ok(())
}

const BASELINE_COLUMNS: &str = "id, asset_id, timestamp, project_length, new_irrigation, polygon_area,
     bd_average, carbon_average, carbon_target, warning_message, selected_method, change_rate";

fn baseline_from_row(row: &Row) -> rusqlite::Result<BaselineEstimate> {
    Ok(BaselineEstimate {
        id: row.get(0)?,
        asset_id: row.get(1)?,
        timestamp: row.get(2)?,
        project_length: row.get(3)?,
        new_irrigation: row.get(4)?,
        polygon_area: row.get(5)?,
        bulk_density_average: row.get(6)?,
        carbon_average: row.get(7)?,
        carbon_target: row.get(8)?,
        warning_message: row.get(9)?,
        selected_method: row.get(10)?,
        change_rate: ChangeRate::from_option(row.get(11)?),
    })
}

/// Get a baseline by estimate id
pub fn get_baseline(conn: &Connection, estimate_id: i64) -> Result<Option<BaselineEstimate>> {
    let sql = format!("SELECT {} FROM estimates WHERE id = ?1", BASELINE_COLUMNS);
    let baseline = conn
        .query_row(&sql, [estimate_id], baseline_from_row)
        .optional()?;
    Ok(baseline)
}

/// Get the baseline for an asset
pub fn get_baseline_for_asset(conn: &Connection, asset_id: i64) -> Result<Option<BaselineEstimate>> {
    let sql = format!("SELECT {} FROM estimates WHERE asset_id = ?1", BASELINE_COLUMNS);
    let baseline = conn
        .query_row(&sql, [asset_id], baseline_from_row)
        .optional()?;
    Ok(baseline)
}

/// List all baselines, newest first
pub fn list_baselines(conn: &Connection) -> Result<Vec<BaselineEstimate>> {
    let sql = format!("SELECT {} FROM estimates ORDER BY timestamp DESC, id", BASELINE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], baseline_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Get all method estimates for a baseline, highest annual first
pub fn list_method_estimates(conn: &Connection, estimate_id: i64) -> Result<Vec<MethodEstimate>> {
    let mut stmt = conn.prepare(
        "SELECT method_id, annual, project, warning_message,
                great_barrier_reef, coastal_ecosystems, wetlands, threatened_ecosystems,
                threatened_wildlife, native_vegetation, summary
         FROM accu_estimates
         WHERE estimate_id = ?1
         ORDER BY annual DESC, method_id",
    )?;

    let rows = stmt.query_map([estimate_id], |row| {
        let mut ratings = RatingSet::new();
        for (offset, category) in RatingCategory::ALL.iter().enumerate() {
            if let Some(value) = row.get::<_, Option<f64>>(4 + offset)? {
                ratings.insert(*category, value);
            }
        }
        Ok(MethodEstimate {
            method_id: row.get(0)?,
            annual: row.get(1)?,
            project_total: row.get(2)?,
            warning_message: row.get(3)?,
            cobenefit_ratings: if ratings.is_empty() { None } else { Some(ratings) },
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Store new carbon inputs on a baseline
pub fn update_carbon_values(
    conn: &Connection,
    estimate_id: i64,
    carbon_average: f64,
    carbon_target: f64,
) -> Result<()> {
    conn.execute(
        "UPDATE estimates SET carbon_average = ?2, carbon_target = ?3 WHERE id = ?1",
        params![estimate_id, carbon_average, carbon_target],
    )?;
    Ok(())
}

pub fn set_change_rate(conn: &Connection, estimate_id: i64, rate: ChangeRate) -> Result<()> {
    conn.execute(
        "UPDATE estimates SET change_rate = ?2 WHERE id = ?1",
        params![estimate_id, rate.as_option()],
    )?;
    Ok(())
}

pub fn set_selected_method(conn: &Connection, estimate_id: i64, method_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE estimates SET selected_method = ?2 WHERE id = ?1",
        params![estimate_id, method_id],
    )?;
    Ok(())
}

/// Delete a baseline and its method estimates. Returns false if it did not exist.
pub fn delete_estimate(conn: &Connection, estimate_id: i64) -> Result<bool> {
    conn.execute("DELETE FROM accu_estimates WHERE estimate_id = ?1", [estimate_id])?;
    let removed = conn.execute("DELETE FROM estimates WHERE id = ?1", [estimate_id])?;
    Ok(removed > 0)
}

/// Mean LRF summary rating across a baseline's methods, to one decimal place
pub fn average_summary_rating(conn: &Connection, estimate_id: i64) -> Result<Option<f64>> {
    let average = conn.query_row(
        "SELECT ROUND(AVG(summary), 1) FROM accu_estimates WHERE estimate_id = ?1",
        [estimate_id],
        |row| row.get(0),
    )?;
    Ok(average)
}

/// Cached co-benefit payload for a method, if it has not expired
pub fn cached_cobenefits(conn: &Connection, method_id: &str, now: i64) -> Result<Option<String>> {
    let payload = conn
        .query_row(
            "SELECT payload FROM cobenefit_cache WHERE method_id = ?1 AND expires > ?2",
            params![method_id, now],
            |row| row.get(0),
        )
        .optional()?;
    Ok(payload)
}

pub fn store_cobenefits(conn: &Connection, method_id: &str, payload: &str, expires: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO cobenefit_cache (method_id, payload, expires) VALUES (?1, ?2, ?3)",
        params![method_id, payload, expires],
    )?;
    Ok(())
}
