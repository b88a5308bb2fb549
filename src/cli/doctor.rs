//! CLI `doctor` command: diagnose the store and print the TTL table in effect.

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::config::StrataConfig;
use crate::db;
use crate::db::migrations::CURRENT_SCHEMA_VERSION;
use crate::memory::now_ts;
use crate::memory::ttl::TtlPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Warn => "warn",
            Status::Fail => "FAIL",
        }
    }
}

#[derive(Debug)]
struct Check {
    name: &'static str,
    status: Status,
    detail: String,
}

pub fn doctor(config: &StrataConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    if !db_path.exists() {
        println!("No database at {}.", db_path.display());
        println!("It is created on first use, e.g. `strata learn \"...\"`.");
        return Ok(());
    }

    let size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let checks = run_checks(&conn, now_ts()).context("failed to run diagnostics")?;

    println!("Strata doctor");
    println!("{}", "=".repeat(60));
    println!("{} ({})", db_path.display(), format_bytes(size));
    println!();
    for check in &checks {
        println!("[{:>4}] {:<14} {}", check.status.label(), check.name, check.detail);
    }

    let policy = TtlPolicy::with_overrides(&config.scheduler.ttl);
    println!();
    println!("TTL policy ({} overrides):", config.scheduler.ttl.len());
    for (category, secs) in policy.entries() {
        println!("  {:<12} {:>9}s", category.as_str(), secs);
    }
    println!();
    match config.scheduler.enabled {
        true => println!("Background sweep every {}s.", config.scheduler.interval_secs),
        false => println!("Background sweep disabled."),
    }

    if checks.iter().any(|c| c.status == Status::Fail) {
        println!();
        println!("To recover, rebuild from an export of a healthy copy:");
        println!("  strata export > facts.json");
        println!("  strata reset && strata import facts.json");
    }
    Ok(())
}

fn run_checks(conn: &Connection, now: i64) -> Result<Vec<Check>> {
    let health = db::check_database_health(conn)?;
    let mut checks = Vec::new();

    checks.push(Check {
        name: "schema",
        status: if health.schema_version == CURRENT_SCHEMA_VERSION { Status::Ok } else { Status::Fail },
        detail: format!("v{} (binary expects v{CURRENT_SCHEMA_VERSION})", health.schema_version),
    });

    checks.push(Check {
        name: "integrity",
        status: if health.integrity_ok { Status::Ok } else { Status::Fail },
        detail: health.integrity_details.clone(),
    });

    // One docsize row per indexed document.
    let indexed: i64 = conn.query_row("SELECT COUNT(*) FROM facts_fts_docsize", [], |r| r.get(0))?;
    checks.push(Check {
        name: "search index",
        status: if indexed == health.fact_count { Status::Ok } else { Status::Fail },
        detail: format!("{indexed} indexed / {} live facts", health.fact_count),
    });

    let backlog: i64 = conn.query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE expires_at < ?1",
        [now],
        |r| r.get(0),
    )?;
    checks.push(Check {
        name: "cache",
        status: if backlog == 0 { Status::Ok } else { Status::Warn },
        detail: format!("{} entries, {backlog} expired awaiting sweep", health.cache_count),
    });

    checks.push(Check {
        name: "facts",
        status: Status::Ok,
        detail: format!(
            "{} live, {} soft-deleted, {} audit entries",
            health.fact_count, health.deleted_fact_count, health.log_count
        ),
    });

    Ok(checks)
}

fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    match bytes as f64 {
        b if b < KB => format!("{bytes} B"),
        b if b < KB * KB => format!("{:.1} KB", b / KB),
        b => format!("{:.1} MB", b / (KB * KB)),
    }
}
