//! small — end-to-end demo of the material-handling core.
//!
//! Builds a six-location facility with two robots, submits one lot that
//! carries two cassettes into the tools in parallel and back out one at a
//! time, and waits for it to complete.
//!
//! Usage: `small [config.json]`.  Log verbosity follows `RUST_LOG`
//! (default `info`).

mod layout;

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mh_core::{FacilityConfig, ItemId};
use mh_events::MemoryPublisher;
use mh_facility::FacilityBuilder;
use mh_plan::{LotStatus, load_work_orders_reader};
use mh_store::MemoryStore;

use layout::{build_layout, carriers, robots};

const LOT_TIMEOUT: Duration = Duration::from_secs(120);

// Step 1: both cassettes into the tools together, cover handled, processing
// started.  Step 2: back to the stocker one after the other.
const WORK_ORDERS_CSV: &str = "\
lot,priority,step_no,flow,cassette,destination,cover,start,strategy,tray_port\n\
lot-1,5,1,inbound,cst-1,lp-1,true,true,parallel,tp-1\n\
lot-1,5,1,inbound,cst-2,lp-2,true,true,parallel,tp-2\n\
lot-1,5,2,outbound,cst-1,stk-3,true,false,sequential,\n\
lot-1,5,2,outbound,cst-2,stk-1,true,false,sequential,\n\
";

fn load_config() -> Result<FacilityConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let file = std::fs::File::open(Path::new(&path)).with_context(|| format!("opening {path}"))?;
            let config: FacilityConfig = serde_json::from_reader(file).with_context(|| format!("parsing {path}"))?;
            Ok(config)
        }
        None => Ok(FacilityConfig {
            tick_interval_ms: 50,
            robot_speed:      8.0,
            ..FacilityConfig::default()
        }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== small — material-handling core demo ===");

    // 1. Configuration and collaborators.
    let config = load_config()?;
    config.validate()?;
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(MemoryPublisher::new());

    // 2. Facility.
    let facility = FacilityBuilder::new(config, store, build_layout()?)
        .robots(robots())
        .carriers(carriers())
        .publisher(publisher.clone())
        .build()?;
    println!(
        "Facility: {} locations, {} carriers, {} robots",
        facility.topology().len(),
        facility.transport().len(),
        facility.robot_ids().len(),
    );

    // 3. Run.
    let cancel = CancellationToken::new();
    let handle = facility.start(cancel.clone()).await?;

    let orders = load_work_orders_reader(Cursor::new(WORK_ORDERS_CSV))?;
    let started = Instant::now();
    let mut lots = Vec::with_capacity(orders.len());
    for order in orders {
        lots.push(facility.submit_work_order(order).await?);
    }

    for lot in &lots {
        let status = tokio::time::timeout(LOT_TIMEOUT, facility.wait_for_lot(lot))
            .await
            .with_context(|| format!("lot {lot} did not finish in {LOT_TIMEOUT:?}"))?;
        info!(lot = %lot, status = ?status, "lot finished");
        if status != Some(LotStatus::Completed) {
            bail!("lot {lot} ended as {status:?}");
        }
    }
    let elapsed = started.elapsed();

    // 4. Report.
    println!();
    println!("Lots completed in {:.1}s", elapsed.as_secs_f64());
    for item in ["cst-1", "tray-1", "mem-1", "cst-2"] {
        let at = facility.carrier_location(&ItemId::from(item))?;
        println!("  {item:<7} at {at}");
    }
    for robot in facility.robot_ids() {
        let position = facility.robot_position(&robot).await?;
        println!("  {robot:<7} at {position}");
    }
    println!("Events emitted: {}", facility.events().emitted());

    handle.shutdown().await;
    println!("Events published: {}", publisher.published().len());
    Ok(())
}
