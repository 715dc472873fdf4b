//! CSV work-order loader.
//!
//! # CSV format
//!
//! One row per cassette move.  Rows sharing `lot` form one work order;
//! rows sharing `lot` and `step_no` form one lot step.  Lots and steps keep
//! the order of their first row, moves keep file order.
//!
//! ```csv
//! lot,priority,step_no,flow,cassette,destination,cover,start,strategy
//! lot-1,5,1,inbound,c1,lp-1,true,true,parallel
//! lot-1,5,1,inbound,c2,lp-2,true,true,parallel
//! lot-1,5,2,outbound,c1,stk-1,false,false,sequential
//! ```
//!
//! Every row of one step must agree on `flow`, `cover`, `start` and
//! `strategy`; the first row wins and disagreement is a parse error.
//!
//! An optional trailing `tray_port` column names the port an inbound
//! cassette's trays visit; leave it empty (or omit the column) for none.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use mh_core::{ItemId, LocationId, LotId};

use crate::{CassetteMove, ExecutionStrategy, FlowDirection, LotStep, PlanError, PlanResult, ProcessParams, WorkOrder};

#[derive(Deserialize)]
struct MoveRecord {
    lot:         String,
    priority:    i32,
    step_no:     u32,
    flow:        String,
    cassette:    String,
    destination: String,
    cover:       bool,
    start:       bool,
    strategy:    String,
    #[serde(default)]
    tray_port:   Option<String>,
}

pub fn load_work_orders_csv(path: &Path) -> PlanResult<Vec<WorkOrder>> {
    let file = std::fs::File::open(path)?;
    load_work_orders_reader(file)
}

/// Like [`load_work_orders_csv`] but accepts any `Read` source.
pub fn load_work_orders_reader<R: Read>(reader: R) -> PlanResult<Vec<WorkOrder>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut orders: Vec<WorkOrder> = Vec::new();

    for result in csv_reader.deserialize::<MoveRecord>() {
        let row = result.map_err(|e| PlanError::Parse(e.to_string()))?;
        let flow = parse_flow(&row.flow)?;
        let strategy: ExecutionStrategy = row.strategy.parse().map_err(PlanError::Parse)?;
        let params = ProcessParams { cover: row.cover, start: row.start };
        let lot = LotId::from(row.lot);

        let order = match orders.iter_mut().position(|o| o.lot == lot) {
            Some(i) => &mut orders[i],
            None => {
                orders.push(WorkOrder { lot: lot.clone(), priority: row.priority, steps: Vec::new() });
                let last = orders.len() - 1;
                &mut orders[last]
            }
        };

        let step = match order.steps.iter_mut().position(|s| s.step_no == row.step_no) {
            Some(i) => {
                let step = &mut order.steps[i];
                if step.flow != flow || step.params != params || step.strategy != strategy {
                    return Err(PlanError::Parse(format!(
                        "lot {lot} step {}: rows disagree on flow/params/strategy",
                        row.step_no
                    )));
                }
                step
            }
            None => {
                order.steps.push(LotStep {
                    step_no: row.step_no,
                    flow,
                    moves: Vec::new(),
                    params,
                    strategy,
                    group: None,
                    completed: false,
                });
                let last = order.steps.len() - 1;
                &mut order.steps[last]
            }
        };

        step.moves.push(CassetteMove {
            cassette:    ItemId::from(row.cassette),
            destination: LocationId::from(row.destination),
            tray_port:   row.tray_port.filter(|p| !p.trim().is_empty()).map(LocationId::from),
        });
    }

    Ok(orders)
}

fn parse_flow(s: &str) -> PlanResult<FlowDirection> {
    match s.trim() {
        "inbound"  => Ok(FlowDirection::Inbound),
        "outbound" => Ok(FlowDirection::Outbound),
        other => Err(PlanError::Parse(format!(
            "invalid flow {other:?}: expected \"inbound\" or \"outbound\""
        ))),
    }
}
