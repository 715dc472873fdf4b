//! The demo facility: one stocker, two tools with a tray port each, two
//! robots.
//!
//! ```text
//!                                      tp-1   tp-2
//!                                       │      │
//!   stk-1  stk-2  stk-3                lp-1 ── lp-2
//!     └──────┴──────┴──── aisle ─────────┘
//! ```

use std::io::Cursor;

use anyhow::Result;

use mh_core::{Carrier, Position, Robot};
use mh_topology::{FacilityLayout, load_layout_readers};

const LOCATIONS_CSV: &str = "\
id,name,kind,x,y,z,parent\n\
stk-1,Stocker port 1,cassette_port,0,0,0,\n\
stk-2,Stocker port 2,cassette_port,2,0,0,\n\
stk-3,Stocker port 3,cassette_port,4,0,0,\n\
aisle,Aisle marker,marker,6,3,0,\n\
lp-1,Tool load port 1,cassette_port,12,6,0,\n\
lp-2,Tool load port 2,cassette_port,14,6,0,\n\
tp-1,Tool tray port 1,tray_port,12,8,0,lp-1\n\
tp-2,Tool tray port 2,tray_port,14,8,0,lp-2\n\
";

const EDGES_CSV: &str = "\
from,to,cost,bidirectional\n\
stk-1,stk-2,2,true\n\
stk-2,stk-3,2,true\n\
stk-3,aisle,3.6,true\n\
aisle,lp-1,8.5,true\n\
lp-1,lp-2,2,true\n\
lp-1,tp-1,2,true\n\
lp-2,tp-2,2,true\n\
";

pub fn build_layout() -> Result<FacilityLayout> {
    Ok(load_layout_readers(Cursor::new(LOCATIONS_CSV), Cursor::new(EDGES_CSV))?)
}

pub fn robots() -> Vec<Robot> {
    vec![
        Robot::new("amr-1", Position::planar(1.0, 2.0)),
        Robot::new("amr-2", Position::planar(8.0, 4.0)),
    ]
}

/// Two cassettes in the stocker, each holding one tray with one memory unit.
pub fn carriers() -> Vec<Carrier> {
    use mh_core::ItemKind::{Memory, Tray};
    vec![
        Carrier::cassette("cst-1", "stk-1"),
        Carrier::stowed("tray-1", Tray, "cst-1"),
        Carrier::stowed("mem-1", Memory, "tray-1"),
        Carrier::cassette("cst-2", "stk-2"),
        Carrier::stowed("tray-2", Tray, "cst-2"),
        Carrier::stowed("mem-2", Memory, "tray-2"),
    ]
}
