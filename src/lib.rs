#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate api_test;

use std::sync::Arc;

use rocket::{Build, Rocket};

use crate::closer::ElectionCloserFairing;
use crate::config::{ConfigFairing, ElectionConfig};
use crate::ledger::ElectionLedger;
use crate::logging::LoggerFairing;
use crate::sink::BroadcastSink;

pub mod api;
pub mod audit;
pub mod clock;
pub mod closer;
pub mod config;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod scheduled_task;
pub mod sink;

/// Assemble the server: the ledger is opened from config at ignition.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(ElectionCloserFairing)
        .mount("/", api::routes())
}

/// Assemble the server around a ledger that is already open.
pub fn rocket_for_ledger(
    ledger: Arc<ElectionLedger>,
    broadcast: Arc<BroadcastSink>,
    config: ElectionConfig,
) -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .manage(ledger)
        .manage(broadcast)
        .manage(config)
        .attach(ElectionCloserFairing)
        .mount("/", api::routes())
}

/// A server over a fresh ledger whose clock only moves when told to.
#[cfg(test)]
pub(crate) fn rocket_for_test(config: ElectionConfig) -> (Rocket<Build>, clock::ManualClock) {
    use crate::clock::ManualClock;
    use crate::config::{server_sink, EVENT_BUFFER};

    let clock = ManualClock::starting_at(model::Election::example_start());
    let broadcast = Arc::new(BroadcastSink::new(EVENT_BUFFER));
    let ledger = config
        .open_ledger(Arc::new(clock.clone()), server_sink(broadcast.clone()))
        .unwrap();
    (rocket_for_ledger(Arc::new(ledger), broadcast, config), clock)
}
