use std::sync::Arc;

use chrono::Duration;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::ledger::ElectionLedger;
use crate::model::{ElectionSpec, Principal};
use crate::sink::{BroadcastSink, EventSink, FanoutSink, LogSink};

/// How many events a slow `/events` subscriber may fall behind by.
pub const EVENT_BUFFER: usize = 1024;

fn default_closer_retry_secs() -> u32 {
    300
}

/// Election configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state.
#[derive(Debug, Clone, Deserialize)]
pub struct ElectionConfig {
    admin: Principal,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    require_authorization: bool,
    /// Voting window to open with; unbounded if absent.
    duration_hours: Option<u32>,
    /// Voters to authorize before anyone can vote.
    #[serde(default)]
    authorized_voters: Vec<Principal>,
    #[serde(default = "default_closer_retry_secs")]
    closer_retry_secs: u32,
}

impl ElectionConfig {
    /// The initial election administrator.
    pub fn admin(&self) -> &Principal {
        &self.admin
    }

    pub fn spec(&self) -> ElectionSpec {
        ElectionSpec {
            title: self.title.clone(),
            description: self.description.clone(),
            require_authorization: self.require_authorization,
        }
    }

    pub fn duration_hours(&self) -> Option<u32> {
        self.duration_hours
    }

    /// How long the closer waits before trying again if it fires early.
    pub fn closer_retry(&self) -> Duration {
        Duration::seconds(self.closer_retry_secs.into())
    }

    /// Open a new ledger as configured: the window is set and the initial
    /// voters authorized on behalf of the configured admin.
    pub fn open_ledger(
        &self,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Result<ElectionLedger> {
        let ledger = ElectionLedger::new(self.admin.clone(), self.spec(), clock, sink);
        if let Some(hours) = self.duration_hours {
            ledger.set_election_duration(&self.admin, hours)?;
        }
        if !self.authorized_voters.is_empty() {
            ledger.authorize_voters(&self.admin, &self.authorized_voters)?;
        }
        Ok(ledger)
    }
}

/// The sink the server uses: everything is logged and broadcast to `/events`.
pub fn server_sink(broadcast: Arc<BroadcastSink>) -> Arc<dyn EventSink> {
    Arc::new(FanoutSink::new(vec![Arc::new(LogSink), broadcast]))
}

/// A fairing that loads the election config, opens the ledger, and places
/// the config, the ledger and the event broadcaster into managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<ElectionConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load election config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if config.admin.is_null() {
            error!("Election admin must not be the null principal");
            return Err(rocket);
        }

        // Open the ledger.
        let broadcast = Arc::new(BroadcastSink::new(EVENT_BUFFER));
        let sink = server_sink(broadcast.clone());
        let ledger = match config.open_ledger(Arc::new(SystemClock), sink) {
            Ok(ledger) => ledger,
            Err(e) => {
                error!("Failed to open the ledger as configured: {e}");
                return Err(rocket);
            }
        };
        info!("Ledger open for \"{}\"", config.title);

        Ok(rocket
            .manage(Arc::new(ledger))
            .manage(broadcast)
            .manage(config))
    }
}
