use std::sync::Arc;

use rocket::{
    get,
    response::stream::{Event, EventStream},
    routes,
    tokio::{select, sync::broadcast::error::RecvError},
    Route, Shutdown, State,
};

use crate::sink::BroadcastSink;

pub fn routes() -> Vec<Route> {
    routes![events]
}

/// Stream every ledger event as it is committed, named by its kind.
/// Events committed before the subscription are not replayed; the journal in
/// `/ledger/dump` has those.
#[get("/events")]
fn events(broadcast: &State<Arc<BroadcastSink>>, mut end: Shutdown) -> EventStream![] {
    let mut receiver = broadcast.subscribe();
    debug!("New event subscriber, {} total", broadcast.subscriber_count());
    EventStream! {
        loop {
            let event = select! {
                biased;
                received = receiver.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event subscriber fell behind, {skipped} events dropped");
                        continue;
                    }
                },
                _ = &mut end => break,
            };
            yield Event::json(&event).event(event.kind());
        }
    }
}
