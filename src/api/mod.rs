use rocket::Route;

mod admin;
mod common;
mod events;
mod public;
mod voter;

pub use common::{Caller, PRINCIPAL_HEADER};

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(public::routes());
    routes.extend(voter::routes());
    routes.extend(events::routes());
    routes
}
