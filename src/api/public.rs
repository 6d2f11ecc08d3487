use std::sync::Arc;

use rocket::{get, post, routes, serde::json::Json, Route, State};

use crate::closer::ElectionCloser;
use crate::error::Result;
use crate::ledger::ElectionLedger;
use crate::model::{
    api::{CandidatesCount, HasVoted, IsAuthorized},
    Candidate, CandidateId, ElectionStats, LedgerSnapshot, Principal, TimeRemaining, Voter,
    Winners,
};

pub fn routes() -> Vec<Route> {
    routes![
        election,
        time_remaining,
        check_end,
        candidates,
        candidates_count,
        candidate,
        winners,
        voter,
        voter_has_voted,
        voter_is_authorized,
        ledger_dump,
    ]
}

#[get("/election")]
fn election(ledger: &State<Arc<ElectionLedger>>) -> Json<ElectionStats> {
    Json(ledger.election_stats(ledger.now()))
}

#[get("/election/remaining")]
fn time_remaining(ledger: &State<Arc<ElectionLedger>>) -> Json<TimeRemaining> {
    let remaining = ledger.time_remaining(ledger.now());
    Json(TimeRemaining {
        seconds: remaining.num_seconds(),
    })
}

/// Anyone may close an election whose window has run out.
#[post("/election/check-end")]
async fn check_end(
    ledger: &State<Arc<ElectionLedger>>,
    closer: &State<ElectionCloser>,
) -> Result<()> {
    ledger.check_and_end_election(ledger.now())?;
    closer.cancel().await;
    Ok(())
}

#[get("/candidates")]
fn candidates(ledger: &State<Arc<ElectionLedger>>) -> Json<Vec<Candidate>> {
    Json(ledger.all_candidates())
}

#[get("/candidates/count")]
fn candidates_count(ledger: &State<Arc<ElectionLedger>>) -> Json<CandidatesCount> {
    Json(CandidatesCount {
        count: ledger.candidates_count(),
    })
}

#[get("/candidates/<candidate_id>", rank = 2)]
fn candidate(
    candidate_id: CandidateId,
    ledger: &State<Arc<ElectionLedger>>,
) -> Result<Json<Candidate>> {
    ledger.candidate(candidate_id).map(Json)
}

#[get("/winners")]
fn winners(ledger: &State<Arc<ElectionLedger>>) -> Result<Json<Winners>> {
    ledger.winners().map(Json)
}

#[get("/voters/<voter>")]
fn voter(voter: Principal, ledger: &State<Arc<ElectionLedger>>) -> Json<Voter> {
    Json(ledger.voter_info(&voter))
}

#[get("/voters/<voter>/voted")]
fn voter_has_voted(voter: Principal, ledger: &State<Arc<ElectionLedger>>) -> Json<HasVoted> {
    Json(HasVoted {
        has_voted: ledger.has_user_voted(&voter),
    })
}

#[get("/voters/<voter>/authorized")]
fn voter_is_authorized(
    voter: Principal,
    ledger: &State<Arc<ElectionLedger>>,
) -> Json<IsAuthorized> {
    Json(IsAuthorized {
        is_authorized: ledger.is_authorized(&voter),
    })
}

/// Everything needed to audit the ledger independently.
#[get("/ledger/dump")]
fn ledger_dump(ledger: &State<Arc<ElectionLedger>>) -> Json<LedgerSnapshot> {
    Json(ledger.snapshot())
}
