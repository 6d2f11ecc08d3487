use std::sync::Arc;

use rocket::{delete, post, routes, serde::json::Json, Route, State};

use crate::api::Caller;
use crate::closer::ElectionCloser;
use crate::error::Result;
use crate::ledger::ElectionLedger;
use crate::model::{
    api::{DurationRequest, EndTime, RemovedVote, TransferRequest},
    Candidate, CandidateId, CandidateSpec, Principal,
};

pub fn routes() -> Vec<Route> {
    routes![
        set_duration,
        authorize_voters,
        authorize_voter,
        add_candidate,
        deactivate_candidate,
        transfer_admin,
        end_election,
        remove_vote,
    ]
}

#[post("/admin/duration", data = "<request>", format = "json")]
async fn set_duration(
    caller: Caller,
    request: Json<DurationRequest>,
    ledger: &State<Arc<ElectionLedger>>,
    closer: &State<ElectionCloser>,
) -> Result<Json<EndTime>> {
    let end_time = ledger.set_election_duration(&caller.0, request.hours)?;
    closer.schedule(end_time).await;
    Ok(Json(EndTime { end_time }))
}

#[post("/admin/voters", data = "<voters>", format = "json")]
fn authorize_voters(
    caller: Caller,
    voters: Json<Vec<Principal>>,
    ledger: &State<Arc<ElectionLedger>>,
) -> Result<()> {
    ledger.authorize_voters(&caller.0, &voters)
}

#[post("/admin/voters/<voter>")]
fn authorize_voter(
    caller: Caller,
    voter: Principal,
    ledger: &State<Arc<ElectionLedger>>,
) -> Result<()> {
    ledger.authorize_voter(&caller.0, &voter)
}

#[post("/admin/candidates", data = "<spec>", format = "json")]
fn add_candidate(
    caller: Caller,
    spec: Json<CandidateSpec>,
    ledger: &State<Arc<ElectionLedger>>,
) -> Result<Json<Candidate>> {
    let CandidateSpec { name, description } = spec.into_inner();
    let candidate_id = ledger.add_candidate(&caller.0, name, description)?;
    Ok(Json(ledger.candidate(candidate_id)?))
}

#[post("/admin/candidates/<candidate_id>/deactivate")]
fn deactivate_candidate(
    caller: Caller,
    candidate_id: CandidateId,
    ledger: &State<Arc<ElectionLedger>>,
) -> Result<()> {
    ledger.deactivate_candidate(&caller.0, candidate_id)
}

#[post("/admin/transfer", data = "<request>", format = "json")]
fn transfer_admin(
    caller: Caller,
    request: Json<TransferRequest>,
    ledger: &State<Arc<ElectionLedger>>,
) -> Result<()> {
    ledger.transfer_admin(&caller.0, request.into_inner().new_admin)
}

#[post("/admin/end")]
async fn end_election(
    caller: Caller,
    ledger: &State<Arc<ElectionLedger>>,
    closer: &State<ElectionCloser>,
) -> Result<()> {
    ledger.end_election(&caller.0)?;
    closer.cancel().await;
    Ok(())
}

#[delete("/admin/votes/<voter>")]
fn remove_vote(
    caller: Caller,
    voter: Principal,
    ledger: &State<Arc<ElectionLedger>>,
) -> Result<Json<RemovedVote>> {
    let candidate_id = ledger.remove_vote(&caller.0, &voter)?;
    Ok(Json(RemovedVote { candidate_id }))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json, Value},
        uri,
    };

    use super::*;
    use crate::api::common::tests::{as_admin, as_principal};
    use crate::clock::ManualClock;
    use crate::model::{Election, Voter};

    async fn create_candidate(client: &Client, spec: &CandidateSpec) -> Candidate {
        let response = client
            .post(uri!(add_candidate))
            .header(as_admin())
            .header(ContentType::JSON)
            .body(serde_json::to_string(spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        response.into_json().await.unwrap()
    }

    async fn error_kind(response: rocket::local::asynchronous::LocalResponse<'_>) -> String {
        let body: Value = response.into_json().await.unwrap();
        body["error"].as_str().unwrap().to_string()
    }

    #[api_test]
    async fn candidate_lifecycle(client: Client) {
        let first = create_candidate(&client, &CandidateSpec::example1()).await;
        let second = create_candidate(&client, &CandidateSpec::example2()).await;
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.name, CandidateSpec::example2().name);
        assert!(second.is_active);

        let response = client
            .post(uri!(deactivate_candidate(2)))
            .header(as_admin())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        // Repeating it is harmless.
        let response = client
            .post(uri!(deactivate_candidate(2)))
            .header(as_admin())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .post(uri!(deactivate_candidate(9)))
            .header(as_admin())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(error_kind(response).await, "InvalidCandidate");

        let ledger = client.rocket().state::<Arc<ElectionLedger>>().unwrap();
        assert_eq!(ledger.all_candidates(), vec![first]);
        assert!(!ledger.candidate(2).unwrap().is_active);
    }

    #[api_test]
    async fn admin_only(client: Client) {
        let response = client
            .post(uri!(add_candidate))
            .header(as_principal("alice"))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&CandidateSpec::example1()).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
        assert_eq!(error_kind(response).await, "Unauthorized");

        let response = client
            .post(uri!(end_election))
            .header(as_principal("alice"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        // No identity at all.
        let response = client.post(uri!(end_election)).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);

        let ledger = client.rocket().state::<Arc<ElectionLedger>>().unwrap();
        assert_eq!(ledger.candidates_count(), 0);
        assert!(ledger.election_stats(ledger.now()).is_active);
    }

    #[api_test]
    async fn duration_reschedules_closer(client: Client, clock: ManualClock) {
        clock.advance(Duration::minutes(30));
        let response = client
            .post(uri!(set_duration))
            .header(as_admin())
            .header(ContentType::JSON)
            .body(r#"{"hours": 2}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let end: EndTime = response.into_json().await.unwrap();
        assert_eq!(
            end.end_time,
            Election::example_start() + Duration::minutes(150)
        );

        let closer = client.rocket().state::<ElectionCloser>().unwrap();
        assert!(closer.is_scheduled().await);

        let response = client
            .post(uri!(end_election))
            .header(as_admin())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert!(!closer.is_scheduled().await);

        // Too late to change the window now.
        let response = client
            .post(uri!(set_duration))
            .header(as_admin())
            .header(ContentType::JSON)
            .body(r#"{"hours": 5}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(error_kind(response).await, "ElectionClosed");
    }

    #[api_test(authorization)]
    async fn authorize_voters_in_gated_election(client: Client) {
        let ledger = client.rocket().state::<Arc<ElectionLedger>>().unwrap().clone();
        assert!(!ledger.is_authorized(&Principal::new("carol")));

        let response = client
            .post(uri!(authorize_voters))
            .header(as_admin())
            .header(ContentType::JSON)
            .body(r#"["carol", "dave"]"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let response = client
            .post("/admin/voters/erin")
            .header(as_admin())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        for voter in ["carol", "dave", "erin"] {
            assert!(ledger.is_authorized(&Principal::new(voter)));
            assert!(ledger.voter_info(&Principal::new(voter)).is_registered);
        }

        let response = client
            .post(uri!(authorize_voters))
            .header(as_admin())
            .header(ContentType::JSON)
            .body(r#"["frank", "0x0000"]"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(error_kind(response).await, "InvalidAddress");
        // The whole batch is refused.
        assert!(!ledger.is_authorized(&Principal::new("frank")));
    }

    #[api_test]
    async fn transfer_admin_hands_over(client: Client) {
        let response = client
            .post(uri!(transfer_admin))
            .header(as_admin())
            .header(ContentType::JSON)
            .body(r#"{"new_admin": "deputy"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .post(uri!(add_candidate))
            .header(as_admin())
            .header(ContentType::JSON)
            .body(serde_json::to_string(&CandidateSpec::example1()).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .post(uri!(add_candidate))
            .header(as_principal("deputy"))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&CandidateSpec::example1()).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .post(uri!(transfer_admin))
            .header(as_principal("deputy"))
            .header(ContentType::JSON)
            .body(r#"{"new_admin": ""}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[api_test]
    async fn remove_vote_reverses_it(client: Client) {
        create_candidate(&client, &CandidateSpec::example1()).await;
        let alice = Principal::new("alice");
        let ledger = client.rocket().state::<Arc<ElectionLedger>>().unwrap().clone();
        ledger.vote(&alice, 1, ledger.now()).unwrap();

        let response = client
            .delete(format!("/admin/votes/{alice}"))
            .header(as_admin())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let removed: RemovedVote = response.into_json().await.unwrap();
        assert_eq!(removed.candidate_id, 1);

        let voter: Voter = ledger.voter_info(&alice);
        assert!(!voter.has_voted);
        assert_eq!(voter.voted_for, 0);
        assert_eq!(ledger.candidate(1).unwrap().vote_count, 0);
        assert!(!ledger.has_user_voted(&alice));

        let response = client
            .delete(format!("/admin/votes/{alice}"))
            .header(as_admin())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(error_kind(response).await, "VoterHasNotVoted");
    }
}
