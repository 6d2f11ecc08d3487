use std::sync::Arc;

use rocket::{post, routes, Route, State};

use crate::api::Caller;
use crate::error::Result;
use crate::ledger::ElectionLedger;
use crate::model::CandidateId;

pub fn routes() -> Vec<Route> {
    routes![vote]
}

#[post("/vote/<candidate_id>")]
fn vote(
    caller: Caller,
    candidate_id: CandidateId,
    ledger: &State<Arc<ElectionLedger>>,
) -> Result<()> {
    ledger.vote(&caller.0, candidate_id, ledger.now())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::{
        http::Status,
        local::asynchronous::Client,
        serde::json::Value,
        uri,
    };

    use super::*;
    use crate::api::common::tests::as_principal;
    use crate::clock::{Clock, ManualClock};
    use crate::model::Principal;

    fn seed(client: &Client) -> Arc<ElectionLedger> {
        let ledger = client
            .rocket()
            .state::<Arc<ElectionLedger>>()
            .unwrap()
            .clone();
        let admin = ledger.administrator();
        ledger
            .add_candidate(&admin, "Chris Riches".into(), String::new())
            .unwrap();
        ledger
            .add_candidate(&admin, "Parry Hotter".into(), String::new())
            .unwrap();
        ledger
    }

    /// Vote as `voter`, returning the status and the error kind if refused.
    async fn vote_as(
        client: &Client,
        voter: &str,
        candidate_id: CandidateId,
    ) -> (Status, Option<String>) {
        let response = client
            .post(uri!(vote(candidate_id)))
            .header(as_principal(voter))
            .dispatch()
            .await;
        let status = response.status();
        if status == Status::Ok {
            return (status, None);
        }
        let body: Value = response.into_json().await.unwrap();
        (status, body["error"].as_str().map(str::to_string))
    }

    #[api_test]
    async fn one_vote_each(client: Client) {
        let ledger = seed(&client);

        assert_eq!(vote_as(&client, "alice", 1).await, (Status::Ok, None));
        assert_eq!(vote_as(&client, "bob", 2).await, (Status::Ok, None));
        assert_eq!(
            vote_as(&client, "alice", 2).await,
            (Status::Conflict, Some("AlreadyVoted".to_string()))
        );
        assert_eq!(
            vote_as(&client, "carol", 3).await,
            (Status::NotFound, Some("InvalidCandidate".to_string()))
        );

        assert_eq!(ledger.candidate(1).unwrap().vote_count, 1);
        assert_eq!(ledger.candidate(2).unwrap().vote_count, 1);
        assert!(!ledger.has_user_voted(&Principal::new("carol")));

        let response = client.post(uri!(vote(1))).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[api_test]
    async fn null_principal_cannot_vote(client: Client) {
        let ledger = seed(&client);
        for nobody in ["0x0000", "0"] {
            let response = client
                .post(uri!(vote(1)))
                .header(as_principal(nobody))
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Unauthorized);
            assert!(!ledger.has_user_voted(&Principal::new(nobody)));
        }
        assert_eq!(ledger.candidate(1).unwrap().vote_count, 0);
        assert_eq!(ledger.election_stats(ledger.now()).total_votes, 0);
    }

    #[api_test]
    async fn inactive_candidate_refused(client: Client) {
        let ledger = seed(&client);
        ledger
            .deactivate_candidate(&ledger.administrator(), 2)
            .unwrap();
        assert_eq!(
            vote_as(&client, "alice", 2).await,
            (Status::Conflict, Some("CandidateInactive".to_string()))
        );
        assert!(!ledger.has_user_voted(&Principal::new("alice")));
    }

    #[api_test(authorization)]
    async fn gated_election(client: Client) {
        seed(&client);
        assert_eq!(vote_as(&client, "alice", 1).await, (Status::Ok, None));
        assert_eq!(
            vote_as(&client, "mallory", 1).await,
            (Status::Forbidden, Some("NotAuthorized".to_string()))
        );
    }

    #[api_test]
    async fn expired_window_refuses_votes(client: Client, clock: ManualClock) {
        let ledger = seed(&client);
        let end = ledger.end_time().unwrap();

        // The window includes its final instant.
        clock.set(end);
        assert_eq!(vote_as(&client, "alice", 1).await, (Status::Ok, None));

        clock.advance(Duration::seconds(1));
        assert_eq!(
            vote_as(&client, "bob", 1).await,
            (Status::Conflict, Some("ElectionClosed".to_string()))
        );
        // Expiry alone does not end the election.
        assert!(!ledger.election_stats(clock.now()).ended);
        assert_eq!(ledger.candidate(1).unwrap().vote_count, 1);
    }
}
