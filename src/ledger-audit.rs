//! A simple CLI tool for auditing election ledgers.
//! This uses the server's own audit implementation, and is by definition
//! compatible with the output of `GET /ledger/dump`.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufReader;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;

use election_ledger::audit::{audit, AuditError, AuditReport, CandidateTally};
use election_ledger::model::LedgerSnapshot;

const PROGRAM_NAME: &str = "ledger-audit";

const ABOUT_TEXT: &str = "Audit the integrity of an election ledger.

EXIT CODES:
     0: Audit passed.
   255: Ran successfully, but the audit failed.
 Other: Error.";

const SNAPSHOT_PATH: &str = "SNAPSHOT_PATH";

const SNAPSHOT_PATH_HELP: &str = "The path to a JSON dump of the ledger,\n\
as returned by `GET /ledger/dump`";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME).about(ABOUT_TEXT).arg(
        Arg::new(SNAPSHOT_PATH)
            .help(SNAPSHOT_PATH_HELP)
            .action(ArgAction::Set)
            .required(true),
    )
}

/// Errors that this program may produce.
#[derive(Debug, Eq, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON dump.
    Format(String),
    /// The audit failed for the contained reason.
    Audit(AuditError),
}

/// One line of the printed tally.
struct TallyLine<'a>(&'a CandidateTally);

impl Display for TallyLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let tally = self.0;
        write!(
            f,
            "{} ({}): {} vote{}",
            tally.name,
            tally.candidate_id,
            tally.votes,
            if tally.votes != 1 { "s" } else { "" }
        )?;
        if !tally.is_active {
            write!(f, " [inactive]")?;
        }
        Ok(())
    }
}

/// Load and audit a snapshot.
fn verify(path: &str) -> Result<AuditReport, Error> {
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let snapshot: LedgerSnapshot =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;
    audit(&snapshot).map_err(Error::Audit)
}

/// Run the audit, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let path: &String = args.get_one(SNAPSHOT_PATH).unwrap(); // Required argument is guaranteed to be present.
    match verify(path) {
        Ok(report) => {
            println!(
                "Audit passed: {} journal entries, {} vote{} counted.",
                report.journal_entries,
                report.total_votes,
                if report.total_votes != 1 { "s" } else { "" }
            );
            let mut tallies = report.tallies.iter().collect::<Vec<_>>();
            // Highest tally first, ties in ID order.
            tallies.sort_by(|a, b| {
                b.votes
                    .cmp(&a.votes)
                    .then(a.candidate_id.cmp(&b.candidate_id))
            });
            for tally in tallies {
                println!("{}", TallyLine(tally));
            }
            match report.winners {
                Some(winners) if winners.winner_count > 0 => {
                    let ids = winners
                        .candidate_ids
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("Winner(s): {ids} with {} votes", winners.winning_votes);
                }
                Some(_) => println!("No winner: no active candidates."),
                None => println!("Election still running; no winner yet."),
            }
            0
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {}", msg);
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid JSON: {}", msg);
            1
        }
        Err(Error::Audit(err)) => {
            println!("Audit failed: {}", err);
            255
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use tempfile::NamedTempFile;

    use election_ledger::clock::{Clock, ManualClock};
    use election_ledger::ledger::ElectionLedger;
    use election_ledger::model::{ElectionSpec, Principal};
    use election_ledger::sink::LogSink;

    use super::*;

    fn snapshot(ended: bool) -> LedgerSnapshot {
        let admin = Principal::new("coordinator");
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        let spec = ElectionSpec {
            title: "Quidditch Captaincy".to_string(),
            description: String::new(),
            require_authorization: false,
        };
        let ledger =
            ElectionLedger::new(admin.clone(), spec, Arc::new(clock.clone()), Arc::new(LogSink));
        for name in ["Chris Riches", "Parry Hotter"] {
            ledger.add_candidate(&admin, name.into(), String::new()).unwrap();
        }
        for (voter, candidate_id) in [("alice", 1), ("bob", 1), ("carol", 2)] {
            ledger
                .vote(&Principal::new(voter), candidate_id, clock.now())
                .unwrap();
        }
        if ended {
            ledger.end_election(&admin).unwrap();
        }
        ledger.snapshot()
    }

    fn write_dump(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn dump(snapshot: &LedgerSnapshot) -> NamedTempFile {
        write_dump(&serde_json::to_string(snapshot).unwrap())
    }

    fn path(file: &NamedTempFile) -> &str {
        file.path().to_str().unwrap()
    }

    #[test]
    fn verification() {
        // This test actually enters ledger code, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(["election_ledger"], None, None);

        let file = dump(&snapshot(true));
        let report = verify(path(&file)).unwrap();
        assert_eq!(report.total_votes, 3);
        assert_eq!(report.winners.unwrap().candidate_ids, vec![1]);

        let file = dump(&snapshot(false));
        assert_eq!(verify(path(&file)).unwrap().winners, None);

        let mut tampered = snapshot(true);
        tampered.candidates[1].vote_count = 5;
        let file = dump(&tampered);
        assert!(matches!(
            verify(path(&file)),
            Err(Error::Audit(AuditError::ReplayMismatch { candidate_id: 2, .. }))
        ));
    }

    #[test]
    fn correct_cli_usage() {
        let good = dump(&snapshot(true));
        let command_line = [PROGRAM_NAME, path(&good)];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 0);

        let mut tampered = snapshot(true);
        tampered.election.total_votes += 1;
        let bad = dump(&tampered);
        let command_line = [PROGRAM_NAME, path(&bad)];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 255);

        let malformed = write_dump("{\"election\": ");
        let command_line = [PROGRAM_NAME, path(&malformed)];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);

        let command_line = [PROGRAM_NAME, "not a real file"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);
    }

    #[test]
    fn bad_cli_usage() {
        // Something very wrong.
        let command_line = [PROGRAM_NAME, "this", "invocation", "is", "incorrect"];
        cli().try_get_matches_from(command_line).unwrap_err();

        // No options at all.
        let command_line = [PROGRAM_NAME];
        cli().try_get_matches_from(command_line).unwrap_err();
    }
}
