//! Demo caseload seeder.
//!
//! A small, deterministic caseload for demos and tests. Full-scale synthetic
//! data generation lives outside this crate; the core only needs the store
//! populated.

use crate::store::{CaseRecord, CaseCounts, EvidenceItem, Severity, Store};
use anyhow::Result;

pub fn seed_demo_caseload(store: &Store) -> Result<CaseCounts> {
    store.clear_caseload()?;
    store.insert_cases(&demo_cases())?;
    store.insert_evidence(&demo_evidence())?;
    store.case_counts()
}

fn case(
    case_number: &str,
    defendant: &str,
    charges: &[&str],
    severity: Severity,
    officer: &str,
    judge: &str,
    arrest: &str,
    hearing: Option<(&str, &str)>,
    witnesses: &[&str],
    plea: Option<&str>,
    notes: &str,
) -> CaseRecord {
    CaseRecord {
        case_number: case_number.to_string(),
        defendant_name: defendant.to_string(),
        charges: charges.iter().map(|s| s.to_string()).collect(),
        severity,
        status: "active".to_string(),
        court: "Fulton County State Court".to_string(),
        judge: judge.to_string(),
        prosecutor: "ADA Whitaker".to_string(),
        next_hearing_date: hearing.map(|(d, _)| d.to_string()),
        hearing_type: hearing.map(|(_, t)| t.to_string()),
        filing_date: arrest.to_string(),
        arrest_date: arrest.to_string(),
        evidence_summary: String::new(),
        notes: notes.to_string(),
        attorney_notes: String::new(),
        plea_offer: plea.map(str::to_string),
        plea_offer_details: None,
        arresting_officer: officer.to_string(),
        precinct: "Zone 3".to_string(),
        witnesses: witnesses.iter().map(|s| s.to_string()).collect(),
        prior_record: String::new(),
        bond_status: "Released on bond".to_string(),
    }
}

fn demo_cases() -> Vec<CaseRecord> {
    vec![
        case(
            "CR-2026-0012",
            "Marcus Webb",
            &["DUI - Less Safe", "Failure to Maintain Lane"],
            Severity::Misdemeanor,
            "Ofc. D. Rodriguez",
            "Hon. P. Okafor",
            "2026-05-02",
            Some(("2026-08-14", "Motion Hearing")),
            &["T. Nguyen"],
            Some("12 months probation, DUI school, $800 fine"),
            "Client disputes the stop; dashcam footage requested, not yet produced.",
        ),
        case(
            "CR-2026-0031",
            "Alicia Turner",
            &["Theft by Shoplifting"],
            Severity::Misdemeanor,
            "Ofc. D. Rodriguez",
            "Hon. P. Okafor",
            "2026-05-19",
            Some(("2026-08-10", "Arraignment")),
            &["Store manager K. Patel", "T. Nguyen"],
            Some("Pre-trial diversion, restitution $240"),
            "Surveillance footage quality is poor; identification is contested.",
        ),
        case(
            "CR-2026-0047",
            "Devon Ellis",
            &["Aggravated Assault"],
            Severity::Felony,
            "Ofc. L. Freeman",
            "Hon. S. Marsh",
            "2026-04-11",
            Some(("2026-08-21", "Preliminary Hearing")),
            &["J. Castillo", "R. Boone"],
            None,
            "Self-defense claim. Defendant says the alleged victim swung first; one witness supports this.",
        ),
        case(
            "CR-2026-0058",
            "Rosa Jimenez",
            &["Possession of a Controlled Substance"],
            Severity::Felony,
            "Ofc. L. Freeman",
            "Hon. S. Marsh",
            "2026-03-08",
            None,
            &[],
            Some("First offender, 2 years probation"),
            "Search arose from a traffic stop; consent is disputed. Possible suppression issue.",
        ),
        case(
            "CR-2026-0064",
            "Trent Kowalski",
            &["Burglary", "Criminal Trespass"],
            Severity::Felony,
            "Sgt. M. Ayers",
            "Hon. P. Okafor",
            "2026-02-20",
            Some(("2026-08-05", "Plea Hearing")),
            &["Neighbor C. Ruiz"],
            Some("5 years, serve 1, balance probated"),
            "Speedy trial demand filed; the clock is running.",
        ),
        case(
            "CR-2026-0075",
            "Shanice Porter",
            &["Obstruction of Officers"],
            Severity::Misdemeanor,
            "Ofc. D. Rodriguez",
            "Hon. S. Marsh",
            "2026-06-01",
            None,
            &["Ofc. bodycam only"],
            None,
            "Third obstruction case from the same officer this quarter; bodycam requested.",
        ),
    ]
}

fn demo_evidence() -> Vec<EvidenceItem> {
    vec![
        EvidenceItem {
            id: 0,
            case_number: "CR-2026-0031".to_string(),
            evidence_type: "surveillance".to_string(),
            title: "Store camera still, aisle 4".to_string(),
            description: "Single frame from overhead camera; subject partially obscured by shelving.".to_string(),
            file_path: String::new(),
            poster_path: String::new(),
            source: "Midtown Market loss prevention".to_string(),
            date_collected: "2026-05-19".to_string(),
        },
        EvidenceItem {
            id: 0,
            case_number: "CR-2026-0047".to_string(),
            evidence_type: "photograph".to_string(),
            title: "Injury photograph".to_string(),
            description: "Photograph of complainant's forearm bruising taken at intake.".to_string(),
            file_path: String::new(),
            poster_path: String::new(),
            source: "Grady Memorial intake".to_string(),
            date_collected: "2026-04-11".to_string(),
        },
        EvidenceItem {
            id: 0,
            case_number: "CR-2026-0012".to_string(),
            evidence_type: "dashcam".to_string(),
            title: "Patrol dashcam clip".to_string(),
            description: "Dashcam video covering the traffic stop; requested, production pending.".to_string(),
            file_path: String::new(),
            poster_path: String::new(),
            source: "APD evidence unit".to_string(),
            date_collected: "2026-05-02".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let first = seed_demo_caseload(&store).unwrap();
        let second = seed_demo_caseload(&store).unwrap();
        assert_eq!(first.total, second.total);
        assert!(first.felonies > 0 && first.misdemeanors > 0);
    }

    #[test]
    fn shared_officer_appears_across_cases() {
        let store = Store::open_in_memory().unwrap();
        seed_demo_caseload(&store).unwrap();
        let hits = store
            .search_cases(&crate::store::CaseFilter {
                officer: Some("Ofc. D. Rodriguez".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(hits.len() >= 2);
    }
}
