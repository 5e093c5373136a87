// Shared fixtures for unit tests.

use chrono::NaiveDate;

use crate::model::{
    Candidate, CandidateDetails, Contact, EmergencyContact, MedicalInfo, NewCandidate,
    PaymentIntake, PaymentStatus, Targeting, TeamSummary, UniformInfo,
};

pub(crate) const OWNER: &str = "owner-1";

pub(crate) fn team(id: &str, sport: &str, age_group: &str) -> TeamSummary {
    TeamSummary {
        id: id.to_string(),
        owner_id: OWNER.to_string(),
        name: format!("Team {id}"),
        sport: sport.to_string(),
        age_group: age_group.to_string(),
        capacity: Some(20),
        current_size: 0,
    }
}

pub(crate) fn intake(name: &str, team_id: &str, status: PaymentStatus) -> NewCandidate {
    let paid = match status {
        PaymentStatus::PaidFull => 15000,
        PaymentStatus::PaidPartial => 5000,
        _ => 0,
    };
    NewCandidate {
        candidate: Candidate {
            profile_id: None,
            full_name: name.to_string(),
            handle: None,
            date_of_birth: NaiveDate::from_ymd_opt(2016, 5, 14).unwrap(),
            gender: "male".into(),
        },
        targeting: Targeting {
            owner_id: OWNER.to_string(),
            sport: "football".into(),
            age_group_id: "9U".into(),
            age_group_name: "9 & Under".into(),
            team_id: team_id.to_string(),
        },
        contact: Contact {
            party_id: Some(format!("party-{name}")),
            name: format!("Parent of {name}"),
            email: "parent@example.com".into(),
            phone: "555-0100".into(),
            independent_athlete: false,
        },
        payment: PaymentIntake {
            total_amount: 15000,
            amount_paid: paid,
            status,
            method: None,
            notes: None,
        },
        details: CandidateDetails {
            preferred_positions: vec!["QB".into(), "WR".into()],
            notes: None,
            medical: Some(MedicalInfo {
                allergies: Some("none".into()),
                ..Default::default()
            }),
            emergency_contact: Some(EmergencyContact {
                name: "Grandma".into(),
                phone: "555-0199".into(),
                relationship: Some("grandparent".into()),
            }),
            uniform: Some(UniformInfo {
                jersey_size: Some("YL".into()),
                ..Default::default()
            }),
            waiver_signed: true,
        },
    }
}
