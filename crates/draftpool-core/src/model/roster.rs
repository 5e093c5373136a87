// Team membership records and the read-only team view.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{EmergencyContact, MedicalInfo, PoolEntry};

/// A team as seen through the team directory. `current_size` is derived by
/// counting roster entries, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub sport: String,
    pub age_group: String,
    pub capacity: Option<u32>,
    #[serde(default)]
    pub current_size: usize,
}

/// A confirmed team-membership record. Point-in-time copy of the candidate;
/// it is not kept in sync with the pool entry it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    pub team_id: String,
    pub pool_entry_id: String,
    /// Always true for records created by the allocation engine.
    pub from_pool: bool,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub position: Option<String>,
    pub medical: Option<MedicalInfo>,
    pub emergency_contact: Option<EmergencyContact>,
    pub uniform_size: Option<String>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub round: Option<u32>,
    pub pick: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl RosterEntry {
    /// Copy the fields a team needs from a pool entry.
    pub fn snapshot(
        id: String,
        entry: &PoolEntry,
        team_id: &str,
        round: Option<u32>,
        pick: Option<u32>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let details = &entry.details;
        RosterEntry {
            id,
            team_id: team_id.to_string(),
            pool_entry_id: entry.id.clone(),
            from_pool: true,
            full_name: entry.candidate.full_name.clone(),
            date_of_birth: entry.candidate.date_of_birth,
            gender: entry.candidate.gender.clone(),
            position: details.preferred_positions.first().cloned(),
            medical: details.medical.clone(),
            emergency_contact: details.emergency_contact.clone(),
            uniform_size: details.uniform.as_ref().and_then(|u| u.jersey_size.clone()),
            contact_name: entry.contact.name.clone(),
            contact_email: entry.contact.email.clone(),
            contact_phone: entry.contact.phone.clone(),
            round,
            pick,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::{
        Candidate, CandidateDetails, Contact, NewCandidate, PaymentIntake, Targeting, UniformInfo,
    };
    use crate::model::payment::PaymentStatus;

    #[test]
    fn snapshot_copies_team_fields() {
        let intake = NewCandidate {
            candidate: Candidate {
                profile_id: Some("ath-7".into()),
                full_name: "Ava Chen".into(),
                handle: Some("avac".into()),
                date_of_birth: NaiveDate::from_ymd_opt(2015, 9, 30).unwrap(),
                gender: "female".into(),
            },
            targeting: Targeting {
                owner_id: "o1".into(),
                sport: "soccer".into(),
                age_group_id: "10U".into(),
                age_group_name: "10U".into(),
                team_id: "t1".into(),
            },
            contact: Contact {
                party_id: None,
                name: "Lin Chen".into(),
                email: "lin@example.com".into(),
                phone: "555-0111".into(),
                independent_athlete: false,
            },
            payment: PaymentIntake {
                total_amount: 0,
                amount_paid: 0,
                status: PaymentStatus::PaidFull,
                method: None,
                notes: None,
            },
            details: CandidateDetails {
                preferred_positions: vec!["GK".into(), "DEF".into()],
                uniform: Some(UniformInfo {
                    jersey_size: Some("YM".into()),
                    ..Default::default()
                }),
                medical: Some(MedicalInfo {
                    allergies: Some("peanuts".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };
        let entry = PoolEntry::from_intake("pe-1".into(), intake, true, Utc::now());

        let roster = RosterEntry::snapshot("r-1".into(), &entry, "t2", Some(1), Some(4), Utc::now());
        assert_eq!(roster.team_id, "t2");
        assert_eq!(roster.pool_entry_id, "pe-1");
        assert!(roster.from_pool);
        assert_eq!(roster.full_name, "Ava Chen");
        assert_eq!(roster.position.as_deref(), Some("GK"));
        assert_eq!(roster.uniform_size.as_deref(), Some("YM"));
        assert_eq!(
            roster.medical.as_ref().and_then(|m| m.allergies.as_deref()),
            Some("peanuts")
        );
        assert_eq!(roster.contact_email, "lin@example.com");
        assert_eq!((roster.round, roster.pick), (Some(1), Some(4)));
    }
}
