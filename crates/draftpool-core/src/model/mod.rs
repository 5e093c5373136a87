pub mod entry;
pub mod payment;
pub mod roster;

pub use entry::{
    Assignment, Candidate, CandidateDetails, Contact, EmergencyContact, EntryState, EntryStatus,
    LifecycleAction, MedicalInfo, NewCandidate, PaymentIntake, PoolEntry, Targeting,
    TransitionOutcome, UniformInfo,
};
pub use payment::{Payment, PaymentStatus, PaymentUpdate};
pub use roster::{RosterEntry, TeamSummary};
