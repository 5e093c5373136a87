// Payment bookkeeping for pool entries. Amounts are integer cents.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AllocationError, Result};

/// Payment bucket for a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    PaidPartial,
    PaidFull,
    PayInPerson,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::PaidPartial => "paid_partial",
            PaymentStatus::PaidFull => "paid_full",
            PaymentStatus::PayInPerson => "pay_in_person",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid_partial" => Some(PaymentStatus::PaidPartial),
            "paid_full" => Some(PaymentStatus::PaidFull),
            "pay_in_person" => Some(PaymentStatus::PayInPerson),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored payment state. `remaining_balance` is always
/// `total_amount - amount_paid`; the only way to change the amounts is through
/// [`Payment::new`] or [`Payment::apply`], both of which recompute it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub total_amount: i64,
    pub amount_paid: i64,
    pub remaining_balance: i64,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub notes: Option<String>,
}

/// A partial payment correction. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdate {
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    #[serde(default)]
    pub amount_paid: Option<i64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PaymentUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(paid) = self.amount_paid {
            if paid < 0 {
                return Err(AllocationError::validation(
                    "amountPaid",
                    format!("must be >= 0, got {paid}"),
                ));
            }
        }
        Ok(())
    }
}

impl Payment {
    pub fn new(
        total_amount: i64,
        amount_paid: i64,
        status: PaymentStatus,
        method: Option<String>,
        notes: Option<String>,
    ) -> Self {
        Payment {
            total_amount,
            amount_paid,
            remaining_balance: total_amount - amount_paid,
            status,
            method,
            notes,
        }
    }

    /// Apply a correction in place.
    ///
    /// When a paid amount is supplied without an explicit status, the bucket
    /// is derived: nothing left to pay means `paid_full`, any money received
    /// means `paid_partial`, otherwise the previous bucket is kept. This holds
    /// even when the amount equals the stored one.
    pub fn apply(&mut self, update: &PaymentUpdate) {
        if let Some(paid) = update.amount_paid {
            self.amount_paid = paid;
            self.remaining_balance = self.total_amount - paid;
        }

        match update.status {
            Some(explicit) => self.status = explicit,
            None if update.amount_paid.is_some() => {
                if self.remaining_balance <= 0 {
                    self.status = PaymentStatus::PaidFull;
                } else if self.amount_paid > 0 {
                    self.status = PaymentStatus::PaidPartial;
                }
            }
            None => {}
        }

        if let Some(method) = &update.method {
            self.method = Some(method.clone());
        }
        if let Some(notes) = &update.notes {
            self.notes = Some(notes.clone());
        }
    }

    pub fn balance_is_consistent(&self) -> bool {
        self.remaining_balance == self.total_amount - self.amount_paid
    }
}
