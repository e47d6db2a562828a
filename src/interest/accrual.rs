use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Rate, BPS_DENOMINATOR};
use crate::errors::{LoanError, Result};
use crate::interest::InterestCalculation;

pub const SECONDS_PER_DAY: u64 = 86_400;
pub const SECONDS_PER_WEEK: u64 = 7 * SECONDS_PER_DAY;

/// length of the interest year
///
/// `Weeks52` is the default. Ten days on 100,000 units at 1000 bps give
/// exactly 274725274725274725274 smallest units on that basis; the other
/// conventions give different figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DayCountConvention {
    /// 52 weeks = 364 days
    #[default]
    Weeks52,
    /// 365 days
    Actual365,
    /// 360 days
    Actual360,
}

impl DayCountConvention {
    pub fn seconds_per_year(self) -> u64 {
        match self {
            DayCountConvention::Weeks52 => 52 * SECONDS_PER_WEEK,
            DayCountConvention::Actual365 => 365 * SECONDS_PER_DAY,
            DayCountConvention::Actual360 => 360 * SECONDS_PER_DAY,
        }
    }
}

/// interest settled up to a point in time
///
/// Taken every time outstanding principal changes. Interest after the
/// checkpoint accrues on `principal` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualCheckpoint {
    pub timestamp: DateTime<Utc>,
    pub principal: Amount,
    /// interest accrued before `timestamp`
    pub accumulated: Amount,
}

impl AccrualCheckpoint {
    /// empty checkpoint for a loan that has not started
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            principal: Amount::ZERO,
            accumulated: Amount::ZERO,
        }
    }
}

/// engine for simple, non-compounding interest across checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualEngine {
    pub convention: DayCountConvention,
    pub annual_rate: Rate,
}

impl AccrualEngine {
    pub fn new(convention: DayCountConvention, annual_rate: Rate) -> Self {
        Self {
            convention,
            annual_rate,
        }
    }

    /// whole seconds from `start` to `end`, zero if `end` is earlier
    pub fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
        (end - start).num_seconds().max(0) as u64
    }

    /// interest on `principal` over `elapsed` seconds, rounded down
    pub fn simple_interest(&self, principal: Amount, elapsed: u64) -> Result<Amount> {
        if principal.is_zero() || elapsed == 0 || self.annual_rate.bps() == 0 {
            return Ok(Amount::ZERO);
        }

        let numerator = U256::from(principal.as_raw())
            * U256::from(self.annual_rate.bps())
            * U256::from(elapsed);
        let denominator =
            U256::from(BPS_DENOMINATOR) * U256::from(self.convention.seconds_per_year());
        let interest = numerator / denominator;

        if interest.bits() > 128 {
            return Err(LoanError::CalculationOverflow {
                message: format!("interest on {} over {}s exceeds u128", principal, elapsed),
            });
        }

        Ok(Amount::from_raw(interest.low_u128()))
    }

    /// total interest accrued up to `now`
    pub fn accrued_interest(
        &self,
        checkpoint: &AccrualCheckpoint,
        now: DateTime<Utc>,
    ) -> Result<Amount> {
        let elapsed = Self::elapsed_seconds(checkpoint.timestamp, now);
        let since = self.simple_interest(checkpoint.principal, elapsed)?;

        checkpoint
            .accumulated
            .checked_add(since)
            .ok_or_else(|| LoanError::CalculationOverflow {
                message: "accumulated interest exceeds u128".to_string(),
            })
    }

    /// accrued interest not yet withdrawn by the lender
    pub fn claimable_interest(
        &self,
        checkpoint: &AccrualCheckpoint,
        claimed: Amount,
        now: DateTime<Utc>,
    ) -> Result<Amount> {
        Ok(self.accrued_interest(checkpoint, now)?.saturating_sub(claimed))
    }

    /// settle interest at the old principal and restart from `new_principal`
    pub fn checkpoint(
        &self,
        previous: &AccrualCheckpoint,
        now: DateTime<Utc>,
        new_principal: Amount,
    ) -> Result<AccrualCheckpoint> {
        let accumulated = self.accrued_interest(previous, now)?;

        Ok(AccrualCheckpoint {
            timestamp: now.max(previous.timestamp),
            principal: new_principal,
            accumulated,
        })
    }

    /// detailed calculation for reporting
    pub fn calculate_interest(
        &self,
        principal: Amount,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<InterestCalculation> {
        let elapsed_seconds = Self::elapsed_seconds(start, end);
        let interest_amount = self.simple_interest(principal, elapsed_seconds)?;

        Ok(InterestCalculation {
            interest_amount,
            principal_base: principal,
            elapsed_seconds,
            annual_rate: self.annual_rate,
            convention: self.convention,
        })
    }
}
