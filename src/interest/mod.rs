pub mod accrual;

use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Rate};

pub use accrual::{
    AccrualCheckpoint, AccrualEngine, DayCountConvention, SECONDS_PER_DAY, SECONDS_PER_WEEK,
};

/// interest calculation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestCalculation {
    pub interest_amount: Amount,
    pub principal_base: Amount,
    pub elapsed_seconds: u64,
    pub annual_rate: Rate,
    pub convention: DayCountConvention,
}
