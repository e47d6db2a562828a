use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Rate};
use crate::errors::{LoanError, Result};
use crate::interest::{AccrualEngine, DayCountConvention};
use crate::lifecycle::Parties;
use crate::types::{BridgeEndpoint, ExternalAccount, LoanVariant};

/// loan configuration, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanConfig {
    pub asset: SettlementAsset,
    pub terms: LoanTerms,
    pub parties: Parties,
    pub interest: InterestConfig,
    /// present for loans settled through a bridge
    pub bridge: Option<BridgeConfig>,
}

/// value medium principal and interest are paid in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementAsset {
    Native,
    Token(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub requested_principal: Amount,
    /// seconds from start until the loan can default
    pub duration_secs: u64,
    pub annual_rate: Rate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestConfig {
    pub day_count_convention: DayCountConvention,
}

/// bridge settlement configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub borrower_external: ExternalAccount,
    pub lender_external: ExternalAccount,
    pub endpoint: BridgeEndpoint,
    /// extra value the lender sends on top of principal to cover bridge costs
    pub funding_buffer: Amount,
}

impl LoanConfig {
    /// loan settled directly on one ledger
    pub fn simple(
        parties: Parties,
        principal: Amount,
        annual_rate: Rate,
        duration_secs: u64,
    ) -> Self {
        Self {
            asset: SettlementAsset::Native,
            terms: LoanTerms {
                requested_principal: principal,
                duration_secs,
                annual_rate,
            },
            parties,
            interest: InterestConfig::default(),
            bridge: None,
        }
    }

    /// loan settled through a cross-ledger bridge
    pub fn bridge(
        parties: Parties,
        principal: Amount,
        annual_rate: Rate,
        duration_secs: u64,
        bridge: BridgeConfig,
    ) -> Self {
        Self {
            bridge: Some(bridge),
            ..Self::simple(parties, principal, annual_rate, duration_secs)
        }
    }

    pub fn variant(&self) -> LoanVariant {
        if self.bridge.is_some() {
            LoanVariant::Bridge
        } else {
            LoanVariant::Simple
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.terms.duration_secs.min(i64::MAX as u64) as i64)
    }

    pub fn accrual_engine(&self) -> AccrualEngine {
        AccrualEngine::new(self.interest.day_count_convention, self.terms.annual_rate)
    }

    /// value the escrow must observe before a bridge loan counts as funded
    pub fn funding_target(&self) -> Amount {
        let buffer = self
            .bridge
            .as_ref()
            .map(|b| b.funding_buffer)
            .unwrap_or_default();
        self.terms.requested_principal + buffer
    }

    pub fn validate(&self) -> Result<()> {
        if self.terms.requested_principal.is_zero() {
            return Err(invalid("requested principal must be greater than zero"));
        }
        if self.terms.duration_secs == 0 {
            return Err(invalid("duration must be greater than zero"));
        }
        if self.parties.borrower == self.parties.lender {
            return Err(invalid("borrower and lender must differ"));
        }
        if let SettlementAsset::Token(token) = &self.asset {
            if token.trim().is_empty() {
                return Err(invalid("settlement token must be named"));
            }
        }
        if let Some(bridge) = &self.bridge {
            if bridge.borrower_external.is_empty() || bridge.lender_external.is_empty() {
                return Err(invalid("bridge external accounts must be set"));
            }
            if bridge.endpoint.as_str().trim().is_empty() {
                return Err(invalid("bridge endpoint must be set"));
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: LoanConfig =
            serde_json::from_str(json).map_err(|e| invalid(&format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| invalid(&format!("cannot serialize config: {}", e)))
    }
}

fn invalid(message: &str) -> LoanError {
    LoanError::InvalidConfiguration {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;

    fn parties() -> Parties {
        Parties {
            borrower: AccountId::new("borrower"),
            lender: AccountId::new("lender"),
            liquidator: AccountId::new("admin"),
        }
    }

    fn bridge_config() -> BridgeConfig {
        BridgeConfig {
            borrower_external: ExternalAccount::new("rBorrower"),
            lender_external: ExternalAccount::new("rLender"),
            endpoint: BridgeEndpoint::new("0xdoor"),
            funding_buffer: Amount::from_units(1),
        }
    }

    #[test]
    fn test_simple_preset() {
        let config = LoanConfig::simple(
            parties(),
            Amount::from_units(100_000),
            Rate::from_bps(1000),
            20 * 7 * 86_400,
        );
        config.validate().unwrap();
        assert_eq!(config.variant(), LoanVariant::Simple);
        assert_eq!(config.duration(), Duration::weeks(20));
        assert_eq!(config.funding_target(), Amount::from_units(100_000));
        assert_eq!(
            config.interest.day_count_convention,
            DayCountConvention::Weeks52
        );
    }

    #[test]
    fn test_bridge_funding_target_includes_buffer() {
        let config = LoanConfig::bridge(
            parties(),
            Amount::from_units(1000),
            Rate::from_bps(1000),
            86_400,
            bridge_config(),
        );
        assert_eq!(config.variant(), LoanVariant::Bridge);
        assert_eq!(config.funding_target(), Amount::from_units(1001));
    }

    #[test]
    fn test_validation() {
        let mut config = LoanConfig::simple(parties(), Amount::ZERO, Rate::from_bps(1), 1);
        assert!(matches!(
            config.validate(),
            Err(LoanError::InvalidConfiguration { .. })
        ));

        config.terms.requested_principal = Amount::from_units(1);
        config.terms.duration_secs = 0;
        assert!(config.validate().is_err());

        config.terms.duration_secs = 1;
        config.parties.lender = config.parties.borrower.clone();
        assert!(config.validate().is_err());

        let mut bridge = bridge_config();
        bridge.lender_external = ExternalAccount::new(" ");
        let config = LoanConfig::bridge(parties(), Amount::from_units(1), Rate::ZERO, 1, bridge);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = LoanConfig::bridge(
            parties(),
            Amount::from_units(1000),
            Rate::from_bps(500),
            86_400,
            bridge_config(),
        );
        let json = config.to_json().unwrap();
        assert!(json.contains("\"requested_principal\": \"1000000000000000000000\""));

        let loaded = LoanConfig::from_json(&json).unwrap();
        assert_eq!(loaded, config);

        assert!(LoanConfig::from_json("{\"asset\": 1}").is_err());
    }
}
