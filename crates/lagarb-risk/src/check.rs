//! Risk check and verdict types.

use crate::error::{RiskError, RiskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hard,
    Soft,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
        }
    }
}

/// Fixed set of checks, declared in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    StaleFeed,
    KillSwitch,
    ManipulationFlag,
    Drawdown,
    RegimeTooCalm,
}

impl CheckName {
    pub const ALL: [CheckName; 5] = [
        CheckName::StaleFeed,
        CheckName::KillSwitch,
        CheckName::ManipulationFlag,
        CheckName::Drawdown,
        CheckName::RegimeTooCalm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StaleFeed => "stale_feed",
            Self::KillSwitch => "kill_switch",
            Self::ManipulationFlag => "manipulation_flag",
            Self::Drawdown => "drawdown",
            Self::RegimeTooCalm => "regime_too_calm",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::RegimeTooCalm => Severity::Soft,
            _ => Severity::Hard,
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckName {
    type Err = RiskError;

    fn from_str(s: &str) -> RiskResult<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| RiskError::UnknownCheck(s.to_string()))
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheck {
    pub name: CheckName,
    pub passed: bool,
    pub severity: Severity,
    pub message: String,
    pub observed_value: Option<f64>,
    pub threshold: Option<f64>,
    /// Override reason when a failing check was forced to pass.
    pub overridden: Option<String>,
}

impl RiskCheck {
    pub fn pass(name: CheckName, message: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            severity: name.severity(),
            message: message.into(),
            observed_value: None,
            threshold: None,
            overridden: None,
        }
    }

    pub fn fail(name: CheckName, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            ..Self::pass(name, message)
        }
    }

    pub fn with_values(mut self, observed: Option<f64>, threshold: Option<f64>) -> Self {
        self.observed_value = observed;
        self.threshold = threshold;
        self
    }

    pub fn is_hard_block(&self) -> bool {
        !self.passed && self.severity == Severity::Hard
    }

    pub fn is_soft_warning(&self) -> bool {
        !self.passed && self.severity == Severity::Soft
    }
}

/// Verdict of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGateResult {
    pub trading_allowed: bool,
    pub checks: Vec<RiskCheck>,
    pub hard_block_count: usize,
    pub soft_warning_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl RiskGateResult {
    /// Derive counts and the verdict from ordered checks.
    pub fn from_checks(checks: Vec<RiskCheck>, timestamp: DateTime<Utc>) -> Self {
        let hard_block_count = checks.iter().filter(|c| c.is_hard_block()).count();
        let soft_warning_count = checks.iter().filter(|c| c.is_soft_warning()).count();
        Self {
            trading_allowed: hard_block_count == 0,
            checks,
            hard_block_count,
            soft_warning_count,
            timestamp,
        }
    }

    /// `trading_allowed` must be false exactly when a hard check failed.
    pub fn validate(&self) -> RiskResult<()> {
        let hard = self.checks.iter().filter(|c| c.is_hard_block()).count();
        if hard != self.hard_block_count {
            return Err(RiskError::InvariantViolation(format!(
                "hard_block_count {} but {} hard checks failed",
                self.hard_block_count, hard
            )));
        }
        if self.trading_allowed != (self.hard_block_count == 0) {
            return Err(RiskError::InvariantViolation(format!(
                "trading_allowed={} with hard_block_count={}",
                self.trading_allowed, self.hard_block_count
            )));
        }
        Ok(())
    }

    /// Names of failing checks, in evaluation order.
    pub fn failed_checks(&self) -> Vec<&'static str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn check(&self, name: CheckName) -> Option<&RiskCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(CheckName::RegimeTooCalm.severity(), Severity::Soft);
        for name in [
            CheckName::StaleFeed,
            CheckName::KillSwitch,
            CheckName::ManipulationFlag,
            CheckName::Drawdown,
        ] {
            assert_eq!(name.severity(), Severity::Hard);
        }
    }

    #[test]
    fn test_parse_check_name() {
        assert_eq!("drawdown".parse::<CheckName>().unwrap(), CheckName::Drawdown);
        assert!("nope".parse::<CheckName>().is_err());
    }

    #[test]
    fn test_hard_failure_blocks_regardless_of_soft() {
        let result = RiskGateResult::from_checks(
            vec![
                RiskCheck::fail(CheckName::StaleFeed, "stale"),
                RiskCheck::pass(CheckName::RegimeTooCalm, "ok"),
            ],
            Utc::now(),
        );
        assert!(!result.trading_allowed);
        assert_eq!(result.hard_block_count, 1);
        assert_eq!(result.failed_checks(), vec!["stale_feed"]);
        assert!(result.validate().is_ok());
    }

    #[test]
    fn test_soft_failure_allows() {
        let result = RiskGateResult::from_checks(
            vec![RiskCheck::fail(CheckName::RegimeTooCalm, "calm")],
            Utc::now(),
        );
        assert!(result.trading_allowed);
        assert_eq!(result.soft_warning_count, 1);
    }

    #[test]
    fn test_validate_detects_inconsistency() {
        let mut result = RiskGateResult::from_checks(
            vec![RiskCheck::fail(CheckName::KillSwitch, "on")],
            Utc::now(),
        );
        result.trading_allowed = true;
        assert!(matches!(
            result.validate(),
            Err(RiskError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_serialized_names() {
        let check = RiskCheck::fail(CheckName::StaleFeed, "x");
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["name"], "stale_feed");
        assert_eq!(json["severity"], "hard");
    }
}
