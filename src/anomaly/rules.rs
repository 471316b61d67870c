use crate::config::PatternConfig;
use crate::error::PatternEvaluationError;
use crate::events::{Event, EventKind};

use super::context::AnomalyContext;
use super::types::{category, AnomalyPattern, PatternCheck};

type CheckResult = Result<bool, PatternEvaluationError>;

/// Build the static rule table in registration order.
pub fn default_patterns(config: &PatternConfig) -> Vec<AnomalyPattern> {
    vec![
        AnomalyPattern::new(
            "rapid_burst",
            "Sender submitted an unusual burst of transactions",
            category::FREQUENCY,
            config.rapid_burst.threshold as f64,
            RapidBurst {
                threshold: config.rapid_burst.threshold,
                window_ms: config.rapid_burst.window_ms,
            },
        )
        .with_confidence(0.9),
        AnomalyPattern::new(
            "fee_spike",
            "Transaction fee far above the recent average",
            category::FEES,
            config.fee_spike.multiplier,
            FeeSpike {
                multiplier: config.fee_spike.multiplier,
            },
        )
        .with_confidence(0.85),
        AnomalyPattern::new(
            "high_error_rate",
            "Failed transaction during an elevated failure rate",
            category::ERRORS,
            config.high_error_rate.threshold,
            HighErrorRate {
                threshold: config.high_error_rate.threshold,
                min_transactions: config.high_error_rate.min_transactions,
            },
        )
        .with_confidence(0.8),
        AnomalyPattern::new(
            "large_transfer",
            "Transfer amount exceeds the large transfer threshold",
            category::VALUE,
            config.large_transfer.threshold,
            LargeTransfer {
                threshold: config.large_transfer.threshold,
            },
        )
        .with_confidence(0.7),
        AnomalyPattern::new(
            "volume_surge",
            "Transaction volume in the window exceeds normal levels",
            category::VOLUME,
            config.volume_surge.threshold as f64,
            VolumeSurge {
                threshold: config.volume_surge.threshold,
            },
        )
        .with_confidence(0.6),
        AnomalyPattern::new(
            "account_drain",
            "Account balance dropped sharply in a single change",
            category::SECURITY,
            config.account_drain.drop_ratio,
            AccountDrain {
                drop_ratio: config.account_drain.drop_ratio,
            },
        )
        .with_confidence(0.75),
        AnomalyPattern::new(
            "block_delay",
            "Unusually long gap between a block and its parent",
            category::NETWORK,
            config.block_delay.threshold_ms as f64,
            BlockDelay {
                threshold_ms: config.block_delay.threshold_ms,
            },
        )
        .with_confidence(0.5),
        AnomalyPattern::new(
            "round_amount",
            "Suspiciously round transfer amount",
            category::STRUCTURING,
            config.round_amount.min_amount,
            RoundAmount {
                unit: config.round_amount.unit,
                min_amount: config.round_amount.min_amount,
            },
        )
        .with_confidence(0.4),
    ]
}

/// More than `threshold` transactions from the event's sender within
/// `window_ms` up to and including the event.
pub struct RapidBurst {
    pub threshold: usize,
    pub window_ms: i64,
}

impl PatternCheck for RapidBurst {
    fn check(&self, event: &Event, context: &AnomalyContext) -> CheckResult {
        let Some(sender) = event.sender().filter(|_| event.is_transaction()) else {
            return Ok(false);
        };
        let since = event.timestamp.saturating_sub(self.window_ms);
        let count = context.transactions_from(sender, since, event.timestamp);
        Ok(count > self.threshold)
    }
}

/// Fee above `multiplier` times the average positive fee of the other
/// transactions in the window. The event itself is left out of its baseline.
pub struct FeeSpike {
    pub multiplier: f64,
}

impl FeeSpike {
    fn baseline(event: &Event, context: &AnomalyContext) -> f64 {
        let mut skipped = false;
        let mut total = 0.0f64;
        let mut count = 0usize;
        for other in context.recent_events.iter().rev() {
            if !skipped && other == event {
                skipped = true;
                continue;
            }
            if !other.is_transaction() {
                continue;
            }
            if let Some(fee) = other.fee().filter(|f| *f > 0.0) {
                total += fee;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }
}

impl PatternCheck for FeeSpike {
    fn check(&self, event: &Event, context: &AnomalyContext) -> CheckResult {
        if !event.is_transaction() {
            return Ok(false);
        }
        let Some(fee) = event.fee().filter(|f| *f > 0.0) else {
            return Ok(false);
        };
        let baseline = Self::baseline(event, context);
        Ok(baseline > 0.0 && fee > baseline * self.multiplier)
    }
}

/// A failed transaction while the window error rate is above `threshold`.
pub struct HighErrorRate {
    pub threshold: f64,
    pub min_transactions: usize,
}

impl PatternCheck for HighErrorRate {
    fn check(&self, event: &Event, context: &AnomalyContext) -> CheckResult {
        Ok(event.is_transaction()
            && event.is_failed()
            && context.transaction_volume >= self.min_transactions
            && context.error_rate > self.threshold)
    }
}

pub struct LargeTransfer {
    pub threshold: f64,
}

impl PatternCheck for LargeTransfer {
    fn check(&self, event: &Event, _context: &AnomalyContext) -> CheckResult {
        Ok(event.is_transaction() && event.amount().is_some_and(|a| a >= self.threshold))
    }
}

pub struct VolumeSurge {
    pub threshold: usize,
}

impl PatternCheck for VolumeSurge {
    fn check(&self, event: &Event, context: &AnomalyContext) -> CheckResult {
        Ok(event.is_transaction() && context.transaction_volume > self.threshold)
    }
}

/// Balance drop of at least `drop_ratio` of the previous balance.
pub struct AccountDrain {
    pub drop_ratio: f64,
}

impl PatternCheck for AccountDrain {
    fn check(&self, event: &Event, _context: &AnomalyContext) -> CheckResult {
        if event.kind != EventKind::AccountChange {
            return Ok(false);
        }
        let before = event
            .number("balance_before")
            .or_else(|| event.number("pre_balance"));
        let after = event
            .number("balance_after")
            .or_else(|| event.number("post_balance"));

        let (Some(before), Some(after)) = (before, after) else {
            return Ok(false);
        };
        if before < 0.0 || after < 0.0 {
            return Err(PatternEvaluationError::failed(
                "account_drain",
                format!("negative balance ({} -> {})", before, after),
            ));
        }
        if before == 0.0 {
            return Ok(false);
        }
        Ok((before - after) / before >= self.drop_ratio)
    }
}

/// Gap between a block's timestamp and `parent_timestamp` above the threshold.
pub struct BlockDelay {
    pub threshold_ms: i64,
}

impl PatternCheck for BlockDelay {
    fn check(&self, event: &Event, _context: &AnomalyContext) -> CheckResult {
        if event.kind != EventKind::Block {
            return Ok(false);
        }
        let Some(parent) = event.number("parent_timestamp") else {
            return Ok(false);
        };
        let gap = event.timestamp as f64 - parent;
        Ok(gap > self.threshold_ms as f64)
    }
}

/// Amount at or above `min_amount` that is an exact multiple of `unit`.
pub struct RoundAmount {
    pub unit: f64,
    pub min_amount: f64,
}

impl PatternCheck for RoundAmount {
    fn check(&self, event: &Event, _context: &AnomalyContext) -> CheckResult {
        if self.unit <= 0.0 {
            return Err(PatternEvaluationError::failed(
                "round_amount",
                format!("unit must be positive, got {}", self.unit),
            ));
        }
        if !event.is_transaction() {
            return Ok(false);
        }
        match event.amount() {
            Some(amount) if amount >= self.min_amount => {
                let fraction = (amount / self.unit).fract();
                Ok(fraction < 1e-9 || fraction > 1.0 - 1e-9)
            }
            _ => Ok(false),
        }
    }
}
