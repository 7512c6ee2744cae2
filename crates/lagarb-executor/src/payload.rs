//! Order payload produced by filling a template.
//!
//! Amounts are integer strings in 6-decimal collateral units. A buy of
//! `size` USD at `price` offers `size * 1e6` and asks `size / price * 1e6`
//! shares, both truncated.

use crate::error::TemplateError;
use crate::template::OrderTemplate;
use chrono::{DateTime, Utc};
use lagarb_core::{MarketId, MarketSide, Price, Size};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Collateral token decimals.
pub const AMOUNT_SCALE: u32 = 6;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFields {
    #[serde(rename = "tokenID")]
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub side: String,
    pub fee_rate_bps: String,
    pub nonce: String,
    pub maker: String,
    pub taker: String,
    pub expiration: String,
    pub signature_type: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderMetadata {
    pub market_id: MarketId,
    pub side: MarketSide,
    pub price: Price,
    pub size_usd: Size,
    pub template_age_ms: i64,
    pub filled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub order: OrderFields,
    pub metadata: OrderMetadata,
}

impl OrderPayload {
    /// Build from a resident template. Inputs are assumed validated.
    pub(crate) fn build(
        template: &OrderTemplate,
        price: Price,
        size: Size,
        fee_rate_bps: u32,
        signature_type: u8,
        now: DateTime<Utc>,
    ) -> Result<Self, TemplateError> {
        let maker_amount = scaled_amount(size.inner())?;
        let shares = size
            .shares_at(price)
            .ok_or_else(|| TemplateError::InvalidPrice(price.to_string()))?;
        let taker_amount = scaled_amount(shares)?;

        Ok(Self {
            order: OrderFields {
                token_id: template.token_id.as_str().to_string(),
                maker_amount,
                taker_amount,
                side: "BUY".to_string(),
                fee_rate_bps: fee_rate_bps.to_string(),
                nonce: template.nonce.to_string(),
                maker: template.maker.clone(),
                taker: ZERO_ADDRESS.to_string(),
                expiration: "0".to_string(),
                signature_type,
            },
            metadata: OrderMetadata {
                market_id: template.market_id.clone(),
                side: template.side,
                price,
                size_usd: size,
                template_age_ms: (now - template.created_at).num_milliseconds().max(0),
                filled_at: now,
            },
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn scaled_amount(value: Decimal) -> Result<String, TemplateError> {
    let scaled = value
        .checked_mul(Decimal::from(10u64.pow(AMOUNT_SCALE)))
        .ok_or_else(|| TemplateError::AmountOverflow(value.to_string()))?;
    scaled
        .trunc()
        .to_u128()
        .map(|v| v.to_string())
        .ok_or_else(|| TemplateError::AmountOverflow(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_scaled_amount_truncates() {
        assert_eq!(scaled_amount(dec!(100)).unwrap(), "100000000");
        assert_eq!(scaled_amount(dec!(1.2345678)).unwrap(), "1234567");
        assert_eq!(scaled_amount(dec!(0)).unwrap(), "0");
    }

    #[test]
    fn test_three_dollars_at_thirds() {
        // 3 / 0.33 = 9.0909...
        let shares = Size::new(dec!(3)).shares_at(Price::new(dec!(0.33))).unwrap();
        assert_eq!(scaled_amount(shares).unwrap(), "9090909");
    }
}
