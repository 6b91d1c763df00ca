//! Admin-editable settings.
//!
//! Settings are stored as JSON under string keys. Only the keys listed in
//! [`SettingKey`] are accepted; each has a default used until an admin
//! overrides it.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};

use la_artesa_core::{Email, Money};

/// Known setting keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// Whether clients may place new orders.
    OrdersEnabled,
    /// Minimum order subtotal.
    MinOrderAmount,
    /// Tax rate applied to order subtotals.
    TaxRate,
    /// Days between ordering and the earliest delivery date.
    LeadTimeDays,
    /// Address shown to clients for order questions.
    ContactEmail,
}

impl SettingKey {
    pub const ALL: &'static [Self] = &[
        Self::OrdersEnabled,
        Self::MinOrderAmount,
        Self::TaxRate,
        Self::LeadTimeDays,
        Self::ContactEmail,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrdersEnabled => "orders_enabled",
            Self::MinOrderAmount => "min_order_amount",
            Self::TaxRate => "tax_rate",
            Self::LeadTimeDays => "lead_time_days",
            Self::ContactEmail => "contact_email",
        }
    }

    /// Value used when the key has never been set.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::OrdersEnabled => json!(true),
            Self::MinOrderAmount => json!("0.00"),
            Self::TaxRate => json!("0.19"),
            Self::LeadTimeDays => json!(1),
            Self::ContactEmail => Value::Null,
        }
    }

    /// Check and normalize a value submitted for this key.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message when the value has the wrong shape.
    pub fn normalize(self, value: &Value) -> Result<Value, String> {
        match self {
            Self::OrdersEnabled => value
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| "must be true or false".to_owned()),
            Self::MinOrderAmount => {
                let amount = decimal_from_json(value).ok_or("must be a decimal amount")?;
                let money = Money::new(amount).map_err(|e| e.to_string())?;
                Ok(json!(money.to_string()))
            }
            Self::TaxRate => {
                let rate = decimal_from_json(value).ok_or("must be a decimal rate")?;
                if rate < Decimal::ZERO || rate >= Decimal::ONE {
                    return Err("must be between 0 and 1".to_owned());
                }
                Ok(json!(rate.normalize().to_string()))
            }
            Self::LeadTimeDays => value
                .as_u64()
                .filter(|days| *days <= 60)
                .map(|days| json!(days))
                .ok_or_else(|| "must be a whole number of days between 0 and 60".to_owned()),
            Self::ContactEmail => match value {
                Value::Null => Ok(Value::Null),
                Value::String(s) => Email::parse(s)
                    .map(|email| json!(email.as_str()))
                    .map_err(|e| e.to_string()),
                _ => Err("must be an e-mail address or null".to_owned()),
            },
        }
    }
}

impl FromStr for SettingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown setting: {s}"))
    }
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// Effective, typed settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub orders_enabled: bool,
    pub min_order_amount: Money,
    pub tax_rate: Decimal,
    pub lead_time_days: u32,
    pub contact_email: Option<Email>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_pairs(std::iter::empty())
    }
}

impl Settings {
    /// Build settings from stored `(key, value)` rows, ignoring unknown keys
    /// and falling back to defaults for missing or malformed values.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut stored: std::collections::HashMap<SettingKey, Value> = pairs
            .into_iter()
            .filter_map(|(k, v)| {
                let key = k.parse::<SettingKey>().ok()?;
                let value = key.normalize(&v).ok()?;
                Some((key, value))
            })
            .collect();

        let mut take = |key: SettingKey| stored.remove(&key).unwrap_or_else(|| key.default_value());

        let orders_enabled = take(SettingKey::OrdersEnabled).as_bool().unwrap_or(true);
        let min_order_amount = decimal_from_json(&take(SettingKey::MinOrderAmount))
            .and_then(|d| Money::new(d).ok())
            .unwrap_or(Money::ZERO);
        let tax_rate = decimal_from_json(&take(SettingKey::TaxRate))
            .unwrap_or_else(|| Decimal::new(19, 2));
        let lead_time_days = take(SettingKey::LeadTimeDays)
            .as_u64()
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or(1);
        let contact_email = take(SettingKey::ContactEmail)
            .as_str()
            .and_then(|s| Email::parse(s).ok());

        Self {
            orders_enabled,
            min_order_amount,
            tax_rate,
            lead_time_days,
            contact_email,
        }
    }
}
