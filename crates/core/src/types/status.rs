//! Status and classification enums.
//!
//! Each enum maps to a `PostgreSQL` enum type of the same snake_case name
//! when the `postgres` feature is enabled.

use serde::{Deserialize, Serialize};

/// Error returned when parsing an enum from an unknown string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` from one variant table.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The wire and database representation.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Staff with access to settings, approvals and SAP syncs.
    Admin,
    /// Wholesale customer.
    #[default]
    Client,
}

string_enum!(UserRole, "user role", {
    Admin => "admin",
    Client => "client",
});

impl UserRole {
    /// Whether this role grants administrative access.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Lifecycle of a wholesale order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed by the client, awaiting payment or confirmation.
    #[default]
    Pending,
    /// Accepted by the bakery.
    Confirmed,
    /// Being baked.
    InProduction,
    /// Left the bakery.
    Dispatched,
    /// Received by the client.
    Delivered,
    /// Cancelled by the client or staff.
    Cancelled,
}

string_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Confirmed => "confirmed",
    InProduction => "in_production",
    Dispatched => "dispatched",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Whether an order in this status may move to `next`.
    ///
    /// ```text
    /// pending       -> confirmed | cancelled
    /// confirmed     -> in_production | cancelled
    /// in_production -> dispatched
    /// dispatched    -> delivered
    /// ```
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Cancelled)
                | (Self::Confirmed, Self::InProduction | Self::Cancelled)
                | (Self::InProduction, Self::Dispatched)
                | (Self::Dispatched, Self::Delivered)
        )
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Card,
    /// Charged against the client's SAP credit line.
    Credit,
}

string_enum!(PaymentMethod, "payment method", {
    Cash => "cash",
    Transfer => "transfer",
    Card => "card",
    Credit => "credit",
});

/// Review state of a recorded payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

string_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

/// Kind of document attached to a client profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "document_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Registro Único Tributario.
    Rut,
    ChamberOfCommerce,
    IdCard,
    BankCertificate,
    Other,
}

string_enum!(DocumentKind, "document kind", {
    Rut => "rut",
    ChamberOfCommerce => "chamber_of_commerce",
    IdCard => "id_card",
    BankCertificate => "bank_certificate",
    Other => "other",
});

/// What a SAP sync run imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "sync_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Products,
    Clients,
}

string_enum!(SyncKind, "sync kind", {
    Products => "products",
    Clients => "clients",
});

/// Outcome of a SAP sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "sync_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Succeeded,
    Failed,
}

string_enum!(SyncStatus, "sync status", {
    Running => "running",
    Succeeded => "succeeded",
    Failed => "failed",
});
