//! Product and client imports from SAP.
//!
//! Every run is recorded in `sap_sync_runs`. Rows that cannot be mapped
//! (no price in the configured list, no tax ID) are counted as skipped
//! rather than failing the run.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use la_artesa_core::{Money, SyncKind, SyncRunId, SyncStatus};

use super::SapError;
use super::client::{SapBusinessPartner, SapClient, SapItem, SapPaymentTerms};
use crate::db::client_profiles::{self, SapTerms};
use crate::db::products::{self, NewProduct, Upserted};
use crate::db::sap_sync::{self, SyncCounts};
use crate::db::RepositoryError;
use crate::models::SyncRun;

const DEFAULT_CATEGORY: &str = "General";
const DEFAULT_UNIT: &str = "und";

/// Result of a finished run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: SyncRunId,
    pub kind: SyncKind,
    pub status: SyncStatus,
    pub created: i32,
    pub updated: i32,
    pub skipped: i32,
    pub error: Option<String>,
}

/// Digits of a NIT before its check digit, or `None` if there are none.
#[must_use]
pub fn normalize_tax_id(raw: &str) -> Option<String> {
    let base = raw.split('-').next().unwrap_or_default();
    let digits: String = base.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// Convert a SAP amount to `Money`, treating unusable values as `None`.
fn to_money(value: f64) -> Option<Money> {
    Decimal::try_from(value).ok().and_then(|d| Money::new(d).ok())
}

/// Map an item to a product and its active flag.
///
/// Returns `None` for non-sales items and items without a price in
/// `price_list`.
#[must_use]
pub fn map_item(
    item: &SapItem,
    price_list: i32,
    groups: &HashMap<i32, String>,
) -> Option<(NewProduct, bool)> {
    let code = item.item_code.trim();
    if code.is_empty() || item.sales_item.as_deref() == Some("tNO") {
        return None;
    }

    let price = item
        .item_prices
        .iter()
        .find(|p| p.price_list == price_list)
        .and_then(|p| p.price)
        .and_then(to_money)?;

    let name = item
        .item_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(code);
    let category = item
        .items_group_code
        .and_then(|g| groups.get(&g))
        .map_or(DEFAULT_CATEGORY, String::as_str);
    let unit = item
        .sales_unit
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(DEFAULT_UNIT);

    #[allow(clippy::cast_possible_truncation)]
    let stock = item
        .quantity_on_stock
        .unwrap_or(0.0)
        .floor()
        .clamp(0.0, f64::from(i32::MAX)) as i32;

    let active = item.valid.as_deref() != Some("tNO") && item.frozen.as_deref() != Some("tYES");

    Some((
        NewProduct {
            sap_code: Some(code.to_owned()),
            name: name.to_owned(),
            description: String::new(),
            category: category.to_owned(),
            unit: unit.to_owned(),
            price,
            stock,
        },
        active,
    ))
}

/// Map a customer to the normalized tax ID and terms to apply.
///
/// `terms_days` maps payment terms group numbers to days.
#[must_use]
pub fn map_partner(
    partner: &SapBusinessPartner,
    terms_days: &HashMap<i32, i32>,
) -> Option<(String, SapTerms)> {
    let tax_id = partner.federal_tax_id.as_deref().and_then(normalize_tax_id)?;
    let credit_limit = partner
        .credit_limit
        .map(|c| c.max(0.0))
        .and_then(to_money)
        .unwrap_or(Money::ZERO);
    let payment_terms_days = partner
        .pay_terms_grp_code
        .and_then(|g| terms_days.get(&g).copied())
        .unwrap_or(0);

    Some((
        tax_id,
        SapTerms {
            card_code: partner.card_code.trim().to_owned(),
            credit_limit,
            payment_terms_days,
        },
    ))
}

/// Days of credit granted by a payment terms group.
#[must_use]
pub fn terms_to_days(terms: &SapPaymentTerms) -> i32 {
    terms
        .number_of_additional_months
        .saturating_mul(30)
        .saturating_add(terms.number_of_additional_days)
        .max(0)
}

async fn load_groups(client: &SapClient) -> Result<HashMap<i32, String>, SapError> {
    let mut groups = HashMap::new();
    let mut skip = 0;
    loop {
        let page = client.item_groups(skip).await?;
        if page.is_empty() {
            break;
        }
        skip += page.len();
        groups.extend(page.into_iter().map(|g| (g.number, g.group_name)));
    }
    Ok(groups)
}

async fn load_terms(client: &SapClient) -> Result<HashMap<i32, i32>, SapError> {
    let mut terms = HashMap::new();
    let mut skip = 0;
    loop {
        let page = client.payment_terms(skip).await?;
        if page.is_empty() {
            break;
        }
        skip += page.len();
        terms.extend(page.iter().map(|t| (t.group_number, terms_to_days(t))));
    }
    Ok(terms)
}

async fn sync_products(
    pool: &PgPool,
    client: &SapClient,
    counts: &mut SyncCounts,
) -> Result<(), SapError> {
    let groups = load_groups(client).await?;
    let price_list = client.price_list();

    let mut skip = 0;
    loop {
        let page = client.items(skip).await?;
        if page.is_empty() {
            break;
        }
        skip += page.len();

        for item in &page {
            let Some((product, active)) = map_item(item, price_list, &groups) else {
                counts.skipped += 1;
                continue;
            };
            match products::upsert_from_sap(pool, &product, active).await? {
                Upserted::Created => counts.created += 1,
                Upserted::Updated => counts.updated += 1,
            }
        }
        tracing::debug!(fetched = skip, "Processed SAP items page");
    }
    Ok(())
}

async fn sync_clients(
    pool: &PgPool,
    client: &SapClient,
    counts: &mut SyncCounts,
) -> Result<(), SapError> {
    let terms = load_terms(client).await?;

    let mut skip = 0;
    loop {
        let page = client.customers(skip).await?;
        if page.is_empty() {
            break;
        }
        skip += page.len();

        for partner in &page {
            let Some((tax_id, sap_terms)) = map_partner(partner, &terms) else {
                counts.skipped += 1;
                continue;
            };
            match client_profiles::apply_sap_terms(pool, &tax_id, &sap_terms).await {
                Ok(true) => counts.updated += 1,
                Ok(false) => counts.skipped += 1,
                // Card code already linked to a different profile
                Err(RepositoryError::Conflict(_)) => {
                    tracing::warn!(card_code = %sap_terms.card_code, "SAP card code already assigned");
                    counts.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(fetched = skip, "Processed SAP customers page");
    }
    Ok(())
}

/// Claim the `running` slot for `kind`.
async fn begin(pool: &PgPool, kind: SyncKind) -> Result<SyncRun, SapError> {
    sap_sync::start(pool, kind).await.map_err(|e| match e {
        RepositoryError::Conflict(_) => SapError::SyncInProgress,
        other => SapError::Repository(other),
    })
}

/// Execute a claimed run and record its outcome.
async fn execute(pool: &PgPool, client: &SapClient, run: &SyncRun) -> SyncReport {
    let mut counts = SyncCounts::default();
    let result = match run.kind {
        SyncKind::Products => sync_products(pool, client, &mut counts).await,
        SyncKind::Clients => sync_clients(pool, client, &mut counts).await,
    };

    let (status, error) = match result {
        Ok(()) => (SyncStatus::Succeeded, None),
        Err(e) => {
            tracing::error!(run_id = %run.id, kind = %run.kind, error = %e, "SAP sync failed");
            (SyncStatus::Failed, Some(e.to_string()))
        }
    };

    if let Err(e) = sap_sync::finish(pool, run.id, status, counts, error.as_deref()).await {
        tracing::error!(run_id = %run.id, error = %e, "Failed to record SAP sync outcome");
    }

    tracing::info!(
        run_id = %run.id,
        kind = %run.kind,
        status = %status,
        created = counts.created,
        updated = counts.updated,
        skipped = counts.skipped,
        "SAP sync finished"
    );

    SyncReport {
        run_id: run.id,
        kind: run.kind,
        status,
        created: counts.created,
        updated: counts.updated,
        skipped: counts.skipped,
        error,
    }
}

/// Run a sync to completion.
///
/// # Errors
///
/// Returns `SapError::SyncInProgress` if a run of the same kind is active.
/// Failures during the run are reported in the returned `SyncReport`.
#[instrument(skip(pool, client))]
pub async fn run_sync(
    pool: &PgPool,
    client: &SapClient,
    kind: SyncKind,
) -> Result<SyncReport, SapError> {
    let run = begin(pool, kind).await?;
    Ok(execute(pool, client, &run).await)
}

/// Start a sync in the background and return its `running` row.
///
/// # Errors
///
/// Returns `SapError::SyncInProgress` if a run of the same kind is active.
#[instrument(skip(pool, client))]
pub async fn spawn_sync(
    pool: PgPool,
    client: SapClient,
    kind: SyncKind,
) -> Result<SyncRun, SapError> {
    let run = begin(&pool, kind).await?;
    let claimed = run.clone();
    tokio::spawn(async move {
        execute(&pool, &client, &claimed).await;
    });
    Ok(run)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::services::sap::client::SapItemPrice;

    fn item(code: &str) -> SapItem {
        SapItem {
            item_code: code.to_owned(),
            item_name: Some("Pan tajado integral".to_owned()),
            items_group_code: Some(102),
            sales_unit: Some("und".to_owned()),
            quantity_on_stock: Some(48.7),
            valid: Some("tYES".to_owned()),
            frozen: Some("tNO".to_owned()),
            sales_item: Some("tYES".to_owned()),
            item_prices: vec![
                SapItemPrice {
                    price_list: 1,
                    price: Some(5200.0),
                },
                SapItemPrice {
                    price_list: 2,
                    price: None,
                },
            ],
        }
    }

    fn groups() -> HashMap<i32, String> {
        HashMap::from([(102, "Panadería".to_owned())])
    }

    #[test]
    fn test_normalize_tax_id() {
        assert_eq!(normalize_tax_id("900123456-7").as_deref(), Some("900123456"));
        assert_eq!(normalize_tax_id("900.123.456").as_deref(), Some("900123456"));
        assert_eq!(normalize_tax_id(" 1020304050 ").as_deref(), Some("1020304050"));
        assert_eq!(normalize_tax_id("-7"), None);
        assert_eq!(normalize_tax_id(""), None);
    }

    #[test]
    fn test_map_item_uses_price_list_and_group() {
        let (product, active) = map_item(&item("PAN-001"), 1, &groups()).unwrap();
        assert!(active);
        assert_eq!(product.sap_code.as_deref(), Some("PAN-001"));
        assert_eq!(product.category, "Panadería");
        assert_eq!(product.stock, 48);
        assert_eq!(product.price.amount(), Decimal::from_str("5200.00").unwrap());
    }

    #[test]
    fn test_map_item_skips_missing_price() {
        assert!(map_item(&item("PAN-001"), 2, &groups()).is_none());
        assert!(map_item(&item("PAN-001"), 9, &groups()).is_none());

        let mut huge = item("PAN-003");
        if let Some(p) = huge.item_prices.first_mut() {
            p.price = Some(1.0e11);
        }
        assert!(map_item(&huge, 1, &groups()).is_none());
    }

    #[test]
    fn test_map_item_defaults_and_flags() {
        let mut raw = item("PAN-002");
        raw.item_name = Some("  ".to_owned());
        raw.items_group_code = Some(999);
        raw.sales_unit = None;
        raw.quantity_on_stock = Some(-3.0);
        raw.frozen = Some("tYES".to_owned());

        let (product, active) = map_item(&raw, 1, &groups()).unwrap();
        assert!(!active);
        assert_eq!(product.name, "PAN-002");
        assert_eq!(product.category, DEFAULT_CATEGORY);
        assert_eq!(product.unit, DEFAULT_UNIT);
        assert_eq!(product.stock, 0);

        raw.sales_item = Some("tNO".to_owned());
        assert!(map_item(&raw, 1, &groups()).is_none());
    }

    #[test]
    fn test_map_partner() {
        let partner = SapBusinessPartner {
            card_code: "C0001".to_owned(),
            card_name: Some("Café Aroma".to_owned()),
            federal_tax_id: Some("900123456-7".to_owned()),
            credit_limit: Some(2_500_000.0),
            pay_terms_grp_code: Some(3),
        };
        let terms = HashMap::from([(3, 30)]);

        let (tax_id, sap_terms) = map_partner(&partner, &terms).unwrap();
        assert_eq!(tax_id, "900123456");
        assert_eq!(sap_terms.card_code, "C0001");
        assert_eq!(sap_terms.payment_terms_days, 30);
        assert_eq!(
            sap_terms.credit_limit.amount(),
            Decimal::from_str("2500000.00").unwrap()
        );

        let no_tax = SapBusinessPartner {
            federal_tax_id: None,
            ..partner
        };
        assert!(map_partner(&no_tax, &terms).is_none());
    }

    #[test]
    fn test_map_partner_defaults_unknown_terms() {
        let partner = SapBusinessPartner {
            card_code: "C0002".to_owned(),
            card_name: None,
            federal_tax_id: Some("800555111".to_owned()),
            credit_limit: Some(-10.0),
            pay_terms_grp_code: Some(42),
        };
        let (_, sap_terms) = map_partner(&partner, &HashMap::new()).unwrap();
        assert_eq!(sap_terms.payment_terms_days, 0);
        assert_eq!(sap_terms.credit_limit, Money::ZERO);
    }

    #[test]
    fn test_terms_to_days() {
        let terms = SapPaymentTerms {
            group_number: 1,
            number_of_additional_months: 1,
            number_of_additional_days: 15,
        };
        assert_eq!(terms_to_days(&terms), 45);
    }
}
