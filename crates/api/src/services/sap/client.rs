//! Service Layer HTTP client.
//!
//! `POST /Login` returns a `SessionId` that is sent back as the `B1SESSION`
//! cookie. The id is cached for 25 minutes (the Service Layer default
//! timeout is 30); a `401` drops the cached id and the request is retried
//! once with a fresh login.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::SapError;
use crate::config::SapConfig;

/// How long a login session is reused.
const SESSION_TTL: Duration = Duration::from_secs(25 * 60);

/// Rows requested per page.
pub const PAGE_SIZE: usize = 100;

/// Service Layer API client.
#[derive(Clone)]
pub struct SapClient {
    inner: Arc<SapClientInner>,
}

struct SapClientInner {
    client: reqwest::Client,
    base_url: String,
    company_db: String,
    username: String,
    password: SecretString,
    price_list: i32,
    session: Cache<(), String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoginRequest<'a> {
    #[serde(rename = "CompanyDB")]
    company_db: &'a str,
    user_name: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoginResponse {
    session_id: String,
}

/// OData collection envelope.
#[derive(Debug, Deserialize)]
pub struct ODataPage<T> {
    pub value: Vec<T>,
}

/// One price of an item in a price list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SapItemPrice {
    pub price_list: i32,
    #[serde(default)]
    pub price: Option<f64>,
}

/// Fields of `/Items` used by the product import.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SapItem {
    pub item_code: String,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub items_group_code: Option<i32>,
    #[serde(default)]
    pub sales_unit: Option<String>,
    #[serde(default)]
    pub quantity_on_stock: Option<f64>,
    #[serde(default)]
    pub valid: Option<String>,
    #[serde(default)]
    pub frozen: Option<String>,
    #[serde(default)]
    pub sales_item: Option<String>,
    #[serde(default)]
    pub item_prices: Vec<SapItemPrice>,
}

/// Fields of `/ItemGroups`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SapItemGroup {
    pub number: i32,
    pub group_name: String,
}

/// Fields of `/BusinessPartners` used by the client import.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SapBusinessPartner {
    pub card_code: String,
    #[serde(default)]
    pub card_name: Option<String>,
    #[serde(default, rename = "FederalTaxID")]
    pub federal_tax_id: Option<String>,
    #[serde(default)]
    pub credit_limit: Option<f64>,
    #[serde(default)]
    pub pay_terms_grp_code: Option<i32>,
}

/// Fields of `/PaymentTermsTypes`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SapPaymentTerms {
    pub group_number: i32,
    #[serde(default)]
    pub number_of_additional_months: i32,
    #[serde(default)]
    pub number_of_additional_days: i32,
}

impl SapClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `SapError::Http` if the HTTP client cannot be built.
    pub fn new(config: &SapConfig) -> Result<Self, SapError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        let session = Cache::builder()
            .max_capacity(1)
            .time_to_live(SESSION_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(SapClientInner {
                client,
                base_url: config.service_url.trim_end_matches('/').to_owned(),
                company_db: config.company_db.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
                price_list: config.price_list,
                session,
            }),
        })
    }

    /// Price list used for product prices.
    #[must_use]
    pub fn price_list(&self) -> i32 {
        self.inner.price_list
    }

    /// Log in and return a new session id.
    #[instrument(skip(self), fields(company_db = %self.inner.company_db))]
    async fn login(&self) -> Result<String, SapError> {
        let response = self
            .inner
            .client
            .post(format!("{}/Login", self.inner.base_url))
            .json(&LoginRequest {
                company_db: &self.inner.company_db,
                user_name: &self.inner.username,
                password: self.inner.password.expose_secret(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SapError::Login {
                status: status.as_u16(),
                message,
            });
        }

        let body: LoginResponse = response.json().await?;
        tracing::debug!("SAP session opened");
        Ok(body.session_id)
    }

    async fn session_id(&self) -> Result<String, SapError> {
        if let Some(id) = self.inner.session.get(&()).await {
            return Ok(id);
        }
        let id = self.login().await?;
        self.inner.session.insert((), id.clone()).await;
        Ok(id)
    }

    /// GET a path (with query) relative to the service URL.
    ///
    /// # Errors
    ///
    /// Returns `SapError::Api` for error statuses after the single re-login.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SapError> {
        let url = format!("{}{path}", self.inner.base_url);

        let mut retried = false;
        loop {
            let session = self.session_id().await?;
            let response = self
                .inner
                .client
                .get(&url)
                .header(reqwest::header::COOKIE, format!("B1SESSION={session}"))
                .header("Prefer", format!("odata.maxpagesize={PAGE_SIZE}"))
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !retried {
                tracing::info!("SAP session expired, logging in again");
                self.inner.session.invalidate(&()).await;
                retried = true;
                continue;
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(SapError::Api {
                    status: status.as_u16(),
                    message,
                });
            }
            return Ok(response.json().await?);
        }
    }

    /// One page of items.
    ///
    /// # Errors
    ///
    /// Returns `SapError` on transport or API failure.
    pub async fn items(&self, skip: usize) -> Result<Vec<SapItem>, SapError> {
        let page: ODataPage<SapItem> = self.get(&items_path(skip)).await?;
        Ok(page.value)
    }

    /// One page of item groups.
    ///
    /// # Errors
    ///
    /// Returns `SapError` on transport or API failure.
    pub async fn item_groups(&self, skip: usize) -> Result<Vec<SapItemGroup>, SapError> {
        let page: ODataPage<SapItemGroup> = self
            .get(&format!("/ItemGroups?$select=Number,GroupName&$skip={skip}"))
            .await?;
        Ok(page.value)
    }

    /// One page of customer business partners.
    ///
    /// # Errors
    ///
    /// Returns `SapError` on transport or API failure.
    pub async fn customers(&self, skip: usize) -> Result<Vec<SapBusinessPartner>, SapError> {
        let page: ODataPage<SapBusinessPartner> = self.get(&customers_path(skip)).await?;
        Ok(page.value)
    }

    /// One page of payment terms.
    ///
    /// # Errors
    ///
    /// Returns `SapError` on transport or API failure.
    pub async fn payment_terms(&self, skip: usize) -> Result<Vec<SapPaymentTerms>, SapError> {
        let page: ODataPage<SapPaymentTerms> = self
            .get(&format!(
                "/PaymentTermsTypes?$select=GroupNumber,NumberOfAdditionalMonths,NumberOfAdditionalDays&$skip={skip}"
            ))
            .await?;
        Ok(page.value)
    }
}

fn items_path(skip: usize) -> String {
    format!(
        "/Items?$select=ItemCode,ItemName,ItemsGroupCode,SalesUnit,QuantityOnStock,Valid,Frozen,SalesItem,ItemPrices&$orderby=ItemCode&$skip={skip}"
    )
}

fn customers_path(skip: usize) -> String {
    format!(
        "/BusinessPartners?$select=CardCode,CardName,FederalTaxID,CreditLimit,PayTermsGrpCode&$filter=CardType%20eq%20'cCustomer'&$orderby=CardCode&$skip={skip}"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_page_with_skip() {
        assert!(items_path(200).ends_with("&$skip=200"));
        assert!(items_path(0).contains("ItemPrices"));
        assert!(customers_path(100).contains("CardType%20eq%20'cCustomer'"));
        assert!(customers_path(100).ends_with("&$skip=100"));
    }

    #[test]
    fn test_item_deserializes_service_layer_shape() {
        let json = r#"{
            "value": [{
                "ItemCode": "PAN-001",
                "ItemName": "Pan tajado integral",
                "ItemsGroupCode": 102,
                "SalesUnit": "und",
                "QuantityOnStock": 48.0,
                "Valid": "tYES",
                "Frozen": "tNO",
                "SalesItem": "tYES",
                "ItemPrices": [
                    {"PriceList": 1, "Price": 5200.0, "Currency": "COP"},
                    {"PriceList": 2, "Price": null, "Currency": "COP"}
                ]
            }]
        }"#;
        let page: ODataPage<SapItem> = serde_json::from_str(json).unwrap();
        let item = &page.value[0];
        assert_eq!(item.item_code, "PAN-001");
        assert_eq!(item.items_group_code, Some(102));
        assert_eq!(item.item_prices.len(), 2);
        assert_eq!(item.item_prices[1].price, None);
    }

    #[test]
    fn test_business_partner_deserializes_tax_id() {
        let bp: SapBusinessPartner = serde_json::from_str(
            r#"{"CardCode": "C0001", "CardName": "Café Aroma", "FederalTaxID": "900123456-7", "CreditLimit": 2500000.0, "PayTermsGrpCode": 3}"#,
        )
        .unwrap();
        assert_eq!(bp.federal_tax_id.as_deref(), Some("900123456-7"));
        assert_eq!(bp.pay_terms_grp_code, Some(3));
    }

    #[test]
    fn test_login_request_field_names() {
        let body = serde_json::to_value(LoginRequest {
            company_db: "SBO_ARTESA",
            user_name: "manager",
            password: "secret",
        })
        .unwrap();
        assert_eq!(body["CompanyDB"], "SBO_ARTESA");
        assert_eq!(body["UserName"], "manager");
        assert_eq!(body["Password"], "secret");
    }

    mod service_layer {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use axum::{
            Json, Router,
            extract::State,
            http::{HeaderMap, StatusCode as HttpStatus, header},
            response::{IntoResponse, Response},
            routing::{get, post},
        };
        use serde_json::json;

        use super::*;

        /// Stand-in Service Layer. Session `n` is the `n`th login; sessions
        /// numbered below `valid_from` are answered with `401`.
        struct Stub {
            logins: AtomicUsize,
            valid_from: usize,
        }

        async fn login(State(stub): State<Arc<Stub>>) -> Json<serde_json::Value> {
            let n = stub.logins.fetch_add(1, Ordering::SeqCst) + 1;
            Json(json!({ "SessionId": format!("session-{n}"), "SessionTimeout": 30 }))
        }

        async fn item_groups(State(stub): State<Arc<Stub>>, headers: HeaderMap) -> Response {
            let session = headers
                .get(header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("B1SESSION=session-"))
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0);
            if session < stub.valid_from {
                return (HttpStatus::UNAUTHORIZED, "Invalid session").into_response();
            }
            Json(json!({ "value": [{ "Number": 102, "GroupName": "Panadería" }] })).into_response()
        }

        async fn client_for(valid_from: usize) -> (SapClient, Arc<Stub>) {
            let stub = Arc::new(Stub {
                logins: AtomicUsize::new(0),
                valid_from,
            });
            let app = Router::new()
                .route("/b1s/v1/Login", post(login))
                .route("/b1s/v1/ItemGroups", get(item_groups))
                .with_state(Arc::clone(&stub));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

            let client = SapClient::new(&SapConfig {
                service_url: format!("http://{addr}/b1s/v1/"),
                company_db: "SBO_ARTESA".to_owned(),
                username: "manager".to_owned(),
                password: SecretString::from("secret".to_owned()),
                price_list: 1,
            })
            .unwrap();
            (client, stub)
        }

        #[tokio::test]
        async fn test_session_is_cached_between_requests() {
            let (client, stub) = client_for(1).await;
            for _ in 0..3 {
                let groups = client.item_groups(0).await.unwrap();
                assert_eq!(groups[0].group_name, "Panadería");
            }
            assert_eq!(stub.logins.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_expired_session_logs_in_again_once() {
            let (client, stub) = client_for(2).await;
            let groups = client.item_groups(0).await.unwrap();
            assert_eq!(groups[0].number, 102);
            assert_eq!(stub.logins.load(Ordering::SeqCst), 2);

            // The fresh session replaced the stale one in the cache
            client.item_groups(0).await.unwrap();
            assert_eq!(stub.logins.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_second_unauthorized_is_an_error() {
            let (client, stub) = client_for(usize::MAX).await;
            match client.item_groups(0).await {
                Err(SapError::Api { status, .. }) => assert_eq!(status, 401),
                other => panic!("expected 401 from the API, got {:?}", other.map(|g| g.len())),
            }
            assert_eq!(stub.logins.load(Ordering::SeqCst), 2);
        }
    }
}
