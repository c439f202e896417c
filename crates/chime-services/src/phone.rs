//! Phone provisioning collaborator.
//!
//! The real client speaks a Twilio-style REST API with basic auth:
//! account fetch for the health probe, available-number search,
//! incoming-number purchase, and release by resource SID. The mock never
//! provisions a number, which is how a degraded pipeline produces an
//! agent without one.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use chime_core::ids::AgentId;

use crate::errors::ServiceError;
use crate::types::{AvailableNumber, ProvisionedPhone, ServiceVariant};

/// Searches, provisions, and releases phone numbers.
#[async_trait]
pub trait PhoneService: Send + Sync {
    /// Which implementation this is.
    fn variant(&self) -> ServiceVariant;

    /// Cheap health check, called once at pipeline construction.
    async fn probe(&self) -> Result<(), ServiceError>;

    /// List numbers available for purchase, optionally filtered by area code.
    async fn search(&self, area_code: Option<&str>) -> Result<Vec<AvailableNumber>, ServiceError>;

    /// Purchase `number` for `agent_id`. `None` means the provider could
    /// not supply a number (the mock always answers this way).
    async fn provision(
        &self,
        number: &str,
        agent_id: &AgentId,
    ) -> Result<Option<ProvisionedPhone>, ServiceError>;

    /// Release a previously provisioned number by its resource SID.
    async fn release(&self, sid: &str) -> Result<(), ServiceError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    available_phone_numbers: Vec<ApiNumber>,
}

#[derive(Deserialize)]
struct ApiNumber {
    phone_number: String,
    #[serde(default)]
    locality: Option<String>,
}

#[derive(Deserialize)]
struct PurchaseResponse {
    sid: String,
    phone_number: String,
}

/// Real phone client.
pub struct TwilioPhoneClient {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
}

impl TwilioPhoneClient {
    /// Create a client against `base_url` for the given account.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
        }
    }

    fn account_url(&self, suffix: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}{suffix}",
            self.base_url, self.account_sid
        )
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ServiceError::Upstream {
                status: status.as_u16(),
                detail: status.canonical_reason().unwrap_or("phone api error").into(),
            })
        }
    }
}

#[async_trait]
impl PhoneService for TwilioPhoneClient {
    fn variant(&self) -> ServiceVariant {
        ServiceVariant::Real
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        if self.account_sid.is_empty() || self.auth_token.is_empty() {
            return Err(ServiceError::NotConfigured("phone account credentials".into()));
        }
        let response = self
            .client
            .get(self.account_url(".json"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        let _ = Self::check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn search(&self, area_code: Option<&str>) -> Result<Vec<AvailableNumber>, ServiceError> {
        let mut request = self
            .client
            .get(self.account_url("/AvailablePhoneNumbers/US/Local.json"))
            .basic_auth(&self.account_sid, Some(&self.auth_token));
        if let Some(code) = area_code {
            request = request.query(&[("AreaCode", code)]);
        }
        let response = Self::check_status(request.send().await?).await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        debug!(count = body.available_phone_numbers.len(), "numbers found");
        Ok(body
            .available_phone_numbers
            .into_iter()
            .map(|n| AvailableNumber {
                number: n.phone_number,
                locality: n.locality,
            })
            .collect())
    }

    #[instrument(skip(self, agent_id), fields(agent_id = %agent_id))]
    async fn provision(
        &self,
        number: &str,
        agent_id: &AgentId,
    ) -> Result<Option<ProvisionedPhone>, ServiceError> {
        let response = self
            .client
            .post(self.account_url("/IncomingPhoneNumbers.json"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("PhoneNumber", number),
                ("FriendlyName", agent_id.as_str()),
            ])
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: PurchaseResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        info!(number = %body.phone_number, "phone number provisioned");
        Ok(Some(ProvisionedPhone {
            sid: body.sid,
            number: body.phone_number,
        }))
    }

    #[instrument(skip(self))]
    async fn release(&self, sid: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .delete(self.account_url(&format!("/IncomingPhoneNumbers/{sid}.json")))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        let _ = Self::check_status(response).await?;
        info!(sid, "phone number released");
        Ok(())
    }
}

/// Mock phone client: never supplies a number.
pub struct MockPhoneService;

#[async_trait]
impl PhoneService for MockPhoneService {
    fn variant(&self) -> ServiceVariant {
        ServiceVariant::Mock
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn search(&self, _area_code: Option<&str>) -> Result<Vec<AvailableNumber>, ServiceError> {
        Ok(Vec::new())
    }

    async fn provision(
        &self,
        _number: &str,
        _agent_id: &AgentId,
    ) -> Result<Option<ProvisionedPhone>, ServiceError> {
        Ok(None)
    }

    async fn release(&self, _sid: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TwilioPhoneClient {
        TwilioPhoneClient::new(reqwest::Client::new(), server.uri(), "AC_test", "token")
    }

    #[tokio::test]
    async fn probe_fetches_account() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2010-04-01/Accounts/AC_test.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sid": "AC_test"})))
            .mount(&server)
            .await;
        assert!(client_for(&server).probe().await.is_ok());
    }

    #[tokio::test]
    async fn probe_without_credentials_is_not_configured() {
        let client = TwilioPhoneClient::new(reqwest::Client::new(), "http://127.0.0.1:1", "", "");
        let err = client.probe().await.unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn search_passes_area_code_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/2010-04-01/Accounts/AC_test/AvailablePhoneNumbers/US/Local.json",
            ))
            .and(query_param("AreaCode", "415"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "available_phone_numbers": [
                    {"phone_number": "+14155550100", "locality": "San Francisco"}
                ]
            })))
            .mount(&server)
            .await;

        let numbers = client_for(&server).search(Some("415")).await.unwrap();
        assert_eq!(numbers.len(), 1);
        assert_eq!(numbers[0].number, "+14155550100");
        assert_eq!(numbers[0].locality.as_deref(), Some("San Francisco"));
    }

    #[tokio::test]
    async fn provision_returns_sid_and_number() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC_test/IncomingPhoneNumbers.json"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "sid": "PN123",
                "phone_number": "+14155550100"
            })))
            .mount(&server)
            .await;

        let provisioned = client_for(&server)
            .provision("+14155550100", &AgentId::from_string("agent_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(provisioned.sid, "PN123");
        assert_eq!(provisioned.number, "+14155550100");
    }

    #[tokio::test]
    async fn release_deletes_resource() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(
                "/2010-04-01/Accounts/AC_test/IncomingPhoneNumbers/PN123.json",
            ))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        assert!(client_for(&server).release("PN123").await.is_ok());
    }

    #[tokio::test]
    async fn upstream_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let err = client_for(&server).probe().await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream { status: 403, .. }));
    }

    #[tokio::test]
    async fn mock_never_provisions() {
        let svc = MockPhoneService;
        assert!(svc.search(Some("415")).await.unwrap().is_empty());
        let provisioned = svc
            .provision("+14155550100", &AgentId::from_string("agent_1"))
            .await
            .unwrap();
        assert!(provisioned.is_none());
        assert!(svc.release("PN123").await.is_ok());
    }
}
