use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{ContractGateway, ContractPayload, IntegrationError, TransactionSpaceId};

/// JSON-over-HTTP client for the contract system.
pub struct HttpContractGateway {
    client: reqwest::Client,
    endpoint: String,
    token: Option<SecretString>,
    timeout: Duration,
}

impl fmt::Debug for HttpContractGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpContractGateway")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpContractGateway {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| IntegrationError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
            timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(alias = "smart_space_id")]
    transaction_space_id: String,
}

#[async_trait]
impl ContractGateway for HttpContractGateway {
    async fn push_contract(
        &self,
        payload: &ContractPayload,
    ) -> Result<TransactionSpaceId, IntegrationError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("x-payload-hash", payload.payload_hash())
            .json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                IntegrationError::Timeout(self.timeout)
            } else {
                IntegrationError::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: PushResponse = response
            .json()
            .await
            .map_err(|err| IntegrationError::InvalidResponse(err.to_string()))?;
        if body.transaction_space_id.trim().is_empty() {
            return Err(IntegrationError::InvalidResponse(
                "empty transaction space id".to_string(),
            ));
        }
        Ok(TransactionSpaceId(body.transaction_space_id))
    }
}
