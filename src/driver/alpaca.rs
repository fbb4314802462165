//! Alpaca network handle.
//!
//! Every member maps to `{base}/api/v1/{device_type}/{device_number}/{member}`.
//! Property reads are `GET` with query parameters, writes and methods are `PUT`
//! with a form-encoded body. Both carry `ClientID` and `ClientTransactionID`.
//! Replies are JSON envelopes:
//!
//! ```text
//! { "Value": ..., "ErrorNumber": 0, "ErrorMessage": "",
//!   "ClientTransactionID": 7, "ServerTransactionID": 1043 }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::{DriverHandle, TransportError};
use crate::config::AlpacaSettings;
use crate::core::{Argument, DeviceCategory, DeviceValue, TransportKind};

#[derive(Debug, Deserialize)]
struct AlpacaEnvelope {
    #[serde(rename = "Value", default)]
    value: Option<serde_json::Value>,
    #[serde(rename = "ErrorNumber", default)]
    error_number: i32,
    #[serde(rename = "ErrorMessage", default)]
    error_message: String,
    #[serde(rename = "ClientTransactionID", default)]
    client_transaction_id: u32,
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    /// Property read.
    Get,
    /// Property write or method call.
    Put,
}

/// Handle over a remote Alpaca device.
pub struct AlpacaHandle {
    client: reqwest::Client,
    base_url: String,
    device_path: String,
    client_id: u32,
    transaction: AtomicU32,
    released: AtomicBool,
}

impl AlpacaHandle {
    /// Build the HTTP client and check that an Alpaca server answers.
    pub async fn open(
        settings: &AlpacaSettings,
        category: DeviceCategory,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        let handle = Self {
            client,
            base_url: settings.base_url(),
            device_path: format!(
                "/api/v1/{}/{}",
                category.alpaca_name(),
                settings.device_number
            ),
            client_id: settings.client_id,
            transaction: AtomicU32::new(0),
            released: AtomicBool::new(false),
        };
        handle.probe().await?;
        Ok(handle)
    }

    async fn probe(&self) -> Result<(), TransportError> {
        let url = format!("{}/management/apiversions", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(TransportError::Connect(format!(
                "{} answered HTTP {}",
                url,
                response.status()
            )));
        }
        let envelope: AlpacaEnvelope = response
            .json()
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", url, e)))?;
        let supports_v1 = envelope
            .value
            .as_ref()
            .and_then(|v| v.as_array())
            .map(|versions| versions.iter().any(|v| v.as_i64() == Some(1)))
            .unwrap_or(false);
        if !supports_v1 {
            return Err(TransportError::Connect(format!(
                "{} does not offer API version 1",
                self.base_url
            )));
        }
        Ok(())
    }

    fn next_transaction(&self) -> u32 {
        self.transaction.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn send(
        &self,
        verb: Verb,
        member: &str,
        args: &[Argument],
    ) -> Result<DeviceValue, TransportError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(TransportError::Released);
        }

        let url = format!(
            "{}{}/{}",
            self.base_url,
            self.device_path,
            member.to_ascii_lowercase()
        );
        let transaction = self.next_transaction();
        let mut params: Vec<(String, String)> = args
            .iter()
            .map(|a| (a.name.clone(), a.value.to_wire()))
            .collect();
        params.push(("ClientID".to_string(), self.client_id.to_string()));
        params.push(("ClientTransactionID".to_string(), transaction.to_string()));

        debug!(?verb, url = %url, transaction, "Alpaca request");
        let request = match verb {
            Verb::Get => self.client.get(&url).query(&params),
            Verb::Put => self.client.put(&url).form(&params),
        };
        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: AlpacaEnvelope = serde_json::from_str(&body)
            .map_err(|e| TransportError::Malformed(format!("{} ({})", e, body)))?;
        if envelope.client_transaction_id != 0 && envelope.client_transaction_id != transaction {
            warn!(
                member,
                sent = transaction,
                received = envelope.client_transaction_id,
                "ClientTransactionID was not echoed correctly"
            );
        }
        if envelope.error_number != 0 {
            return Err(TransportError::Device {
                code: envelope.error_number,
                message: envelope.error_message,
            });
        }

        Ok(envelope
            .value
            .as_ref()
            .map(DeviceValue::from_json)
            .unwrap_or(DeviceValue::Null))
    }
}

#[async_trait]
impl DriverHandle for AlpacaHandle {
    fn transport(&self) -> TransportKind {
        TransportKind::NetworkProtocol
    }

    fn describe(&self) -> String {
        format!("{}{}", self.base_url, self.device_path)
    }

    async fn get(&self, member: &str, args: &[Argument]) -> Result<DeviceValue, TransportError> {
        self.send(Verb::Get, member, args).await
    }

    async fn put(&self, member: &str, args: &[Argument]) -> Result<DeviceValue, TransportError> {
        self.send(Verb::Put, member, args).await
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            debug!(device = %self.describe(), "Alpaca handle released");
        }
    }
}
