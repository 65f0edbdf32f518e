//! Client for the bot backend's user API. The backend is an external
//! service; only the three endpoints the tracker needs are modelled.

use crate::error::SyncError;
use crate::model::{UserSnapshot, UserState};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    Pending,
    Demo,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Demo => "demo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessStatus {
    pub has_access: bool,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub demo_expires: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<UserState>,
    #[serde(default)]
    pub xp_added: Option<i64>,
    #[serde(default)]
    pub streak_multiplier: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

pub trait SyncBackend {
    fn fetch_access(&self, user_id: i64) -> Result<AccessStatus, SyncError>;
    fn fetch_full(&self, user_id: i64) -> Result<UserSnapshot, SyncError>;
    fn push_sync(&self, user_id: i64, state: &UserState) -> Result<SyncResponse, SyncError>;
}

pub struct HttpBackend {
    client: reqwest::blocking::Client,
    base_url: String,
}

fn network(e: reqwest::Error) -> SyncError {
    SyncError::Network(e.to_string())
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(network)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, user_id: i64, endpoint: &str) -> String {
        format!("{}/api/user/{}/{}", self.base_url, user_id, endpoint)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SyncError> {
        let response = self.client.get(url).send().map_err(network)?;
        if !response.status().is_success() {
            return Err(SyncError::Network(format!("HTTP {}", response.status())));
        }
        response.json::<T>().map_err(network)
    }
}

impl SyncBackend for HttpBackend {
    fn fetch_access(&self, user_id: i64) -> Result<AccessStatus, SyncError> {
        self.get_json(&self.url(user_id, "access"))
    }

    fn fetch_full(&self, user_id: i64) -> Result<UserSnapshot, SyncError> {
        self.get_json(&self.url(user_id, "full"))
    }

    fn push_sync(&self, user_id: i64, state: &UserState) -> Result<SyncResponse, SyncError> {
        let url = self.url(user_id, "sync");
        log::debug!("POST {}", url);
        let response = self.client.post(&url).json(state).send().map_err(network)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SyncError::Network(format!("HTTP {}: {}", status, body)));
        }
        response.json::<SyncResponse>().map_err(network)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Scripted backend: pops one queued result per push, records payloads.
    #[derive(Default)]
    pub struct MockBackend {
        pub push_results: RefCell<VecDeque<Result<SyncResponse, SyncError>>>,
        pub pushed: RefCell<Vec<(i64, UserState)>>,
        pub full: RefCell<Option<Result<UserSnapshot, SyncError>>>,
        pub access: Option<AccessStatus>,
    }

    impl MockBackend {
        pub fn ok_echo() -> SyncResponse {
            SyncResponse {
                success: true,
                data: None,
                xp_added: None,
                streak_multiplier: None,
                error: None,
            }
        }

        pub fn script(&self, result: Result<SyncResponse, SyncError>) {
            self.push_results.borrow_mut().push_back(result);
        }
    }

    impl SyncBackend for MockBackend {
        fn fetch_access(&self, _user_id: i64) -> Result<AccessStatus, SyncError> {
            self.access
                .clone()
                .ok_or_else(|| SyncError::Network("no access scripted".into()))
        }

        fn fetch_full(&self, _user_id: i64) -> Result<UserSnapshot, SyncError> {
            self.full
                .borrow()
                .clone()
                .unwrap_or_else(|| Err(SyncError::Network("no snapshot scripted".into())))
        }

        fn push_sync(&self, user_id: i64, state: &UserState) -> Result<SyncResponse, SyncError> {
            self.pushed.borrow_mut().push((user_id, state.clone()));
            self.push_results
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(Self::ok_echo()))
        }
    }
}
