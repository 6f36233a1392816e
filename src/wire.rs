//! JSON shapes exchanged between client and server.
//!
//! A response's `data` is itself a JSON document whose shape depends on the
//! command that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{balance::Balances, command::Command, schemas::Payment};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub was_successful: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            was_successful: true,
            error_message: None,
            data: None,
        }
    }

    pub fn ok_with(data: String) -> Self {
        Self {
            data: Some(data),
            ..Self::ok()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            was_successful: false,
            error_message: Some(message.into()),
            data: None,
        }
    }
}

/// `get-status`: positive values mean that user owes the caller.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub user_to_levs: Balances,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub auth_token: String,
    pub notifications: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistoryPayload {
    pub payment_history: Vec<PaymentRecord>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub payed_by: String,
    pub payed_to: String,
    pub levs: f64,
    pub payed_on: DateTime<Utc>,
}

impl From<Payment> for PaymentRecord {
    fn from(payment: Payment) -> Self {
        Self {
            payed_by: payment.from_id,
            payed_to: payment.to_id,
            levs: payment.amount,
            payed_on: payment.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_protocol_field_names() {
        let request = Request {
            command: Command::new("login", vec!["alice".into(), "pw".into()]),
            auth_token: None,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["command"]["name"], "login");
        assert_eq!(json["command"]["owner"], serde_json::Value::Null);
        assert!(json.get("authToken").is_some());
    }

    #[test]
    fn missing_optional_fields_decode_as_none() {
        let request: Request =
            serde_json::from_str(r#"{"command":{"name":"get-status","args":[]}}"#).unwrap();
        let response: Response = serde_json::from_str(r#"{"wasSuccessful":true}"#).unwrap();

        assert_eq!(request.auth_token, None);
        assert_eq!(request.command.owner, None);
        assert_eq!(response, Response::ok());
    }
}
