//! Polygon WebSocket Message Types
//!
//! Wire format types for the Polygon stocks WebSocket.
//!
//! # Message Types
//!
//! ## Control (client to server)
//! - `auth`: `{"action":"auth","params":"<key>"}`
//! - `subscribe` / `unsubscribe`: `{"action":"subscribe","params":"A.AAPL,A.MSFT"}`
//!
//! ## Status (server to client)
//! - `connected`: sent once on socket open
//! - `auth_success` / `auth_failed`: authentication outcome
//! - `success`: subscription acknowledgment
//!
//! ## Aggregates (server to client)
//! - `A`: per-second aggregate
//! - `AM`: per-minute aggregate
//!
//! Every server frame is a JSON array of event objects discriminated by the
//! `ev` field.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market_data::AggregateBar;

// =============================================================================
// Control Messages
// =============================================================================

/// Control action sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Authenticate with an API key.
    Auth,
    /// Add channel subscriptions.
    Subscribe,
    /// Remove channel subscriptions.
    Unsubscribe,
}

/// Control request.
///
/// # Wire Format (JSON)
/// ```json
/// {"action":"subscribe","params":"A.AAPL,A.MSFT"}
/// ```
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ControlRequest {
    /// Action.
    pub action: ControlAction,
    /// Key for `auth`, comma-separated channel list otherwise.
    pub params: String,
}

impl std::fmt::Debug for ControlRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params = if self.action == ControlAction::Auth {
            "[REDACTED]"
        } else {
            self.params.as_str()
        };
        f.debug_struct("ControlRequest")
            .field("action", &self.action)
            .field("params", &params)
            .finish()
    }
}

impl ControlRequest {
    /// Create an authentication request.
    #[must_use]
    pub fn auth(api_key: &str) -> Self {
        Self {
            action: ControlAction::Auth,
            params: api_key.to_string(),
        }
    }

    /// Create a subscribe request for `symbols` on `channel`.
    ///
    /// Returns `None` when `symbols` is empty.
    #[must_use]
    pub fn subscribe(channel: &str, symbols: &[String]) -> Option<Self> {
        Self::channels(ControlAction::Subscribe, channel, symbols)
    }

    /// Create an unsubscribe request for `symbols` on `channel`.
    ///
    /// Returns `None` when `symbols` is empty.
    #[must_use]
    pub fn unsubscribe(channel: &str, symbols: &[String]) -> Option<Self> {
        Self::channels(ControlAction::Unsubscribe, channel, symbols)
    }

    fn channels(action: ControlAction, channel: &str, symbols: &[String]) -> Option<Self> {
        if symbols.is_empty() {
            return None;
        }
        Some(Self {
            action,
            params: channel_params(channel, symbols),
        })
    }
}

/// Build the comma-separated channel list, e.g. `A.AAPL,A.MSFT`.
#[must_use]
pub fn channel_params(channel: &str, symbols: &[String]) -> String {
    symbols
        .iter()
        .map(|symbol| format!("{channel}.{symbol}"))
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Status Messages
// =============================================================================

/// Status / acknowledgment message.
///
/// # Wire Format (JSON)
/// ```json
/// {"ev":"status","status":"auth_success","message":"authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Event type (always "status").
    #[serde(rename = "ev")]
    pub event_type: String,

    /// Status code string.
    pub status: String,

    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

/// Classified status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Socket opened.
    Connected,
    /// Authentication accepted.
    AuthSuccess,
    /// Authentication rejected.
    AuthFailed,
    /// Generic success (subscription acks).
    Success,
    /// Server-side error.
    Error,
    /// Anything else.
    Other,
}

impl StatusMessage {
    /// Classify the status code.
    #[must_use]
    pub fn kind(&self) -> StatusKind {
        match self.status.as_str() {
            "connected" => StatusKind::Connected,
            "auth_success" => StatusKind::AuthSuccess,
            "auth_failed" => StatusKind::AuthFailed,
            "success" => StatusKind::Success,
            "error" => StatusKind::Error,
            _ => StatusKind::Other,
        }
    }
}

// =============================================================================
// Aggregate Messages
// =============================================================================

/// Aggregate bar event.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "ev": "A", "sym": "AAPL", "v": 1000000, "av": 52000000,
///   "op": 149.0, "vw": 150.2, "o": 150.0, "c": 150.5,
///   "h": 151.0, "l": 149.5, "a": 150.1, "z": 120,
///   "s": 1700000000000, "e": 1700000001000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateMessage {
    /// Event type: "A" (second) or "AM" (minute).
    #[serde(rename = "ev")]
    pub event_type: String,

    /// Ticker symbol.
    #[serde(rename = "sym")]
    pub symbol: String,

    /// Period volume.
    #[serde(rename = "v")]
    pub volume: Decimal,

    /// Accumulated volume for the day.
    #[serde(rename = "av", default)]
    pub accumulated_volume: Option<Decimal>,

    /// Official opening price for the day.
    #[serde(rename = "op", default)]
    pub official_open: Option<Decimal>,

    /// Period VWAP.
    #[serde(rename = "vw", default)]
    pub vwap: Option<Decimal>,

    /// Open price.
    #[serde(rename = "o")]
    pub open: Decimal,

    /// Close price.
    #[serde(rename = "c")]
    pub close: Decimal,

    /// High price.
    #[serde(rename = "h")]
    pub high: Decimal,

    /// Low price.
    #[serde(rename = "l")]
    pub low: Decimal,

    /// Day VWAP.
    #[serde(rename = "a", default)]
    pub day_vwap: Option<Decimal>,

    /// Average trade size.
    #[serde(rename = "z", default)]
    pub average_size: Option<Decimal>,

    /// Period start, epoch milliseconds.
    #[serde(rename = "s")]
    pub start_ms: i64,

    /// Period end, epoch milliseconds.
    #[serde(rename = "e", default)]
    pub end_ms: Option<i64>,
}

impl AggregateMessage {
    /// Convert to the domain bar.
    #[must_use]
    pub fn to_bar(&self) -> AggregateBar {
        AggregateBar {
            symbol: self.symbol.clone(),
            period_start_ms: self.start_ms,
            period_end_ms: self.end_ms,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            vwap: self.vwap,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_auth_request() {
        let json = serde_json::to_string(&ControlRequest::auth("key123")).unwrap();
        assert_eq!(json, r#"{"action":"auth","params":"key123"}"#);
    }

    #[test]
    fn auth_request_debug_redacts_key() {
        let debug = format!("{:?}", ControlRequest::auth("key123"));
        assert!(!debug.contains("key123"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn serialize_subscribe_request() {
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let req = ControlRequest::subscribe("A", &symbols).unwrap();

        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"action":"subscribe","params":"A.AAPL,A.MSFT"}"#);
    }

    #[test]
    fn unsubscribe_uses_channel_prefix() {
        let req = ControlRequest::unsubscribe("AM", &["TSLA".to_string()]).unwrap();
        assert_eq!(req.action, ControlAction::Unsubscribe);
        assert_eq!(req.params, "AM.TSLA");
    }

    #[test]
    fn empty_symbol_list_produces_no_request() {
        assert!(ControlRequest::subscribe("A", &[]).is_none());
        assert!(ControlRequest::unsubscribe("A", &[]).is_none());
    }

    #[test]
    fn deserialize_status() {
        let json = r#"{"ev":"status","status":"auth_success","message":"authenticated"}"#;
        let msg: StatusMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind(), StatusKind::AuthSuccess);
        assert_eq!(msg.message, "authenticated");
    }

    #[test]
    fn status_without_message_defaults() {
        let json = r#"{"ev":"status","status":"connected"}"#;
        let msg: StatusMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind(), StatusKind::Connected);
        assert!(msg.message.is_empty());
    }

    #[test]
    fn unknown_status_is_other() {
        let json = r#"{"ev":"status","status":"max_connections","message":"too many"}"#;
        let msg: StatusMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind(), StatusKind::Other);
    }

    #[test]
    fn deserialize_aggregate() {
        let json = r#"{
            "ev": "A",
            "sym": "AAPL",
            "v": 1000000,
            "av": 52000000,
            "op": 149.0,
            "vw": 150.2,
            "o": 150.0,
            "c": 150.5,
            "h": 151.0,
            "l": 149.5,
            "a": 150.1,
            "z": 120,
            "s": 1700000000000,
            "e": 1700000001000
        }"#;
        let msg: AggregateMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.symbol, "AAPL");
        assert_eq!(msg.volume, Decimal::from(1_000_000));
        assert_eq!(msg.close, Decimal::new(1505, 1));
        assert_eq!(msg.start_ms, 1_700_000_000_000);

        let bar = msg.to_bar();
        assert_eq!(bar.symbol, "AAPL");
        assert_eq!(bar.period_start_ms, 1_700_000_000_000);
        assert_eq!(bar.period_end_ms, Some(1_700_000_001_000));
        assert_eq!(bar.high, Decimal::new(1510, 1));
        assert_eq!(bar.vwap, Some(Decimal::new(1502, 1)));
    }

    #[test]
    fn aggregate_optional_fields_may_be_absent() {
        let json = r#"{"ev":"AM","sym":"MSFT","v":10,"o":1,"c":2,"h":3,"l":1,"s":1700000000000}"#;
        let msg: AggregateMessage = serde_json::from_str(json).unwrap();
        assert!(msg.vwap.is_none());
        assert!(msg.end_ms.is_none());
    }

    #[test]
    fn aggregate_missing_required_field_fails() {
        let json = r#"{"ev":"A","sym":"AAPL","v":10,"o":1,"c":2,"h":3,"l":1}"#;
        assert!(serde_json::from_str::<AggregateMessage>(json).is_err());
    }
}
