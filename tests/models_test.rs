//! Wire-format tests for Deriv request and response models.

use rust_decimal_macros::dec;

use derivdeck::models::{
    AuthorizeRequest, BalanceRequest, CandlesRequest, ForgetRequest, InboundMessage, Request,
    SubscriptionKind, TicksRequest,
};
use derivdeck::websocket::parse_frame;

const TICK_JSON: &str = include_str!("fixtures/tick.json");
const CANDLES_JSON: &str = include_str!("fixtures/candles.json");
const OHLC_JSON: &str = include_str!("fixtures/ohlc.json");
const AUTHORIZE_JSON: &str = include_str!("fixtures/authorize.json");
const BALANCE_JSON: &str = include_str!("fixtures/balance.json");
const ERROR_JSON: &str = include_str!("fixtures/error.json");
const FORGET_JSON: &str = include_str!("fixtures/forget.json");

fn to_value(request: &Request) -> serde_json::Value {
    serde_json::to_value(request).expect("Failed to serialize request")
}

#[test]
fn test_subscription_kind_as_str() {
    assert_eq!(SubscriptionKind::Tick.as_str(), "ticks");
    assert_eq!(SubscriptionKind::Candle.as_str(), "candles");
}

#[test]
fn test_ticks_request_serializes() {
    let value = to_value(&Request::Ticks(TicksRequest::new("R_100", 7)));

    assert_eq!(value["ticks"], "R_100");
    assert_eq!(value["subscribe"], 1);
    assert_eq!(value["req_id"], 7);
}

#[test]
fn test_candles_request_serializes() {
    let value = to_value(&Request::Candles(CandlesRequest::new("frxEURUSD", 100, 60, 8)));

    assert_eq!(value["candles"], "frxEURUSD");
    assert_eq!(value["count"], 100);
    assert_eq!(value["granularity"], 60);
    assert_eq!(value["subscribe"], 1);
    assert_eq!(value["req_id"], 8);
}

#[test]
fn test_forget_request_serializes() {
    let value = to_value(&Request::Forget(ForgetRequest::new("abc-123")));
    assert_eq!(value, serde_json::json!({ "forget": "abc-123" }));
}

#[test]
fn test_authorize_request_serializes_and_redacts_debug() {
    let request = Request::Authorize(AuthorizeRequest::new("a1-secret"));

    assert_eq!(to_value(&request), serde_json::json!({ "authorize": "a1-secret" }));
    assert!(!format!("{request:?}").contains("a1-secret"));
}

#[test]
fn test_balance_request_serializes() {
    let value = to_value(&Request::Balance(BalanceRequest::new(3)));

    assert_eq!(value["balance"], 1);
    assert_eq!(value["subscribe"], 1);
    assert_eq!(value["req_id"], 3);
}

#[test]
fn test_tick_fixture_parses() {
    let envelope = parse_frame(TICK_JSON).unwrap().expect("tick is recognised");

    assert_eq!(envelope.req_id, Some(1));
    match envelope.message {
        InboundMessage::Tick(tick) => {
            assert_eq!(tick.quote, 1089.27);
            assert_eq!(tick.epoch, 1_700_000_123.0);
            assert_eq!(tick.symbol.as_deref(), Some("R_100"));
            assert_eq!(
                tick.id.as_deref(),
                Some("c84a793b-8a87-7999-ce10-9b22f7ceead3")
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_candles_fixture_parses_as_history() {
    let envelope = parse_frame(CANDLES_JSON).unwrap().unwrap();

    assert_eq!(envelope.req_id, Some(2));
    match envelope.message {
        InboundMessage::CandleBatch(batch) => {
            assert!(!batch.is_update);
            assert_eq!(batch.candles.len(), 2);
            assert_eq!(batch.candles[0].epoch, 1_700_000_040);
            assert_eq!(batch.candles[1].close, 1089.01);
            assert_eq!(
                batch.subscription_id.as_deref(),
                Some("5b3ed5c9-3f7a-4b6e-a2a5-3b1a6d0c1f4e")
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_ohlc_fixture_parses_string_prices() {
    let envelope = parse_frame(OHLC_JSON).unwrap().unwrap();

    match envelope.message {
        InboundMessage::CandleBatch(batch) => {
            assert!(batch.is_update);
            assert_eq!(batch.symbol.as_deref(), Some("R_100"));
            let bar = batch.candles[0];
            assert_eq!(bar.epoch, 1_700_000_100);
            assert_eq!(bar.open, 1089.01);
            assert_eq!(bar.high, 1089.40);
            assert_eq!(bar.low, 1088.90);
            assert_eq!(bar.close, 1089.27);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_authorize_fixture_parses() {
    let envelope = parse_frame(AUTHORIZE_JSON).unwrap().unwrap();

    assert_eq!(envelope.req_id, None);
    match envelope.message {
        InboundMessage::Authorize(account) => {
            assert_eq!(account.login_id, "CR90000123");
            assert_eq!(account.currency, "USD");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_balance_fixture_keeps_decimal_amount() {
    let envelope = parse_frame(BALANCE_JSON).unwrap().unwrap();

    match envelope.message {
        InboundMessage::Balance(balance) => {
            assert_eq!(balance.amount, dec!(9990.25));
            assert_eq!(balance.currency, "USD");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_error_fixture_wins_over_msg_type() {
    let envelope = parse_frame(ERROR_JSON).unwrap().unwrap();

    assert_eq!(envelope.req_id, Some(1));
    match envelope.message {
        InboundMessage::Error(error) => {
            assert_eq!(error.code.as_deref(), Some("InvalidSymbol"));
            assert_eq!(error.message, "Symbol NOT_A_SYMBOL is invalid.");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_forget_fixture_parses() {
    let envelope = parse_frame(FORGET_JSON).unwrap().unwrap();
    assert_eq!(envelope.message, InboundMessage::Forget { succeeded: true });
}

#[test]
fn test_unknown_message_type_is_skipped() {
    let frame = r#"{"msg_type":"time","time":1700000000}"#;
    assert!(parse_frame(frame).unwrap().is_none());
}

#[test]
fn test_invalid_json_is_malformed() {
    let err = parse_frame("{\"msg_type\":").unwrap_err();
    assert!(matches!(err, derivdeck::DeckError::MalformedMessage(_)));
}
