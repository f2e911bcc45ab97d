//! End-to-end calls against the mock node over both substrates.

use alloy::dyn_abi::DynSolValue;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dappchain_client::account::Address;
use dappchain_client::client::{ChainClient, ChainError};
use dappchain_client::config::{ClientConfig, RetryConfig};
use dappchain_client::contract::{Contract, EvmContract};
use dappchain_client::middleware::{MiddlewareError, VmType};
use dappchain_client::quickstart::{
    check_set_send, read_counter, CheckOutcome, MapEntry, GET_MSG, GET_TILE_MAP_STATE, SET_MSG,
    SET_TILE_MAP_STATE, TILE_MAP_ABI,
};
use dappchain_client::KeyPair;

mod common;

async fn connect(config: &ClientConfig) -> (Arc<ChainClient>, Arc<KeyPair>) {
    let keys = Arc::new(KeyPair::generate());
    let client = ChainClient::connect(config, keys.clone()).await.unwrap();
    (Arc::new(client), keys)
}

async fn blueprint(config: &ClientConfig) -> (Contract, Arc<KeyPair>) {
    let (client, keys) = connect(config).await;
    let contract = Contract::resolve(client, "BluePrint", keys.address()).await.unwrap();
    (contract, keys)
}

async fn tile_map(config: &ClientConfig) -> EvmContract {
    let (client, keys) = connect(config).await;
    EvmContract::new(
        client,
        Address::from_hex(common::TILE_MAP_ADDRESS).unwrap(),
        keys.address(),
        TILE_MAP_ABI,
    )
    .unwrap()
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        enabled: true,
        max_attempts: 3,
        base_delay_ms: 5,
        max_delay_ms: 20,
    }
}

async fn set_then_get(config: ClientConfig) {
    let (contract, _) = blueprint(&config).await;
    assert_eq!(contract.address().to_hex(), common::BLUEPRINT_ADDRESS);

    let receipt = contract.call(SET_MSG, &MapEntry::new("123", "1")).await.unwrap();
    assert_eq!(receipt.sequence, Some(1));
    assert!(receipt.hash.starts_with("0x"));

    let entry: MapEntry = contract
        .static_call(GET_MSG, &MapEntry::lookup("123"))
        .await
        .unwrap();
    assert_eq!(entry, MapEntry::new("123", "1"));
}

#[tokio::test]
async fn test_set_then_get_http() {
    let (addr, _) = common::start_mock_chain().await;
    set_then_get(common::http_config(addr)).await;
}

#[tokio::test]
async fn test_set_then_get_websocket() {
    let (addr, _) = common::start_mock_chain().await;
    set_then_get(common::ws_config(addr)).await;
}

#[tokio::test]
async fn test_unregistered_contract() {
    let (addr, _) = common::start_mock_chain().await;
    for config in [common::http_config(addr), common::ws_config(addr)] {
        let (client, keys) = connect(&config).await;
        let err = Contract::resolve(client, "Unregistered", keys.address())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::NotFound(name) if name == "Unregistered"));
    }
}

#[tokio::test]
async fn test_missing_value_is_empty_result() {
    let (addr, _) = common::start_mock_chain().await;
    let (contract, _) = blueprint(&common::http_config(addr)).await;

    let err = contract
        .static_call::<_, MapEntry>(GET_MSG, &MapEntry::lookup("nothing-here"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::EmptyResult { method } if method == GET_MSG));
}

#[tokio::test]
async fn test_serial_calls_consecutive_nonces() {
    let (addr, chain) = common::start_mock_chain().await;
    let (contract, keys) = blueprint(&common::ws_config(addr)).await;

    for n in 1..=5u64 {
        let receipt = contract
            .call(SET_MSG, &MapEntry::new("counter", n.to_string()))
            .await
            .unwrap();
        assert_eq!(receipt.sequence, Some(n));
    }
    assert_eq!(chain.committed_nonce(keys.public_key()), 5);
    assert_eq!(chain.stored("counter").as_deref(), Some("5"));
}

#[tokio::test]
async fn test_concurrent_calls_all_commit() {
    let (addr, chain) = common::start_mock_chain().await;
    let (contract, keys) = blueprint(&common::http_config(addr)).await;

    let calls = (0..4).map(|i| {
        let contract = contract.clone();
        async move { contract.call(SET_MSG, &MapEntry::new(format!("k{}", i), "v")).await }
    });
    for result in futures_util::future::join_all(calls).await {
        result.unwrap();
    }
    assert_eq!(chain.committed_nonce(keys.public_key()), 4);
}

#[tokio::test]
async fn test_stale_nonce_conflict_and_retry() {
    let (addr, chain) = common::start_mock_chain().await;
    let (contract, keys) = blueprint(&common::http_config(addr)).await;
    contract.call(SET_MSG, &MapEntry::new("a", "1")).await.unwrap();

    // A lagging read would repeat sequence 1; it is refused before broadcast.
    chain.serve_stale_nonces(1);
    let err = contract.call(SET_MSG, &MapEntry::new("a", "2")).await.unwrap_err();
    assert!(err.is_nonce_conflict());
    assert!(matches!(
        err,
        ChainError::Middleware(MiddlewareError::StaleNonce { reported: 0, last_assigned: 1 })
    ));
    assert_eq!(chain.broadcasts.load(Ordering::SeqCst), 1);
    assert_eq!(chain.stored("a").as_deref(), Some("1"));

    chain.serve_stale_nonces(1);
    let receipt = contract
        .call_with_retry(&fast_retry(), SET_MSG, &MapEntry::new("a", "3"))
        .await
        .unwrap();
    assert_eq!(receipt.sequence, Some(2));
    assert_eq!(chain.committed_nonce(keys.public_key()), 2);
    assert_eq!(chain.stored("a").as_deref(), Some("3"));
}

#[tokio::test]
async fn test_unknown_contract_rejected() {
    let (addr, _) = common::start_mock_chain().await;
    let (client, keys) = connect(&common::http_config(addr)).await;

    let err = client
        .call_async(keys.address(), keys.address(), VmType::Plain, b"{}".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::TxRejected { code: 3, .. }));
}

#[tokio::test]
async fn test_check_set_send() {
    let (addr, chain) = common::start_mock_chain().await;
    let (contract, _) = blueprint(&common::http_config(addr)).await;
    let retry = fast_retry();

    contract.call(SET_MSG, &MapEntry::new("123", "1")).await.unwrap();

    match check_set_send(&contract, &retry, "123", 1).await.unwrap() {
        CheckOutcome::Advanced { value, .. } => assert_eq!(value, 2),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(read_counter(&contract, "123").await.unwrap(), 2);

    let before = chain.broadcasts.load(Ordering::SeqCst);
    match check_set_send(&contract, &retry, "123", 7).await.unwrap() {
        CheckOutcome::CheaterDetected { chain: on_chain, local } => {
            assert_eq!((on_chain, local), (2, 7));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(chain.broadcasts.load(Ordering::SeqCst), before);
}

async fn tile_round_trip(config: ClientConfig) {
    let contract = tile_map(&config).await;
    for state in ["hello 42", "", "тайл ✓ 地图"] {
        contract
            .call(SET_TILE_MAP_STATE, &[DynSolValue::String(state.to_string())])
            .await
            .unwrap();
        let stored: String = contract
            .static_call_simple(GET_TILE_MAP_STATE, &[])
            .await
            .unwrap();
        assert_eq!(stored, state);
    }
}

#[tokio::test]
async fn test_tile_map_round_trip_http() {
    let (addr, _) = common::start_mock_chain().await;
    tile_round_trip(common::http_config(addr)).await;
}

#[tokio::test]
async fn test_tile_map_round_trip_websocket() {
    let (addr, chain) = common::start_mock_chain().await;
    tile_round_trip(common::ws_config(addr)).await;
    assert_eq!(chain.tile_state(), "тайл ✓ 地图");
}

#[tokio::test]
async fn test_abi_errors_send_nothing() {
    let (addr, chain) = common::start_mock_chain().await;
    let contract = tile_map(&common::http_config(addr)).await;

    let err = contract.call(SET_TILE_MAP_STATE, &[]).await.unwrap_err();
    assert!(matches!(err, ChainError::Abi(_)));
    let err = contract.static_call("NoSuchMethod", &[]).await.unwrap_err();
    assert!(matches!(err, ChainError::Abi(_)));
    assert_eq!(chain.broadcasts.load(Ordering::SeqCst), 0);
}
