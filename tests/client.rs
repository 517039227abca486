use std::time::Duration;

use base64::Engine;
use httpmock::prelude::*;
use lightspark_rs::mocks::{
    graphql_url, mock_graphql_error, mock_graphql_operation, mock_graphql_server_error,
    GRAPHQL_PATH,
};
use lightspark_rs::requester::{OPERATION_HEADER, SIGNING_HEADER};
use lightspark_rs::{
    CurrencyUnit, Error, LightsparkApi, LightsparkClient, MasterSeed, Network, Requester,
    RetryConfig, SigningKeyLoader, TransactionStatus,
};
use secrecy::SecretString;
use serde_json::json;

const NODE_ID: &str = "LightsparkNodeWithRemoteSigning:0188";

fn client_with_retry(server: &MockServer, retry: RetryConfig) -> LightsparkClient {
    let requester = Requester::with_base_url(
        "client-id",
        SecretString::new("client-secret".to_string()),
        Some(graphql_url(server)),
    )
    .unwrap()
    .with_retry_config(retry);
    LightsparkClient::with_requester(requester)
}

fn client_for(server: &MockServer) -> LightsparkClient {
    client_with_retry(server, RetryConfig::for_tests())
}

#[tokio::test]
async fn test_requests_carry_basic_auth_and_operation() {
    let server = MockServer::start();
    let credentials =
        base64::engine::general_purpose::STANDARD.encode("client-id:client-secret");
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql/server/rc")
            .header("authorization", format!("Basic {}", credentials))
            .header(OPERATION_HEADER, "GetNodePublicKey")
            .body_contains("\"operationName\":\"GetNodePublicKey\"")
            .body_contains("\"expires_at\":\"\"");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "data": { "entity": { "public_key": "02abcd" } } }));
    });

    let public_key = client_for(&server).get_node_public_key(NODE_ID).await.unwrap();
    assert_eq!(public_key.as_deref(), Some("02abcd"));
    mock.assert();
}

#[tokio::test]
async fn test_signed_mutation_sends_signature_header() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql/server/rc")
            .header(OPERATION_HEADER, "PayUmaInvoice")
            .header_exists(SIGNING_HEADER);
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": {
                    "pay_uma_invoice": {
                        "payment": {
                            "id": "OutgoingPayment:1",
                            "status": "PENDING",
                            "amount": { "original_value": 1000, "original_unit": "MILLISATOSHI" }
                        }
                    }
                }
            }));
    });

    let client = client_for(&server);
    let seed = MasterSeed::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
    client
        .load_node_signing_key(
            NODE_ID,
            &SigningKeyLoader::from_master_seed(seed, Network::Regtest),
        )
        .await
        .unwrap();

    let payment = client
        .pay_uma_invoice(NODE_ID, "lnbcrt1pmock", 60, 1_000_000, None)
        .await
        .unwrap();
    assert_eq!(payment.id, "OutgoingPayment:1");
    assert_eq!(payment.status, TransactionStatus::Pending);
    mock.assert();
}

#[tokio::test]
async fn test_signed_mutation_without_key_is_rejected() {
    let server = MockServer::start();
    let result = client_for(&server)
        .pay_uma_invoice(NODE_ID, "lnbcrt1pmock", 60, 1_000_000, None)
        .await;
    assert!(matches!(result, Err(Error::SigningKeyNotLoaded(id)) if id == NODE_ID));
}

#[tokio::test]
async fn test_graphql_error_with_name() {
    let server = MockServer::start();
    mock_graphql_error(
        &server,
        "DecodedPaymentRequest",
        "invoice is malformed",
        Some("InvalidInputError"),
    );

    let result = client_for(&server).decode_payment_request("lnbc1bad").await;
    match result {
        Err(Error::GraphQl {
            error_type,
            message,
        }) => {
            assert_eq!(error_type, "InvalidInputError");
            assert_eq!(message, "invoice is malformed");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_graphql_error_without_name_is_internal() {
    let server = MockServer::start();
    mock_graphql_error(&server, "GetNodeChannelUtxos", "something broke", None);

    let error = client_for(&server)
        .get_node_channel_utxos(NODE_ID)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::GraphQlInternal(ref message) if message == "something broke"));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = MockServer::start();
    let mock = mock_graphql_server_error(&server);

    let error = client_for(&server)
        .get_outgoing_payment("OutgoingPayment:1")
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Request { status: 503, .. }));
    assert!(error.is_retryable());
    assert_eq!(error.status_code(), 500);
    // every attempt of the schedule was used
    mock.assert_hits(3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start_async().await;
    let mut unavailable = server
        .mock_async(|when, then| {
            when.method(POST).path(GRAPHQL_PATH);
            then.status(503);
        })
        .await;

    let client = client_with_retry(
        &server,
        RetryConfig::for_tests()
            .with_base_delay_ms(500)
            .with_max_delay_ms(500),
    );
    let call = tokio::spawn(async move { client.get_node_public_key(NODE_ID).await });

    while unavailable.hits_async().await == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    unavailable.delete_async().await;
    let available = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(GRAPHQL_PATH)
                .header(OPERATION_HEADER, "GetNodePublicKey");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "data": { "entity": { "public_key": "02abcd" } } }));
        })
        .await;

    let public_key = call.await.unwrap().unwrap();
    assert_eq!(public_key.as_deref(), Some("02abcd"));
    available.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_non_retryable_error_is_not_retried() {
    let server = MockServer::start();
    let mock = mock_graphql_error(
        &server,
        "DecodedPaymentRequest",
        "invoice is malformed",
        Some("InvalidInputError"),
    );

    let result = client_for(&server).decode_payment_request("lnbc1bad").await;
    assert!(matches!(result, Err(Error::GraphQl { .. })));
    mock.assert_hits(1);
}

#[tokio::test]
async fn test_signed_operation_is_sent_once() {
    let server = MockServer::start();
    let mock = mock_graphql_server_error(&server);

    let client = client_for(&server);
    let seed = MasterSeed::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
    client
        .load_node_signing_key(
            NODE_ID,
            &SigningKeyLoader::from_master_seed(seed, Network::Regtest),
        )
        .await
        .unwrap();

    let error = client
        .pay_uma_invoice(NODE_ID, "lnbcrt1pmock", 60, 1_000_000, None)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Request { status: 503, .. }));
    mock.assert_hits(1);
}

#[tokio::test]
async fn test_decode_payment_request() {
    let server = MockServer::start();
    mock_graphql_operation(
        &server,
        "DecodedPaymentRequest",
        json!({
            "decoded_payment_request": {
                "__typename": "InvoiceData",
                "encoded_payment_request": "lnbcrt10u1pmock",
                "bitcoin_network": "REGTEST",
                "payment_hash": "7f8e",
                "amount": { "original_value": 1000, "original_unit": "SATOSHI" },
                "created_at": "2024-01-01T00:00:00Z",
                "expires_at": "2024-01-01T00:10:00Z",
                "memo": "coffee"
            }
        }),
    );

    let invoice = client_for(&server)
        .decode_payment_request("lnbcrt10u1pmock")
        .await
        .unwrap();
    assert_eq!(invoice.bitcoin_network, Network::Regtest);
    assert_eq!(invoice.amount.original_unit, CurrencyUnit::Satoshi);
    assert_eq!(invoice.amount.to_msats().unwrap(), 1_000_000);
    assert_eq!(invoice.memo.as_deref(), Some("coffee"));
}

#[tokio::test]
async fn test_decode_rejects_offers() {
    let server = MockServer::start();
    mock_graphql_operation(
        &server,
        "DecodedPaymentRequest",
        json!({ "decoded_payment_request": { "__typename": "OfferData" } }),
    );

    let result = client_for(&server).decode_payment_request("lno1mock").await;
    assert!(matches!(result, Err(Error::InvalidInvoice(_))));
}

#[tokio::test]
async fn test_missing_entity_reads_as_none() {
    let server = MockServer::start();
    mock_graphql_operation(&server, "GetOutgoingPayment", json!({ "entity": null }));

    let payment = client_for(&server)
        .get_outgoing_payment("OutgoingPayment:404")
        .await
        .unwrap();
    assert!(payment.is_none());
}

#[tokio::test]
async fn test_channel_utxos() {
    let server = MockServer::start();
    mock_graphql_operation(
        &server,
        "GetNodeChannelUtxos",
        json!({ "entity": { "uma_prescreening_utxos": ["txid:0", "txid:1"] } }),
    );

    let utxos = client_for(&server).get_node_channel_utxos(NODE_ID).await.unwrap();
    assert_eq!(utxos, vec!["txid:0", "txid:1"]);
}
