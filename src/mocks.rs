//! httpmock fixtures for the hosted GraphQL endpoint and counterparty VASPs.

use httpmock::prelude::*;
use httpmock::Mock;
use serde_json::{json, Value};

use crate::requester::OPERATION_HEADER;

pub const GRAPHQL_PATH: &str = "/graphql/server/rc";

/// Endpoint to hand to [`Requester::with_base_url`](crate::requester::Requester::with_base_url).
pub fn graphql_url(server: &MockServer) -> String {
    server.url(GRAPHQL_PATH)
}

/// Answers the GraphQL operation `operation` with `{"data": data}`.
pub fn mock_graphql_operation<'a>(server: &'a MockServer, operation: &str, data: Value) -> Mock<'a> {
    server.mock(|when, then| {
        when.method(POST)
            .path(GRAPHQL_PATH)
            .header(OPERATION_HEADER, operation);
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "data": data }));
    })
}

/// Answers `operation` with a GraphQL `errors` array.
pub fn mock_graphql_error<'a>(
    server: &'a MockServer,
    operation: &str,
    message: &str,
    error_name: Option<&str>,
) -> Mock<'a> {
    let mut error = json!({ "message": message });
    if let Some(error_name) = error_name {
        error["extensions"] = json!({ "error_name": error_name });
    }
    server.mock(|when, then| {
        when.method(POST)
            .path(GRAPHQL_PATH)
            .header(OPERATION_HEADER, operation);
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "errors": [error], "data": null }));
    })
}

pub fn mock_graphql_server_error(server: &MockServer) -> Mock<'_> {
    server.mock(|when, then| {
        when.method(POST).path(GRAPHQL_PATH);
        then.status(503);
    })
}

/// Serves `/.well-known/lnurlpubkey` for a VASP.
pub fn mock_vasp_public_keys<'a>(
    server: &'a MockServer,
    signing_pubkey_hex: &str,
    encryption_pubkey_hex: &str,
    expiration_timestamp: Option<i64>,
) -> Mock<'a> {
    let mut body = json!({
        "signingPubKey": signing_pubkey_hex,
        "encryptionPubKey": encryption_pubkey_hex,
    });
    if let Some(expiration_timestamp) = expiration_timestamp {
        body["expirationTimestamp"] = json!(expiration_timestamp);
    }
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/lnurlpubkey");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(body);
    })
}

/// Rejects every lnurlp request with 412 and `supportedMajorVersions`.
pub fn mock_unsupported_uma_version<'a>(
    server: &'a MockServer,
    username: &str,
    supported_major_versions: &str,
) -> Mock<'a> {
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/.well-known/lnurlp/{}", username));
        then.status(412)
            .header("content-type", "application/json")
            .json_body(json!({
                "reason": "Unsupported UMA version",
                "supportedMajorVersions": supported_major_versions,
                "unsupportedVersion": "0.3",
            }));
    })
}
