use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::queries;

/// A GraphQL mutation that reports a signing result back to the hosted service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQlResponse {
    pub query: &'static str,
    pub variables: Value,
    /// Top level field of the mutation result
    pub output_field: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAndSignature {
    pub id: String,
    pub signature: String,
}

/// Result of a handled [`SigningRequest`](super::SigningRequest), one variant per
/// request that needs an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningResponse {
    Ecdh {
        node_id: String,
        shared_secret_hex: String,
    },
    GetPerCommitmentPoint {
        channel_id: String,
        index: u64,
        per_commitment_point_hex: String,
    },
    ReleasePerCommitmentSecret {
        channel_id: String,
        index: u64,
        per_commitment_secret_hex: String,
    },
    InvoicePaymentHash {
        invoice_id: String,
        payment_hash_hex: String,
        nonce_hex: Option<String>,
    },
    SignInvoice {
        invoice_id: String,
        signature_hex: String,
        recovery_id: i32,
    },
    ReleasePaymentPreimage {
        invoice_id: String,
        payment_preimage_hex: String,
    },
    DeriveKeyAndSign {
        signatures: Vec<IdAndSignature>,
    },
}

impl SigningResponse {
    pub fn graphql_response(&self) -> GraphQlResponse {
        match self {
            SigningResponse::Ecdh {
                node_id,
                shared_secret_hex,
            } => GraphQlResponse {
                query: queries::UPDATE_NODE_SHARED_SECRET_MUTATION,
                variables: json!({
                    "node_id": node_id,
                    "shared_secret": shared_secret_hex,
                }),
                output_field: "update_node_shared_secret",
            },
            SigningResponse::GetPerCommitmentPoint {
                channel_id,
                index,
                per_commitment_point_hex,
            } => GraphQlResponse {
                query: queries::UPDATE_CHANNEL_PER_COMMITMENT_POINT_MUTATION,
                variables: json!({
                    "channel_id": channel_id,
                    "per_commitment_point": per_commitment_point_hex,
                    "per_commitment_point_index": index,
                }),
                output_field: "update_channel_per_commitment_point",
            },
            SigningResponse::ReleasePerCommitmentSecret {
                channel_id,
                index,
                per_commitment_secret_hex,
            } => GraphQlResponse {
                query: queries::RELEASE_CHANNEL_PER_COMMITMENT_SECRET_MUTATION,
                variables: json!({
                    "channel_id": channel_id,
                    "per_commitment_secret": per_commitment_secret_hex,
                    "per_commitment_index": index,
                }),
                output_field: "release_channel_per_commitment_secret",
            },
            SigningResponse::InvoicePaymentHash {
                invoice_id,
                payment_hash_hex,
                nonce_hex,
            } => {
                let mut variables = json!({
                    "invoice_id": invoice_id,
                    "payment_hash": payment_hash_hex,
                });
                if let Some(nonce) = nonce_hex {
                    variables["preimage_nonce"] = json!(nonce);
                }
                GraphQlResponse {
                    query: queries::SET_INVOICE_PAYMENT_HASH_MUTATION,
                    variables,
                    output_field: "set_invoice_payment_hash",
                }
            }
            SigningResponse::SignInvoice {
                invoice_id,
                signature_hex,
                recovery_id,
            } => GraphQlResponse {
                query: queries::SIGN_INVOICE_MUTATION,
                variables: json!({
                    "invoice_id": invoice_id,
                    "signature": signature_hex,
                    "recovery_id": recovery_id,
                }),
                output_field: "sign_invoice",
            },
            SigningResponse::ReleasePaymentPreimage {
                invoice_id,
                payment_preimage_hex,
            } => GraphQlResponse {
                query: queries::RELEASE_PAYMENT_PREIMAGE_MUTATION,
                variables: json!({
                    "invoice_id": invoice_id,
                    "payment_preimage": payment_preimage_hex,
                }),
                output_field: "release_payment_preimage",
            },
            SigningResponse::DeriveKeyAndSign { signatures } => GraphQlResponse {
                query: queries::SIGN_MESSAGES_MUTATION,
                variables: json!({ "signatures": signatures }),
                output_field: "sign_messages",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_hash_response_omits_missing_nonce() {
        let response = SigningResponse::InvoicePaymentHash {
            invoice_id: "invoice".to_string(),
            payment_hash_hex: "00".to_string(),
            nonce_hex: None,
        }
        .graphql_response();
        assert_eq!(response.output_field, "set_invoice_payment_hash");
        assert!(response.variables.get("preimage_nonce").is_none());

        let response = SigningResponse::InvoicePaymentHash {
            invoice_id: "invoice".to_string(),
            payment_hash_hex: "00".to_string(),
            nonce_hex: Some("11".to_string()),
        }
        .graphql_response();
        assert_eq!(response.variables["preimage_nonce"], "11");
    }

    #[test]
    fn test_sign_messages_variables() {
        let response = SigningResponse::DeriveKeyAndSign {
            signatures: vec![IdAndSignature {
                id: "job-1".to_string(),
                signature: "abcd".to_string(),
            }],
        }
        .graphql_response();
        assert!(response.query.contains("mutation SignMessages"));
        assert_eq!(
            response.variables,
            json!({"signatures": [{"id": "job-1", "signature": "abcd"}]})
        );
    }

    #[test]
    fn test_per_commitment_point_variables() {
        let response = SigningResponse::GetPerCommitmentPoint {
            channel_id: "channel".to_string(),
            index: 281474976710654,
            per_commitment_point_hex: "02ab".to_string(),
        }
        .graphql_response();
        assert_eq!(
            response.variables["per_commitment_point_index"],
            281474976710654u64
        );
        assert_eq!(response.output_field, "update_channel_per_commitment_point");
    }
}
