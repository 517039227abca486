//! GraphQL documents sent to the hosted service.
//!
//! Selections are kept to the fields this crate reads; the field names match
//! the structs in [`crate::model`].

pub const UPDATE_NODE_SHARED_SECRET_MUTATION: &str = r#"
mutation UpdateNodeSharedSecret(
  $node_id: ID!
  $shared_secret: Hash32!
) {
    update_node_shared_secret(input: {
        node_id: $node_id
        shared_secret: $shared_secret
    }) {
        node { id }
    }
}
"#;

pub const UPDATE_CHANNEL_PER_COMMITMENT_POINT_MUTATION: &str = r#"
mutation UpdateChannelPerCommitmentPoint(
  $channel_id: ID!
  $per_commitment_point: PublicKey!
  $per_commitment_point_index: Long!
) {
    update_channel_per_commitment_point(input: {
        channel_id: $channel_id
        per_commitment_point_index: $per_commitment_point_index
        per_commitment_point: $per_commitment_point
    }) {
        channel { id }
    }
}
"#;

pub const RELEASE_CHANNEL_PER_COMMITMENT_SECRET_MUTATION: &str = r#"
mutation ReleaseChannelPerCommitmentSecret(
  $channel_id: ID!
  $per_commitment_secret: Hash32!
  $per_commitment_index: Long!
) {
    release_channel_per_commitment_secret(input: {
        channel_id: $channel_id
        per_commitment_secret: $per_commitment_secret
        per_commitment_index: $per_commitment_index
    }) {
        channel { id }
    }
}
"#;

pub const SIGN_MESSAGES_MUTATION: &str = r#"
mutation SignMessages(
  $signatures: [IdAndSignature!]!
) {
    sign_messages(input: {
        signatures: $signatures
    }) {
        signed_payloads { id }
    }
}
"#;

pub const DECLINE_TO_SIGN_MESSAGES_MUTATION: &str = r#"
mutation DeclineToSignMessages($payload_ids: [ID!]!) {
    decline_to_sign_messages(input: {
        payload_ids: $payload_ids
    }) {
        declined_payloads { id }
    }
}
"#;

pub const SET_INVOICE_PAYMENT_HASH_MUTATION: &str = r#"
mutation SetInvoicePaymentHash(
  $invoice_id: ID!
  $payment_hash: Hash32!
  $preimage_nonce: Hash32
) {
    set_invoice_payment_hash(input: {
        invoice_id: $invoice_id
        payment_hash: $payment_hash
        preimage_nonce: $preimage_nonce
    }) {
        invoice { id }
    }
}
"#;

pub const SIGN_INVOICE_MUTATION: &str = r#"
mutation SignInvoice(
  $invoice_id: ID!
  $signature: Signature!
  $recovery_id: Int!
) {
    sign_invoice(input: {
        invoice_id: $invoice_id
        signature: $signature
        recovery_id: $recovery_id
    }) {
        invoice { id }
    }
}
"#;

pub const RELEASE_PAYMENT_PREIMAGE_MUTATION: &str = r#"
mutation ReleasePaymentPreimage(
  $invoice_id: ID!
  $payment_preimage: Hash32!
) {
    release_payment_preimage(input: {
        invoice_id: $invoice_id
        payment_preimage: $payment_preimage
    }) {
        invoice { id }
    }
}
"#;

pub const RECOVER_NODE_SIGNING_KEY_QUERY: &str = r#"
query RecoverNodeSigningKey(
    $node_id: ID!
) {
    entity(id: $node_id) {
        ... on LightsparkNodeWithOSK {
            encrypted_signing_private_key {
                encrypted_value
                cipher
            }
        }
    }
}
"#;

pub const NODE_CHANNEL_UTXO_QUERY: &str = r#"
query GetNodeChannelUtxos($node_id: ID!) {
    entity(id: $node_id) {
        ... on LightsparkNode {
            uma_prescreening_utxos
            public_key
            channels {
                entities {
                    funding_transaction {
                        transaction_hash
                    }
                }
            }
        }
    }
}
"#;

pub const NODE_PUBLIC_KEY_QUERY: &str = r#"
query GetNodePublicKey($node_id: ID!) {
    entity(id: $node_id) {
        ... on LightsparkNode {
            id
            public_key
        }
    }
}
"#;

pub const DECODE_PAYMENT_REQUEST_QUERY: &str = r#"
query DecodedPaymentRequest(
    $encoded_payment_request: String!
) {
    decoded_payment_request(encoded_payment_request: $encoded_payment_request) {
        __typename
        ... on InvoiceData {
            encoded_payment_request
            bitcoin_network
            payment_hash
            amount { original_value original_unit }
            created_at
            expires_at
            memo
            destination { id public_key }
        }
    }
}
"#;

pub const CREATE_UMA_INVOICE_MUTATION: &str = r#"
mutation CreateUmaInvoice(
    $node_id: ID!
    $amount_msats: Long!
    $metadata_hash: String!
    $expiry_secs: Int
) {
    create_uma_invoice(input: {
        node_id: $node_id
        amount_msats: $amount_msats
        metadata_hash: $metadata_hash
        expiry_secs: $expiry_secs
    }) {
        invoice {
            id
            status
            data {
                encoded_payment_request
                bitcoin_network
                payment_hash
                amount { original_value original_unit }
                created_at
                expires_at
                memo
            }
        }
    }
}
"#;

pub const CREATE_LNURL_INVOICE_MUTATION: &str = r#"
mutation CreateLnurlInvoice(
    $node_id: ID!
    $amount_msats: Long!
    $metadata_hash: String!
    $expiry_secs: Int
) {
    create_lnurl_invoice(input: {
        node_id: $node_id
        amount_msats: $amount_msats
        metadata_hash: $metadata_hash
        expiry_secs: $expiry_secs
    }) {
        invoice {
            id
            status
            data {
                encoded_payment_request
                bitcoin_network
                payment_hash
                amount { original_value original_unit }
                created_at
                expires_at
                memo
            }
        }
    }
}
"#;

pub const PAY_UMA_INVOICE_MUTATION: &str = r#"
mutation PayUmaInvoice(
    $node_id: ID!
    $encoded_invoice: String!
    $timeout_secs: Int!
    $maximum_fees_msats: Long!
    $amount_msats: Long
) {
    pay_uma_invoice(input: {
        node_id: $node_id
        encoded_invoice: $encoded_invoice
        timeout_secs: $timeout_secs
        maximum_fees_msats: $maximum_fees_msats
        amount_msats: $amount_msats
    }) {
        payment {
            id
            status
            amount { original_value original_unit }
            fees { original_value original_unit }
            uma_post_transaction_data {
                utxo
                amount { original_value original_unit }
            }
        }
    }
}
"#;

pub const OUTGOING_PAYMENT_QUERY: &str = r#"
query GetOutgoingPayment($id: ID!) {
    entity(id: $id) {
        ... on OutgoingPayment {
            id
            status
            amount { original_value original_unit }
            fees { original_value original_unit }
            uma_post_transaction_data {
                utxo
                amount { original_value original_unit }
            }
        }
    }
}
"#;

pub const CREATE_OFFER_MUTATION: &str = r#"
mutation CreateOffer(
    $node_id: ID!
    $amount_msats: Long
    $description: String
) {
    create_offer(input: {
        node_id: $node_id
        amount_msats: $amount_msats
        description: $description
    }) {
        offer {
            id
            encoded_offer
        }
    }
}
"#;

pub const PAY_OFFER_MUTATION: &str = r#"
mutation PayOffer(
    $node_id: ID!
    $encoded_offer: String!
    $timeout_secs: Int!
    $maximum_fees_msats: Long!
    $amount_msats: Long
    $idempotency_key: String
) {
    pay_offer(input: {
        node_id: $node_id
        encoded_offer: $encoded_offer
        timeout_secs: $timeout_secs
        maximum_fees_msats: $maximum_fees_msats
        amount_msats: $amount_msats
        idempotency_key: $idempotency_key
    }) {
        payment {
            id
            status
            amount { original_value original_unit }
            fees { original_value original_unit }
        }
    }
}
"#;
