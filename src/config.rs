//! Environment-backed configuration.
//!
//! Every process owns exactly one of these structs; nothing here is global.
//! `from_env()` constructors load a `.env` file through `dotenvy` first, then
//! read and validate the keys they need.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio_retry::strategy::ExponentialBackoff;

use crate::crypto::{MasterSeed, Network};
use crate::error::Error;
use crate::signing_key_loader::{SigningKeyLoader, REGTEST_SIGNING_KEY_PASSWORD};

/// Static user id of the demo receiver, so callback URLs are stable across restarts.
pub const DEFAULT_RECEIVER_USER_ID: &str = "4b41ae03-01b8-4974-8d26-26a35d28851b";

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn required(key: &str) -> Result<String, Error> {
    optional(key).ok_or_else(|| Error::MissingEnvVar(key.to_string()))
}

fn parse_or<T>(key: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| Error::InvalidConfig(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

/// `false` and `0` (any case) are false, anything else set is true.
fn bool_or(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => !(value.eq_ignore_ascii_case("false") || value == "0"),
        Err(_) => default,
    }
}

fn network_or(key: &str, default: Network) -> Result<Network, Error> {
    match optional(key) {
        Some(value) => value
            .trim()
            .to_uppercase()
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("Invalid {}: {}", key, value))),
        None => Ok(default),
    }
}

fn seed(key: &str, hex_seed: &str) -> Result<MasterSeed, Error> {
    MasterSeed::from_hex(hex_seed)
        .map_err(|e| Error::InvalidConfig(format!("Invalid {}: {}", key, e)))
}

/// SDK and CLI configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_client_id: String,
    pub api_client_secret: SecretString,
    pub node_id: Option<String>,
    pub master_seed: Option<MasterSeed>,
    /// Network of the node; defaults to `REGTEST`
    pub bitcoin_network: Network,
    /// Overrides the hosted-service GraphQL endpoint
    pub api_endpoint: Option<String>,
    /// Per-request timeout for hosted-service calls
    pub request_timeout_seconds: u64,
    /// Retries of unsigned hosted-service calls
    pub retry: RetryConfig,
}

impl Config {
    /// Loads the configuration from the environment
    ///
    /// Environment variables:
    /// - `LIGHTSPARK_API_TOKEN_CLIENT_ID` (required)
    /// - `LIGHTSPARK_API_TOKEN_CLIENT_SECRET` (required)
    /// - `LIGHTSPARK_NODE_ID`
    /// - `LIGHTSPARK_MASTER_SEED_HEX`
    /// - `LIGHTSPARK_BITCOIN_NETWORK` (default: REGTEST)
    /// - `LIGHTSPARK_API_ENDPOINT`
    /// - `LIGHTSPARK_REQUEST_TIMEOUT_SECONDS` (default: 30)
    /// - the `LIGHTSPARK_RETRY_*` keys of [`RetryConfig::from_env`]
    ///
    /// # Errors
    ///
    /// Returns `MissingEnvVar` for an absent required key and `InvalidConfig`
    /// for a value that does not parse.
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok();

        let api_client_id = required("LIGHTSPARK_API_TOKEN_CLIENT_ID")?;
        let api_client_secret = SecretString::new(required("LIGHTSPARK_API_TOKEN_CLIENT_SECRET")?);
        let master_seed = optional("LIGHTSPARK_MASTER_SEED_HEX")
            .map(|value| seed("LIGHTSPARK_MASTER_SEED_HEX", &value))
            .transpose()?;
        let request_timeout_seconds = parse_or("LIGHTSPARK_REQUEST_TIMEOUT_SECONDS", 30u64)?;
        if request_timeout_seconds == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            api_client_id,
            api_client_secret,
            node_id: optional("LIGHTSPARK_NODE_ID"),
            master_seed,
            bitcoin_network: network_or("LIGHTSPARK_BITCOIN_NETWORK", Network::Regtest)?,
            api_endpoint: optional("LIGHTSPARK_API_ENDPOINT"),
            request_timeout_seconds,
            retry: RetryConfig::from_env()?,
        })
    }

    pub fn require_node_id(&self) -> Result<&str, Error> {
        self.node_id
            .as_deref()
            .ok_or_else(|| Error::MissingEnvVar("LIGHTSPARK_NODE_ID".to_string()))
    }
}

/// Configuration of the remote-signing webhook server.
#[derive(Debug, Clone)]
pub struct RemoteSigningServerConfig {
    pub api_endpoint: Option<String>,
    pub api_client_id: String,
    pub api_client_secret: SecretString,
    pub webhook_secret: SecretString,
    pub master_seed: MasterSeed,
    /// Return the signing mutation variables in the webhook response instead of submitting them
    pub respond_directly: bool,
    /// Use the hash-checking validator instead of approving everything
    pub validation_enabled: bool,
    pub port: u16,
}

impl RemoteSigningServerConfig {
    /// Loads `API_ENDPOINT`, `API_CLIENT_ID`, `API_CLIENT_SECRET`, `WEBHOOK_SECRET`,
    /// `MASTER_SEED_HEX`, `RESPOND_DIRECTLY` (default false), `VALIDATION_ENABLED`
    /// (default true) and `PORT` (default 8080).
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok();

        let master_seed_hex = required("MASTER_SEED_HEX")?;
        let config = Self {
            api_endpoint: optional("API_ENDPOINT"),
            api_client_id: required("API_CLIENT_ID")?,
            api_client_secret: SecretString::new(required("API_CLIENT_SECRET")?),
            webhook_secret: SecretString::new(required("WEBHOOK_SECRET")?),
            master_seed: seed("MASTER_SEED_HEX", &master_seed_hex)?,
            respond_directly: bool_or("RESPOND_DIRECTLY", false),
            validation_enabled: bool_or("VALIDATION_ENABLED", true),
            port: parse_or("PORT", 8080u16)?,
        };

        tracing::info!(
            "Loaded configuration: API_ENDPOINT={}, API_CLIENT_ID={}, RESPOND_DIRECTLY={}, VALIDATION_ENABLED={}, PORT={}",
            config.api_endpoint.as_deref().unwrap_or("<default>"),
            config.api_client_id,
            config.respond_directly,
            config.validation_enabled,
            config.port
        );
        Ok(config)
    }

    pub fn webhook_secret(&self) -> &str {
        self.webhook_secret.expose_secret()
    }
}

/// Configuration of the demo UMA server, which plays both VASP roles.
#[derive(Debug, Clone)]
pub struct UmaServerConfig {
    pub api_client_id: String,
    pub api_client_secret: SecretString,
    pub api_endpoint: Option<String>,
    pub node_id: String,
    pub receiver_user: String,
    pub receiver_user_id: String,
    pub signing_pubkey_hex: String,
    pub signing_privkey_hex: SecretString,
    pub encryption_pubkey_hex: String,
    pub encryption_privkey_hex: SecretString,
    pub remote_signing_master_seed: Option<MasterSeed>,
    pub osk_signing_key_password: Option<SecretString>,
    pub bitcoin_network: Network,
    /// Explicit domain of this VASP; derived from the request host when unset
    pub vasp_domain: Option<String>,
    pub port: u16,
}

impl UmaServerConfig {
    /// Loads the UMA demo server configuration.
    ///
    /// `LIGHTSPARK_EXAMPLE_BASE_URL` is a bare host and expands to
    /// `https://<host>/graphql/server/rc`.
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok();

        let remote_signing_master_seed = optional("LIGHTSPARK_UMA_REMOTE_SIGNING_NODE_MASTER_SEED")
            .map(|value| seed("LIGHTSPARK_UMA_REMOTE_SIGNING_NODE_MASTER_SEED", &value))
            .transpose()?;

        let config = Self {
            api_client_id: required("LIGHTSPARK_API_TOKEN_CLIENT_ID")?,
            api_client_secret: SecretString::new(required("LIGHTSPARK_API_TOKEN_CLIENT_SECRET")?),
            api_endpoint: optional("LIGHTSPARK_EXAMPLE_BASE_URL")
                .map(|host| format!("https://{}/graphql/server/rc", host)),
            node_id: required("LIGHTSPARK_UMA_NODE_ID")?,
            receiver_user: optional("LIGHTSPARK_UMA_RECEIVER_USER")
                .unwrap_or_else(|| "ls_test".to_string()),
            receiver_user_id: DEFAULT_RECEIVER_USER_ID.to_string(),
            signing_pubkey_hex: required("LIGHTSPARK_UMA_SIGNING_PUBKEY")?,
            signing_privkey_hex: SecretString::new(required("LIGHTSPARK_UMA_SIGNING_PRIVKEY")?),
            encryption_pubkey_hex: required("LIGHTSPARK_UMA_ENCRYPTION_PUBKEY")?,
            encryption_privkey_hex: SecretString::new(required(
                "LIGHTSPARK_UMA_ENCRYPTION_PRIVKEY",
            )?),
            remote_signing_master_seed,
            osk_signing_key_password: optional("LIGHTSPARK_UMA_OSK_NODE_SIGNING_KEY_PASSWORD")
                .map(SecretString::new),
            bitcoin_network: network_or("LIGHTSPARK_BITCOIN_NETWORK", Network::Regtest)?,
            vasp_domain: optional("LIGHTSPARK_UMA_VASP_DOMAIN"),
            port: parse_or("PORT", 8080u16)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the key material decodes.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("LIGHTSPARK_UMA_SIGNING_PUBKEY", self.signing_pubkey_hex.as_str()),
            ("LIGHTSPARK_UMA_SIGNING_PRIVKEY", self.signing_privkey_hex.expose_secret().as_str()),
            ("LIGHTSPARK_UMA_ENCRYPTION_PUBKEY", self.encryption_pubkey_hex.as_str()),
            (
                "LIGHTSPARK_UMA_ENCRYPTION_PRIVKEY",
                self.encryption_privkey_hex.expose_secret().as_str(),
            ),
        ] {
            if hex::decode(value).is_err() {
                return Err(Error::InvalidConfig(format!("{} is not valid hex", name)));
            }
        }
        Ok(())
    }

    pub fn signing_pubkey(&self) -> Result<Vec<u8>, Error> {
        decode_key("LIGHTSPARK_UMA_SIGNING_PUBKEY", &self.signing_pubkey_hex)
    }

    pub fn signing_privkey(&self) -> Result<Vec<u8>, Error> {
        decode_key(
            "LIGHTSPARK_UMA_SIGNING_PRIVKEY",
            self.signing_privkey_hex.expose_secret(),
        )
    }

    pub fn encryption_pubkey(&self) -> Result<Vec<u8>, Error> {
        decode_key("LIGHTSPARK_UMA_ENCRYPTION_PUBKEY", &self.encryption_pubkey_hex)
    }

    pub fn encryption_privkey(&self) -> Result<Vec<u8>, Error> {
        decode_key(
            "LIGHTSPARK_UMA_ENCRYPTION_PRIVKEY",
            self.encryption_privkey_hex.expose_secret(),
        )
    }

    /// Domain this VASP is reachable at.
    ///
    /// The configured domain wins. Otherwise the request host is used with the
    /// listening port appended unless it is 80 or 443.
    pub fn vasp_domain(&self, request_host: &str) -> String {
        if let Some(domain) = &self.vasp_domain {
            return domain.clone();
        }
        let host = request_host.split(':').next().unwrap_or(request_host);
        if self.port == 80 || self.port == 443 {
            host.to_string()
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Key loader for the sending node: the master seed when the node signs
    /// remotely, else its password-wrapped OSK key.
    pub fn signing_key_loader(&self) -> SigningKeyLoader {
        match &self.remote_signing_master_seed {
            Some(seed) => SigningKeyLoader::from_master_seed(seed.clone(), self.bitcoin_network),
            None => {
                let password = self
                    .osk_signing_key_password
                    .as_ref()
                    .map(|password| password.expose_secret().clone())
                    .unwrap_or_else(|| REGTEST_SIGNING_KEY_PASSWORD.to_string());
                SigningKeyLoader::from_node_password(self.node_id.clone(), password)
            }
        }
    }
}

fn decode_key(name: &str, value: &str) -> Result<Vec<u8>, Error> {
    hex::decode(value).map_err(|_| Error::InvalidConfig(format!("{} is not valid hex", name)))
}

/// Configuration for retrying transient hosted-service failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds to cap exponential backoff
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Creates a RetryConfig from environment variables with default fallbacks
    ///
    /// Environment variables:
    /// - `LIGHTSPARK_RETRY_MAX_ATTEMPTS` (default: 3)
    /// - `LIGHTSPARK_RETRY_BASE_DELAY_MS` (default: 250)
    /// - `LIGHTSPARK_RETRY_MAX_DELAY_MS` (default: 5000)
    pub fn from_env() -> Result<Self, Error> {
        let defaults = Self::default();
        let config = Self {
            max_attempts: parse_or("LIGHTSPARK_RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay_ms: parse_or("LIGHTSPARK_RETRY_BASE_DELAY_MS", defaults.base_delay_ms)?,
            max_delay_ms: parse_or("LIGHTSPARK_RETRY_MAX_DELAY_MS", defaults.max_delay_ms)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.base_delay_ms == 0 {
            return Err(Error::InvalidConfig(
                "base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::InvalidConfig(
                "max_delay_ms must be greater than or equal to base_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Three attempts, 10ms apart
    pub fn for_tests() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 10,
        }
    }

    /// A single attempt
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delays before each retry: `base_delay_ms` doubling up to `max_delay_ms`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        backoff_delays(self.base_delay_ms, self.max_delay_ms, self.max_attempts)
    }
}

pub(crate) fn backoff_delays(
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor((base_delay_ms / 2).max(1))
        .max_delay(Duration::from_millis(max_delay_ms))
        .take(max_attempts.saturating_sub(1) as usize)
}

/// Backoff schedule for polling an outgoing payment until it settles.
#[derive(Debug, Clone)]
pub struct PaymentPollConfig {
    /// Delay before the second poll in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for a single delay in milliseconds
    pub max_delay_ms: u64,
    /// Maximum number of status reads
    pub max_attempts: u32,
    /// Overall deadline in seconds
    pub deadline_seconds: u64,
}

impl Default for PaymentPollConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 2000,
            max_attempts: 200,
            deadline_seconds: 20,
        }
    }
}

impl PaymentPollConfig {
    /// Creates a PaymentPollConfig from environment variables with default fallbacks
    ///
    /// Environment variables:
    /// - `LIGHTSPARK_PAYMENT_POLL_BASE_DELAY_MS` (default: 100)
    /// - `LIGHTSPARK_PAYMENT_POLL_MAX_DELAY_MS` (default: 2000)
    /// - `LIGHTSPARK_PAYMENT_POLL_MAX_ATTEMPTS` (default: 200)
    /// - `LIGHTSPARK_PAYMENT_POLL_DEADLINE_SECONDS` (default: 20)
    pub fn from_env() -> Result<Self, Error> {
        let defaults = Self::default();
        let config = Self {
            base_delay_ms: parse_or("LIGHTSPARK_PAYMENT_POLL_BASE_DELAY_MS", defaults.base_delay_ms)?,
            max_delay_ms: parse_or("LIGHTSPARK_PAYMENT_POLL_MAX_DELAY_MS", defaults.max_delay_ms)?,
            max_attempts: parse_or("LIGHTSPARK_PAYMENT_POLL_MAX_ATTEMPTS", defaults.max_attempts)?,
            deadline_seconds: parse_or(
                "LIGHTSPARK_PAYMENT_POLL_DEADLINE_SECONDS",
                defaults.deadline_seconds,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.base_delay_ms == 0 {
            return Err(Error::InvalidConfig(
                "base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::InvalidConfig(
                "max_delay_ms must be greater than or equal to base_delay_ms".to_string(),
            ));
        }
        if self.deadline_seconds == 0 {
            return Err(Error::InvalidConfig(
                "deadline_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Short schedule for tests: 10ms base, 50ms cap, 20 attempts, 2 second deadline
    pub fn for_tests() -> Self {
        Self {
            base_delay_ms: 10,
            max_delay_ms: 50,
            max_attempts: 20,
            deadline_seconds: 2,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_deadline_seconds(mut self, deadline_seconds: u64) -> Self {
        self.deadline_seconds = deadline_seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uma_config(vasp_domain: Option<&str>, port: u16) -> UmaServerConfig {
        UmaServerConfig {
            api_client_id: "client".to_string(),
            api_client_secret: SecretString::new("secret".to_string()),
            api_endpoint: None,
            node_id: "node".to_string(),
            receiver_user: "ls_test".to_string(),
            receiver_user_id: DEFAULT_RECEIVER_USER_ID.to_string(),
            signing_pubkey_hex: "02".to_string(),
            signing_privkey_hex: SecretString::new("01".to_string()),
            encryption_pubkey_hex: "02".to_string(),
            encryption_privkey_hex: SecretString::new("01".to_string()),
            remote_signing_master_seed: None,
            osk_signing_key_password: None,
            bitcoin_network: Network::Regtest,
            vasp_domain: vasp_domain.map(str::to_string),
            port,
        }
    }

    #[test]
    fn test_payment_poll_config_default() {
        let config = PaymentPollConfig::default();
        assert_eq!(config.base_delay_ms, 100);
        assert_eq!(config.max_delay_ms, 2000);
        assert_eq!(config.max_attempts, 200);
        assert_eq!(config.deadline_seconds, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_payment_poll_config_builders() {
        let config = PaymentPollConfig::for_tests()
            .with_max_attempts(3)
            .with_base_delay_ms(5)
            .with_max_delay_ms(6)
            .with_deadline_seconds(1);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 5);
        assert_eq!(config.max_delay_ms, 6);
        assert_eq!(config.deadline_seconds, 1);
    }

    #[test]
    fn test_payment_poll_config_validation() {
        let err = PaymentPollConfig::default()
            .with_max_attempts(0)
            .validate()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: max_attempts must be greater than 0"
        );

        let err = PaymentPollConfig::default()
            .with_max_delay_ms(10)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max_delay_ms"));
    }

    #[test]
    fn test_vasp_domain_prefers_configured_domain() {
        let config = uma_config(Some("vasp1.example.com"), 9000);
        assert_eq!(config.vasp_domain("localhost:9000"), "vasp1.example.com");
    }

    #[test]
    fn test_vasp_domain_from_request_host() {
        assert_eq!(uma_config(None, 8080).vasp_domain("localhost:1234"), "localhost:8080");
        assert_eq!(uma_config(None, 443).vasp_domain("vasp.example.com:443"), "vasp.example.com");
        assert_eq!(uma_config(None, 80).vasp_domain("vasp.example.com"), "vasp.example.com");
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let debug = format!("{:?}", uma_config(None, 8080));
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("REDACTED"));
    }
}
