use clap::{Parser, Subcommand};
use lightspark_rs::payments::wait_for_payment_completion;
use lightspark_rs::{
    Config, Error, LightsparkApi, LightsparkClient, PaymentPollConfig, SigningKeyLoader,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lightspark-cli", about = "Create and pay BOLT12 offers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Offer operations
    Offer {
        #[command(subcommand)]
        command: OfferCommand,
    },
}

#[derive(Debug, Subcommand)]
enum OfferCommand {
    /// Create an offer on the configured node
    Create {
        /// Amount in millisatoshis; omit for any amount
        #[arg(long)]
        amount: Option<i64>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Pay an encoded offer from the configured node
    Pay {
        /// bech32 encoded offer
        #[arg(long)]
        offer: String,
        /// Payment timeout, e.g. `60`, `60s` or `2m`
        #[arg(long, default_value = "60s", value_parser = parse_timeout_secs)]
        timeout: i32,
        /// Maximum fees in millisatoshis
        #[arg(long, default_value_t = 1_000_000)]
        maxfee: i64,
        /// Amount in millisatoshis for offers without one
        #[arg(long)]
        amount: Option<i64>,
        /// Wait for the payment to settle
        #[arg(long)]
        wait: bool,
    },
}

fn parse_timeout_secs(value: &str) -> Result<i32, String> {
    let (number, multiplier) = match value.strip_suffix('m') {
        Some(minutes) => (minutes, 60),
        None => (value.strip_suffix('s').unwrap_or(value), 1),
    };
    number
        .parse::<i32>()
        .ok()
        .filter(|secs| *secs > 0)
        .and_then(|secs| secs.checked_mul(multiplier))
        .ok_or_else(|| format!("invalid timeout: {}", value))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let client = LightsparkClient::from_config(&config)?;
    let node_id = config.require_node_id()?;

    match cli.command {
        Command::Offer { command } => match command {
            OfferCommand::Create {
                amount,
                description,
            } => {
                let offer = client
                    .create_offer(node_id, amount, description.as_deref())
                    .await?;
                println!("✅ Offer created: {}", offer.id);
                println!("{}", offer.encoded_offer);
            }
            OfferCommand::Pay {
                offer,
                timeout,
                maxfee,
                amount,
                wait,
            } => {
                let seed = config.master_seed.clone().ok_or_else(|| {
                    Error::MissingEnvVar("LIGHTSPARK_MASTER_SEED_HEX".to_string())
                })?;
                let loader = SigningKeyLoader::from_master_seed(seed, config.bitcoin_network);
                client.load_node_signing_key(node_id, &loader).await?;

                let payment = client
                    .pay_offer(node_id, &offer, timeout, maxfee, amount, None)
                    .await?;
                println!("📤 Payment {} is {:?}", payment.id, payment.status);

                if wait {
                    let poll = PaymentPollConfig::from_env()?;
                    let payment = wait_for_payment_completion(&client, payment, &poll).await?;
                    println!("✅ Payment {} finished: {:?}", payment.id, payment.status);
                }
            }
        },
    }
    Ok(())
}
