//! Command-line demo client: registers an account, opens a channel under a
//! chosen scheme, streams a handful of payments to a vendor, then requests
//! closure.
//!
//! # Usage
//!
//! ```bash
//! tollgate-client-demo \
//!     --issuer-url http://localhost:4031 \
//!     --vendor-url http://localhost:4032 \
//!     --vendor-public-key-der-b64 <base64> \
//!     --scheme paytree-second-opt \
//!     --amount 1000 \
//!     --payments 4
//! ```
//!
//! If `--client-key-path` is omitted, a fresh P-256 key is generated and
//! discarded at the end of the run.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use p256::ecdsa::SigningKey;
use p256::pkcs8::{EncodePrivateKey, LineEnding};
use tracing_subscriber::EnvFilter;

use tollgate_client::issuer_client::IssuerClient;
use tollgate_client::payword::PaywordChannel;
use tollgate_client::paytree::PaytreeChannel;
use tollgate_client::signature::build_payment_envelope;
use tollgate_client::vendor_client::VendorClient;
use tollgate_core::crypto::keys::PrivateKey;
use tollgate_proto::channel::{ChannelScheme, OpenChannelCommon, OpenChannelEnvelopeRequest};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchemeArg {
    Signature,
    Payword,
    Paytree,
    PaytreeFirstOpt,
    PaytreeSecondOpt,
}

impl From<SchemeArg> for ChannelScheme {
    fn from(value: SchemeArg) -> Self {
        match value {
            SchemeArg::Signature => Self::Signature,
            SchemeArg::Payword => Self::Payword,
            SchemeArg::Paytree => Self::Paytree,
            SchemeArg::PaytreeFirstOpt => Self::PaytreeFirstOpt,
            SchemeArg::PaytreeSecondOpt => Self::PaytreeSecondOpt,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tollgate-client-demo", about = "Streams payments through one channel scheme end to end")]
struct Args {
    /// Base URL of the issuer.
    #[arg(long, env = "ISSUER_URL")]
    issuer_url: String,

    /// Base URL of the vendor.
    #[arg(long, env = "VENDOR_URL")]
    vendor_url: String,

    /// Base64 DER `SubjectPublicKeyInfo` of the vendor's public key.
    #[arg(long, env = "VENDOR_PUBLIC_KEY_DER_B64")]
    vendor_public_key_der_b64: String,

    /// Which payment scheme to demonstrate.
    #[arg(long, value_enum, default_value = "signature")]
    scheme: SchemeArg,

    /// Capacity to lock into the channel, smallest unit.
    #[arg(long, default_value_t = 1000)]
    amount: u64,

    /// Number of successive payments to stream.
    #[arg(long, default_value_t = 4)]
    payments: u64,

    /// Per-payment amount for the signature scheme, or the `PayWord`/
    /// `PayTree` unit value.
    #[arg(long, default_value_t = 100)]
    unit_value: u64,

    /// Existing PKCS8 PEM private key to act as the client. A fresh key is
    /// generated and used in-memory if omitted.
    #[arg(long)]
    client_key_path: Option<PathBuf>,

    /// Maximum HTTP retry attempts against the vendor.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!("Demo failed: {e}");
        std::process::exit(1);
    }
}

fn load_or_generate_client_key(path: Option<&PathBuf>) -> Result<PrivateKey, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return Ok(PrivateKey::from_pem_file(path)?);
    }
    let inner = SigningKey::random(&mut rand::rngs::OsRng);
    let pem = inner.to_pkcs8_pem(LineEnding::LF)?;
    let path = std::env::temp_dir().join(format!("tollgate-client-demo-{}.pem", uuid_like()));
    std::fs::write(&path, pem.as_bytes())?;
    let key = PrivateKey::from_pem_file(&path)?;
    let _ = std::fs::remove_file(&path);
    Ok(key)
}

fn uuid_like() -> String {
    let mut bytes = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let client_key = load_or_generate_client_key(args.client_key_path.as_ref())?;
    let client_public_key_der_b64 = client_key.public_key().der_b64().to_owned();
    tracing::info!(public_key = %client_public_key_der_b64, "Using client key");

    let issuer = IssuerClient::new(&args.issuer_url)?;
    let account = issuer.register_account(&client_public_key_der_b64).await?;
    tracing::info!(balance = account.balance, "Registered account with issuer");

    let common = OpenChannelCommon {
        client_public_key_der_b64: client_public_key_der_b64.clone(),
        vendor_public_key_der_b64: args.vendor_public_key_der_b64.clone(),
        amount: args.amount,
    };

    let scheme: ChannelScheme = args.scheme.into();

    // The commitment generated here (if any) is reused for every payment
    // below — generating a second one would announce one root at open time
    // and pay against another.
    let mut payword_channel: Option<PaywordChannel> = None;
    let mut paytree_channel: Option<PaytreeChannel> = None;

    let envelope = match scheme {
        ChannelScheme::Signature => tollgate_client::signing::sign_payload(&client_key, &common)?,
        ChannelScheme::Payword => {
            let channel = PaywordChannel::generate(args.payments.max(1), args.unit_value, 16);
            let envelope = tollgate_client::payword::build_open_envelope(&client_key, &common, &channel.open_fields())?;
            payword_channel = Some(channel);
            envelope
        }
        ChannelScheme::Paytree | ChannelScheme::PaytreeFirstOpt | ChannelScheme::PaytreeSecondOpt => {
            let channel = PaytreeChannel::generate(args.payments.max(1).saturating_sub(1), args.unit_value, scheme);
            let envelope =
                tollgate_client::paytree::build_open_envelope(&client_key, &common, &channel.open_fields(), scheme)?;
            paytree_channel = Some(channel);
            envelope
        }
    };

    let open_request = OpenChannelEnvelopeRequest {
        client_public_key_der_b64: client_public_key_der_b64.clone(),
        envelope,
    };
    let opened = issuer.open_channel(&open_request).await?;
    tracing::info!(channel_id = %opened.channel_id, scheme = ?opened.scheme, "Opened channel");

    let vendor = VendorClient::new(&args.vendor_url, args.max_retries)?;

    match scheme {
        ChannelScheme::Signature => {
            let mut cumulative = 0u64;
            for _ in 0..args.payments {
                cumulative += args.unit_value;
                let envelope = build_payment_envelope(&client_key, &opened.channel_id, cumulative)?;
                let receipt = vendor.submit_payment(scheme, &opened.channel_id, &envelope).await?;
                tracing::info!(?receipt, cumulative, "Payment accepted");
            }
        }
        ChannelScheme::Payword => {
            let channel = payword_channel.as_ref().expect("generated above for this scheme");
            for k in 1..=args.payments {
                let payment = channel.payment(&opened.channel_id, k)?;
                let envelope = tollgate_client::signing::sign_payload(&client_key, &payment)?;
                let receipt = vendor.submit_payment(scheme, &opened.channel_id, &envelope).await?;
                tracing::info!(?receipt, k, "Payment accepted");
            }
        }
        ChannelScheme::Paytree | ChannelScheme::PaytreeFirstOpt | ChannelScheme::PaytreeSecondOpt => {
            let channel = paytree_channel.as_mut().expect("generated above for this scheme");
            let max_i = args.payments.max(1).saturating_sub(1);
            for i in 0..=max_i {
                let proof = channel.payment(&opened.channel_id, i)?;
                let envelope = tollgate_client::signing::sign_payload(&client_key, &proof)?;
                let receipt = vendor.submit_payment(scheme, &opened.channel_id, &envelope).await?;
                tracing::info!(?receipt, i, "Payment accepted");
            }
        }
    }

    let closure = vendor.request_closure(scheme, &opened.channel_id).await?;
    tracing::info!(
        client_balance = closure.client_balance,
        vendor_balance = closure.vendor_balance,
        "Channel closed"
    );

    Ok(())
}
