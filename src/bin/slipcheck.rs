use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde_json::json;
use slipcheck::emvco::{promptpay, tlv};
use slipcheck::extract::calendar::normalize_slip_date;
use slipcheck::qr_decode::read_qr;
use slipcheck::{
    Checkpoint, MemoryTopupStore, RqrrDecoder, SlipResponse, SlipVerifier, TopupRequest, TopupStore,
    VerifierConfig, extract,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "slipcheck", version, about = "Read and verify PromptPay transfer slips")]
struct Cli {
    /// TOML config file (environment variables override it)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a slip image and print its payload and slip data
    Read { image: PathBuf },
    /// Parse a QR payload string
    Parse { payload: String },
    /// Check a slip image (path or data URI) against an expected amount
    Verify {
        image: String,
        #[arg(short = 'e', long = "expected")]
        expected: Decimal,
    },
    /// Print a PromptPay payload (target defaults to the configured seller id)
    Promptpay {
        target: Option<String>,
        #[arg(short = 'a', long = "amount")]
        amount: Option<Decimal>,
    },
}

fn main() -> Result<ExitCode> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = VerifierConfig::load(cli.config.as_deref()).context("loading config")?;

    match cli.command {
        Command::Read { image } => read(&config, &image),
        Command::Parse { payload } => {
            let mut slip = extract(&payload);
            slip.date_time = normalize_slip_date(&slip.date_time);
            let tags = tlv::parse(&payload).flatten();
            print_json(&json!({ "tags": tags, "slip": slip }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { image, expected } => verify(config, &image, expected),
        Command::Promptpay { target, amount } => {
            let Some(target) = target.or_else(|| config.promptpay_id.clone()) else {
                bail!("no PromptPay target given and SELLER_PROMPTPAY_ID is not set");
            };
            println!("{}", promptpay::payload(&target, amount)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read(config: &VerifierConfig, image: &Path) -> Result<ExitCode> {
    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let checkpoint = Checkpoint::with_budget(config.time_budget());
    let hit = read_qr(&bytes, &config.resize_variants, &RqrrDecoder, config.emvco_only, &checkpoint)?;
    let Some(hit) = hit else {
        print_json(&json!({ "error": "No QR code found in slip image" }))?;
        return Ok(ExitCode::FAILURE);
    };
    let mut slip = extract(&hit.payload);
    slip.date_time = normalize_slip_date(&slip.date_time);
    print_json(&json!({
        "payload": hit.payload,
        "variant": hit.variant.to_string(),
        "slip": slip,
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn verify(config: VerifierConfig, image: &str, expected: Decimal) -> Result<ExitCode> {
    let store = MemoryTopupStore::new();
    let id = store.insert(TopupRequest::pending(0, expected, "PROMPTPAY")?)?;
    let verifier = SlipVerifier::new(RqrrDecoder, store, config);

    let response = match verifier.verify_source(id, image, &verifier.checkpoint()) {
        Ok(result) => SlipResponse::from_result(&result),
        Err(e) => SlipResponse::from_error(&e),
    };
    info!(status = response.status_code(), "verification finished");
    println!("{}", response.to_json());
    Ok(if response.status_code() == 200 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
