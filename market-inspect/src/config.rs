//! Environment-driven configuration for `market-inspect`.
//!
//! - `RPC_URL` / `PROGRAM_ID` are required
//! - `RPC_COMMITMENT` picks the read commitment (default `confirmed`)
//! - `TOKEN_PROGRAM_ID` / `ASSOCIATED_TOKEN_PROGRAM_ID` override the SPL defaults

use anyhow::Context;
use market_sdk::ProgramIds;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    /// Solana HTTP RPC endpoint.
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    pub program_ids: ProgramIds,
}

fn env_required(key: &str) -> anyhow::Result<String> {
    env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .with_context(|| format!("Missing env var: {key}"))
}

fn env_pubkey(key: &str) -> anyhow::Result<Option<Pubkey>> {
    env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(|s| Pubkey::from_str(s.trim()).with_context(|| format!("Invalid {key}: {s}")))
        .transpose()
}

fn parse_commitment(raw: &str) -> anyhow::Result<CommitmentConfig> {
    match raw.trim().to_lowercase().as_str() {
        "processed" => Ok(CommitmentConfig::processed()),
        "confirmed" => Ok(CommitmentConfig::confirmed()),
        "finalized" => Ok(CommitmentConfig::finalized()),
        other => anyhow::bail!("Invalid RPC_COMMITMENT: {other} (expected processed|confirmed|finalized)"),
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    let rpc_url = env_required("RPC_URL")?;
    let program_id =
        Pubkey::from_str(env_required("PROGRAM_ID")?.trim()).context("Invalid PROGRAM_ID")?;
    let commitment =
        parse_commitment(&env::var("RPC_COMMITMENT").unwrap_or_else(|_| "confirmed".to_string()))?;

    let mut program_ids = ProgramIds::new(program_id);
    if let Some(token) = env_pubkey("TOKEN_PROGRAM_ID")? {
        program_ids.token = token;
    }
    if let Some(ata) = env_pubkey("ASSOCIATED_TOKEN_PROGRAM_ID")? {
        program_ids.associated_token = ata;
    }

    Ok(Config {
        rpc_url,
        commitment,
        program_ids,
    })
}
