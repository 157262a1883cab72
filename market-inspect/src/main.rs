//! market-inspect: derive marketplace addresses and read program state.
//!
//! Usage:
//!   market-inspect pda <kind> [args...]
//!   market-inspect account <kind|auto> <address>
//!   market-inspect vault
//!   market-inspect depositor <wallet>
//!   market-inspect merchant <wallet>
//!   market-inspect keyword <keyword> [product_id]
//!   market-inspect range <price|sales> <lo> <hi>
//!   market-inspect best-sellers <lo> <hi> [k]
//!   market-inspect tree <price|sales>
//!
//! Output is JSON on stdout; logs go to stderr.

mod config;
mod view;

use anyhow::Context;
use market_sdk::catalog::{self, range_index};
use market_sdk::pda::{self, ProgramIds};
use market_sdk::state::{
    self, GlobalIdRoot, IdChunk, KeywordRoot, KeywordShard, MerchantIdAccount, PriceIndexNode,
    SalesIndexNode, Vault, VaultDepositor,
};
use market_sdk::{decode_account, vault, AccountSource, RpcSource, WorkingSet};
use serde_json::{json, Value};
use solana_client::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

const USAGE: &str = "Usage:
  market-inspect pda <kind> [args...]
  market-inspect account <kind|auto> <address>
  market-inspect vault
  market-inspect depositor <wallet>
  market-inspect merchant <wallet>
  market-inspect keyword <keyword> [product_id]
  market-inspect range <price|sales> <lo> <hi>
  market-inspect best-sellers <lo> <hi> [k]
  market-inspect tree <price|sales>

pda kinds: merchant-info <merchant> | system-config | global-id-root | merchant-id <merchant>
  | id-chunk <merchant_id> <chunk_index> | keyword-root <keyword> | keyword-shard <keyword> <index>
  | price-index <range_start> | sales-index <range_start> | deposit-escrow | vault
  | vault-depositor <wallet> | vault-token-account | governance-config | proposal <id>
  | ata <owner> <mint>";

const KEYWORD_PAGE: usize = 50;
const DEFAULT_BEST_SELLERS: usize = 10;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,market_sdk=debug,market_inspect=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args[0] == "-h" || args[0] == "--help" {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let cfg = config::load_config()?;
    let out = if args[0] == "pda" {
        let (address, bump) = derive(&cfg.program_ids, &args[1..])?;
        json!({ "address": address.to_string(), "bump": bump })
    } else {
        info!(
            "connecting (rpc_url={}, program_id={}, commitment={:?})",
            cfg.rpc_url, cfg.program_ids.marketplace, cfg.commitment.commitment
        );
        let source = RpcSource::new(RpcClient::new_with_commitment(
            cfg.rpc_url.clone(),
            cfg.commitment,
        ));
        run(&source, &cfg.program_ids, &args)?
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn arg<'a>(args: &'a [String], i: usize, what: &str) -> anyhow::Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .with_context(|| format!("missing argument: {what}\n\n{USAGE}"))
}

fn pubkey_arg(args: &[String], i: usize, what: &str) -> anyhow::Result<Pubkey> {
    let raw = arg(args, i, what)?;
    Pubkey::from_str(raw).with_context(|| format!("invalid {what}: {raw}"))
}

fn num_arg<T: FromStr>(args: &[String], i: usize, what: &str) -> anyhow::Result<T> {
    let raw = arg(args, i, what)?;
    raw.parse()
        .map_err(|_| anyhow::anyhow!("invalid {what}: {raw}"))
}

/// Resolve `pda <kind> [args...]`. The associated token address has no bump.
fn derive(ids: &ProgramIds, args: &[String]) -> anyhow::Result<(Pubkey, Option<u8>)> {
    let pid = &ids.marketplace;
    let kind = arg(args, 0, "pda kind")?;
    let found = match kind {
        "merchant-info" => pda::merchant_info_pda(pid, &pubkey_arg(args, 1, "merchant")?)?,
        "system-config" => pda::system_config_pda(pid)?,
        "global-id-root" => pda::global_id_root_pda(pid)?,
        "merchant-id" => pda::merchant_id_pda(pid, &pubkey_arg(args, 1, "merchant")?)?,
        "id-chunk" => pda::id_chunk_pda(
            pid,
            num_arg(args, 1, "merchant_id")?,
            num_arg(args, 2, "chunk_index")?,
        )?,
        "keyword-root" => pda::keyword_root_pda(pid, arg(args, 1, "keyword")?)?,
        "keyword-shard" => pda::keyword_shard_pda(
            pid,
            arg(args, 1, "keyword")?,
            num_arg(args, 2, "shard_index")?,
        )?,
        "price-index" => pda::price_index_pda(pid, num_arg(args, 1, "range_start")?)?,
        "sales-index" => pda::sales_index_pda(pid, num_arg(args, 1, "range_start")?)?,
        "deposit-escrow" => pda::deposit_escrow_pda(pid)?,
        "vault" => pda::vault_pda(pid)?,
        "vault-depositor" => {
            let (vault, _) = pda::vault_pda(pid)?;
            pda::vault_depositor_pda(pid, &vault, &pubkey_arg(args, 1, "wallet")?)?
        }
        "vault-token-account" => {
            let (vault, _) = pda::vault_pda(pid)?;
            pda::vault_token_account_pda(pid, &vault)?
        }
        "governance-config" => pda::governance_config_pda(pid)?,
        "proposal" => pda::proposal_pda(pid, num_arg(args, 1, "proposal_id")?)?,
        "ata" => {
            let owner = pubkey_arg(args, 1, "owner")?;
            let mint = pubkey_arg(args, 2, "mint")?;
            return Ok((pda::associated_token_address(ids, &owner, &mint)?, None));
        }
        other => anyhow::bail!("unknown pda kind: {other}\n\n{USAGE}"),
    };
    Ok((found.0, Some(found.1)))
}

/// Decode `data` as `kind` (a layout name or its kebab-case alias) and render it.
fn render_account(kind: &str, data: &[u8]) -> anyhow::Result<Value> {
    let kind = if kind == "auto" {
        state::account_kind(data)?.context("unknown account discriminator")?
    } else {
        kind
    };
    let norm: String = kind
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_lowercase();
    let value = match norm.as_str() {
        "globalidroot" => {
            serde_json::to_value(view::GlobalIdRootView::from(&decode_account::<GlobalIdRoot>(data)?))?
        }
        "merchantid" | "merchantidaccount" => serde_json::to_value(view::MerchantIdView::from(
            &decode_account::<MerchantIdAccount>(data)?,
        ))?,
        "idchunk" => serde_json::to_value(view::IdChunkView::from(&decode_account::<IdChunk>(data)?))?,
        "keywordroot" => {
            serde_json::to_value(view::KeywordRootView::from(&decode_account::<KeywordRoot>(data)?))?
        }
        "keywordshard" => serde_json::to_value(view::KeywordShardView::from(
            &decode_account::<KeywordShard>(data)?,
        ))?,
        "pricenode" | "priceindexnode" => serde_json::to_value(view::RangeNodeView::from(
            &decode_account::<PriceIndexNode>(data)?,
        ))?,
        "salesnode" | "salesindexnode" => serde_json::to_value(view::RangeNodeView::from(
            &decode_account::<SalesIndexNode>(data)?,
        ))?,
        "vault" => serde_json::to_value(view::VaultView::from(&decode_account::<Vault>(data)?))?,
        "depositor" | "vaultdepositor" => serde_json::to_value(view::DepositorView::from(
            &decode_account::<VaultDepositor>(data)?,
        ))?,
        _ => anyhow::bail!("unknown account kind: {kind}"),
    };
    Ok(json!({ "kind": kind, "data": value }))
}

fn tree_kind(args: &[String], i: usize) -> anyhow::Result<bool> {
    match arg(args, i, "tree (price|sales)")? {
        "price" => Ok(false),
        "sales" => Ok(true),
        other => anyhow::bail!("unknown tree: {other} (expected price|sales)"),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn run<S: AccountSource>(source: &S, ids: &ProgramIds, args: &[String]) -> anyhow::Result<Value> {
    let pid = &ids.marketplace;
    let mut ws = WorkingSet::new(source);
    let cmd = arg(args, 0, "command")?;
    let out = match cmd {
        "account" => {
            let kind = arg(args, 1, "account kind")?;
            let address = pubkey_arg(args, 2, "address")?;
            let data = source
                .get_account_data(&address)?
                .with_context(|| format!("account {address} not found"))?;
            let mut rendered = render_account(kind, &data)?;
            rendered["address"] = json!(address.to_string());
            rendered
        }
        "vault" => {
            let (address, _) = pda::vault_pda(pid)?;
            let v: Vault = ws.require(&address)?;
            json!({
                "address": address.to_string(),
                "vault": view::VaultView::from(&v),
                "needs_rebase": vault::needs_rebase(&v),
            })
        }
        "depositor" => {
            let wallet = pubkey_arg(args, 1, "wallet")?;
            let position = vault::load_position(&mut ws, pid, &wallet)?;
            let d = position
                .depositor
                .with_context(|| format!("{wallet} has no vault position"))?;
            let pending = vault::pending_rewards(&position.vault, &d)?;
            let req = &d.unstake_request;
            let unlock_at = req
                .is_pending()
                .then(|| req.request_time.saturating_add(position.vault.unstake_lockup_period));
            json!({
                "address": position.depositor_address.to_string(),
                "depositor": view::DepositorView::from(&d),
                "pending_rewards": pending,
                "rebases_behind": position.vault.rebase_version.saturating_sub(d.last_rebase_version),
                "unlock_at": unlock_at,
                "withdrawable": unlock_at.map(|t| unix_now() >= t),
            })
        }
        "merchant" => {
            let merchant = pubkey_arg(args, 1, "merchant")?;
            let (address, _) = pda::merchant_id_pda(pid, &merchant)?;
            let account: MerchantIdAccount = ws.require(&address)?;
            let util = catalog::chunk_utilization(&mut ws, pid, &merchant)?;
            json!({
                "address": address.to_string(),
                "merchant_info": pda::merchant_info_pda(pid, &merchant)?.0.to_string(),
                "account": view::MerchantIdView::from(&account),
                "active_chunk": {
                    "chunk_index": util.chunk_index,
                    "used": util.used,
                    "capacity": util.capacity,
                    "utilization": util.rate(),
                },
                "retired_chunks": util.retired_chunks,
            })
        }
        "keyword" => {
            let keyword = arg(args, 1, "keyword")?;
            let (address, _) = pda::keyword_root_pda(pid, keyword)?;
            let root = ws
                .load::<KeywordRoot>(&address)?
                .map(|r| view::KeywordRootView::from(&r));
            match args.get(2) {
                Some(_) => {
                    let product_id: u64 = num_arg(args, 2, "product_id")?;
                    json!({
                        "address": address.to_string(),
                        "root": root,
                        "product_id": product_id,
                        "may_contain": catalog::may_contain(&mut ws, pid, keyword, product_id)?,
                    })
                }
                None => json!({
                    "address": address.to_string(),
                    "root": root,
                    "products": catalog::list_products(&mut ws, pid, keyword, 0, KEYWORD_PAGE)?,
                }),
            }
        }
        "range" => {
            let sales = tree_kind(args, 1)?;
            let lo: u64 = num_arg(args, 2, "lo")?;
            let hi: u64 = num_arg(args, 3, "hi")?;
            let entries = if sales {
                range_index::query_range::<SalesIndexNode, _>(&mut ws, pid, lo, hi)?
            } else {
                range_index::query_range::<PriceIndexNode, _>(&mut ws, pid, lo, hi)?
            };
            let entries: Vec<view::EntryView> = entries.iter().map(view::EntryView::from).collect();
            json!({ "lo": lo, "hi": hi, "entries": entries })
        }
        "best-sellers" => {
            let lo: u64 = num_arg(args, 1, "lo")?;
            let hi: u64 = num_arg(args, 2, "hi")?;
            let k = match args.get(3) {
                Some(_) => num_arg(args, 3, "k")?,
                None => DEFAULT_BEST_SELLERS,
            };
            let best: Vec<Value> = range_index::best_sellers(&mut ws, pid, lo, hi, k)?
                .iter()
                .map(|b| {
                    json!({
                        "product_id": b.product_id,
                        "sales": b.sales,
                        "detail": b.detail.as_ref().map(view::SalesView::from),
                    })
                })
                .collect();
            json!({ "lo": lo, "hi": hi, "best_sellers": best })
        }
        "tree" => {
            let stats = if tree_kind(args, 1)? {
                range_index::validate::<SalesIndexNode, _>(&mut ws, pid)?
            } else {
                range_index::validate::<PriceIndexNode, _>(&mut ws, pid)?
            };
            json!({ "nodes": stats.nodes, "entries": stats.entries, "height": stats.height })
        }
        other => anyhow::bail!("unknown command: {other}\n\n{USAGE}"),
    };
    // Reads only; a moved snapshot means the output mixes two slots.
    if let Err(e) = ws.ensure_fresh() {
        tracing::warn!(error = %e, "state changed while reading; output may be inconsistent");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_sdk::catalog::RootParams;
    use market_sdk::{encode_account, MemoryStore};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pda_kinds_match_the_sdk() {
        let ids = ProgramIds::new(Pubkey::new_unique());
        let pid = ids.marketplace;
        let (addr, bump) = derive(&ids, &args(&["id-chunk", "7", "2"])).unwrap();
        assert_eq!((addr, bump), {
            let (a, b) = pda::id_chunk_pda(&pid, 7, 2).unwrap();
            (a, Some(b))
        });
        let (addr, _) = derive(&ids, &args(&["keyword-shard", "lamp", "0"])).unwrap();
        assert_eq!(addr, pda::keyword_shard_pda(&pid, "lamp", 0).unwrap().0);

        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let (ata, bump) = derive(&ids, &args(&["ata", &owner.to_string(), &mint.to_string()])).unwrap();
        assert!(bump.is_none());
        assert_eq!(ata, pda::associated_token_address(&ids, &owner, &mint).unwrap());

        assert!(derive(&ids, &args(&["id-chunk", "x", "2"])).is_err());
        assert!(derive(&ids, &args(&["proposal"])).is_err());
        assert!(derive(&ids, &args(&["nope"])).is_err());
    }

    #[test]
    fn accounts_render_by_alias_or_discriminator() {
        let node = SalesIndexNode {
            range_start: 0,
            range_end: u64::MAX,
            entries: Vec::new(),
            top_items: Vec::new(),
            left_child: None,
            right_child: None,
            parent: None,
            height: 1,
            bump: 9,
        };
        let data = encode_account(&node);
        let auto = render_account("auto", &data).unwrap();
        assert_eq!(auto["kind"], "SalesIndexNode");
        assert_eq!(auto["data"]["bump"], 9);
        let alias = render_account("sales-node", &data).unwrap();
        assert_eq!(alias["data"], auto["data"]);
        assert!(render_account("vault", &data).is_err());
        assert!(render_account("whatever", &data).is_err());
    }

    #[test]
    fn merchant_and_keyword_reports_read_through_a_store() {
        let ids = ProgramIds::new(Pubkey::new_unique());
        let pid = ids.marketplace;
        let merchant = Pubkey::new_unique();
        let mut store = MemoryStore::new();
        store
            .transact(|ws| {
                catalog::initialize_global_root(ws, &pid, RootParams::default())?;
                catalog::register_merchant(ws, &pid, &merchant)?;
                let id = catalog::allocate_id(ws, &pid, &merchant)?;
                catalog::index_product(ws, &pid, "lamp", id)
            })
            .unwrap();

        let out = run(&store, &ids, &args(&["merchant", &merchant.to_string()])).unwrap();
        assert_eq!(out["active_chunk"]["used"], 1);
        assert_eq!(out["retired_chunks"], 0);

        let out = run(&store, &ids, &args(&["keyword", "lamp"])).unwrap();
        assert_eq!(out["root"]["total_products"], 1);
        assert_eq!(out["products"].as_array().unwrap().len(), 1);

        let listed = out["products"][0].as_u64().unwrap();
        let out = run(&store, &ids, &args(&["keyword", "lamp", &listed.to_string()])).unwrap();
        assert_eq!(out["may_contain"], true);

        let out = run(&store, &ids, &args(&["keyword", "desk"])).unwrap();
        assert!(out["root"].is_null());
        assert!(run(&store, &ids, &args(&["vault"])).is_err());
    }
}
