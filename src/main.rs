//! cash-desk CLI
//!
//! Replay operation streams against a fresh desk and inspect the books.
//!
//! # Usage
//!
//! ```bash
//! # Replay operations and print balances and profit
//! cash-desk replay --input ops.json
//!
//! # Output as JSON, with a custom asset layout
//! cash-desk replay --input ops.json --format json --config desk.json
//!
//! # Generate a random but valid operation stream
//! cash-desk generate --operations 500 --output ops.json
//! ```

use cash_desk_engine::config::EngineConfig;
use cash_desk_engine::core::scope::ScopeId;
use cash_desk_engine::engine::service::CashDeskEngine;
use cash_desk_engine::ledger::lots::{FiatLot, LotSource};
use cash_desk_engine::reporting::summary::ProfitSummary;
use cash_desk_engine::simulation::{generate_operation_stream, replay, OperationFile, StreamConfig};
use std::fs;
use std::process;

fn print_usage() {
    eprintln!(
        r#"cash-desk: FIFO cost-basis accounting for an exchange cash desk

USAGE:
    cash-desk <COMMAND> [OPTIONS]

COMMANDS:
    replay      Replay an operation file against an empty desk
    generate    Generate a random operation stream (for testing)
    help        Show this message

OPTIONS (replay):
    --input <FILE>      Path to JSON operations file
    --format <FORMAT>   Output format: text (default) or json
    --config <FILE>     Engine config (default: $CASH_DESK_CONFIG or built-in)

OPTIONS (generate):
    --operations <N>    Number of operations (default: 100)
    --seed <N>          Random seed (default: 42)
    --output <FILE>     Write to file instead of stdout

EXAMPLES:
    cash-desk replay --input ops.json
    cash-desk replay --input ops.json --format json
    cash-desk generate --operations 500 --seed 7 --output ops.json"#
    );
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

/// Value following a flag, or exit.
fn flag_value(args: &[String], i: usize, flag: &str, what: &str) -> String {
    args.get(i)
        .cloned()
        .unwrap_or_else(|| fail(format!("{} requires {}", flag, what)))
}

fn load_config(path: Option<&str>) -> EngineConfig {
    let result = match path {
        Some(path) => EngineConfig::from_file(path),
        None => EngineConfig::from_env(),
    };
    result.unwrap_or_else(|e| fail(e))
}

fn load_operations(path: &str) -> OperationFile {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("cannot read '{}': {}", path, e)));

    serde_json::from_str(&content).unwrap_or_else(|e| {
        eprintln!("Error parsing JSON: {}", e);
        eprintln!("Expected format:");
        eprintln!(
            r#"{{
  "operations": [
    {{ "op": "deposit", "asset": "USDT", "amount": "1000" }},
    {{ "op": "exchange", "kind": "fiat_to_settlement", "from": "CZK", "to": "USDT", "amount": "2100", "rate": "21" }}
  ]
}}"#
        );
        process::exit(1);
    })
}

#[derive(serde::Serialize)]
struct ReplayOutput {
    applied: usize,
    rejected: Vec<RejectionOutput>,
    balances: Vec<BalanceOutput>,
    open_lots: Vec<FiatLot>,
    summaries: Vec<ProfitSummary>,
}

#[derive(serde::Serialize)]
struct RejectionOutput {
    index: usize,
    error: String,
}

#[derive(serde::Serialize)]
struct BalanceOutput {
    asset: String,
    balance: String,
}

fn cmd_replay(args: &[String]) {
    let mut input_path = None;
    let mut config_path = None;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input_path = Some(flag_value(args, i, "--input", "a file path"));
            }
            "--config" => {
                i += 1;
                config_path = Some(flag_value(args, i, "--config", "a file path"));
            }
            "--format" => {
                i += 1;
                format = flag_value(args, i, "--format", "'text' or 'json'");
            }
            _ => fail(format!("unknown option: {}", args[i])),
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| fail("--input <FILE> is required"));
    let config = load_config(config_path.as_deref());
    let fiat = config.registry().fiat_assets();
    let file = load_operations(&path);

    let engine = CashDeskEngine::new(config).unwrap_or_else(|e| fail(e));
    let scope = ScopeId::new("cli", "replay");
    let report = replay(&engine, &scope, &file.operations);

    let balances = engine.balances(&scope).unwrap_or_else(|e| fail(e));
    let open_lots: Vec<FiatLot> = engine
        .lots(&scope, None)
        .unwrap_or_else(|e| fail(e))
        .into_iter()
        .filter(FiatLot::is_open)
        .collect();
    let summaries: Vec<ProfitSummary> = fiat
        .iter()
        .map(|currency| {
            engine
                .profit_summary(&scope, currency)
                .unwrap_or_else(|e| fail(e))
        })
        .collect();

    if format == "json" {
        let output = ReplayOutput {
            applied: report.applied,
            rejected: report
                .rejected
                .iter()
                .map(|(index, error)| RejectionOutput {
                    index: *index,
                    error: error.clone(),
                })
                .collect(),
            balances: balances
                .iter()
                .map(|(asset, balance)| BalanceOutput {
                    asset: asset.to_string(),
                    balance: balance.to_string(),
                })
                .collect(),
            open_lots,
            summaries,
        };
        let json = serde_json::to_string_pretty(&output).unwrap_or_else(|e| fail(e));
        println!("{}", json);
    } else {
        println!(
            "Applied {} operations, rejected {}",
            report.applied,
            report.rejected.len()
        );
        for (index, error) in &report.rejected {
            println!("  #{}: {}", index, error);
        }

        println!("\n=== Balances ===");
        for (asset, balance) in &balances {
            println!("  {:<6} {}", asset, balance);
        }

        println!("\n=== Open Lots ===");
        for lot in &open_lots {
            let source = match lot.source {
                LotSource::DirectPurchase => "direct",
                LotSource::ChainedExchange => "chained",
            };
            println!(
                "  #{:<4} {:<6} {:>14} / {:<14} rate {:<12} {}",
                lot.sequence, lot.currency, lot.remaining, lot.original, lot.rate.round_dp(5), source
            );
        }
        for summary in &summaries {
            println!();
            print!("{}", summary);
        }
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = StreamConfig::default();
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--operations" => {
                i += 1;
                config.operation_count = flag_value(args, i, "--operations", "a number")
                    .parse()
                    .unwrap_or_else(|_| fail("--operations requires a number"));
            }
            "--seed" => {
                i += 1;
                config.seed = flag_value(args, i, "--seed", "a number")
                    .parse()
                    .unwrap_or_else(|_| fail("--seed requires a number"));
            }
            "--output" => {
                i += 1;
                output_path = Some(flag_value(args, i, "--output", "a file path"));
            }
            _ => fail(format!("unknown option: {}", args[i])),
        }
        i += 1;
    }

    let engine_config = EngineConfig::from_env().unwrap_or_else(|e| fail(e));
    let operations =
        generate_operation_stream(&engine_config, &config).unwrap_or_else(|e| fail(e));
    let count = operations.len();
    let json = serde_json::to_string_pretty(&OperationFile { operations })
        .unwrap_or_else(|e| fail(e));

    if let Some(path) = output_path {
        fs::write(&path, &json)
            .unwrap_or_else(|e| fail(format!("cannot write '{}': {}", path, e)));
        eprintln!("Generated {} operations → {}", count, path);
    } else {
        println!("{}", json);
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "replay" => cmd_replay(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
