//! simple_bank demo runner
//!
//! Seeds two accounts and drives the transfer engine concurrently:
//!
//! ```text
//! forward:     N × transfer(X → Y, amount)            X -= N·amount, Y += N·amount
//! alternating: N × transfer(X → Y | Y → X, amount)    balances unchanged for even N
//! ```
//!
//! Usage: `simple_bank [--env dev] [--backend memory|postgres] [--transfers 5] [--amount 10]`

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use simple_bank::config::{AppConfig, StoreBackend};
use simple_bank::db::Database;
use simple_bank::models::CreateAccountParams;
use simple_bank::money::{Currency, format_amount, parse_amount};
use simple_bank::random::random_owner;
use simple_bank::{
    Account, LedgerStore, MemoryLedgerStore, TransferEngine, TransferParams, TransferState,
    TxContext,
};

const SEED_BALANCE: i64 = 500;

// ============================================================
// ARGUMENTS
// ============================================================

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn get_backend_override() -> anyhow::Result<Option<StoreBackend>> {
    match get_arg(&["--backend"]).as_deref() {
        None => Ok(None),
        Some("memory") => Ok(Some(StoreBackend::Memory)),
        Some("postgres") => Ok(Some(StoreBackend::Postgres)),
        Some(other) => bail!("unknown backend: {} (expected memory or postgres)", other),
    }
}

fn get_transfers() -> anyhow::Result<usize> {
    match get_arg(&["--transfers", "-n"]) {
        Some(n) => n.parse().with_context(|| format!("invalid --transfers: {}", n)),
        None => Ok(5),
    }
}

fn get_amount() -> anyhow::Result<Decimal> {
    match get_arg(&["--amount"]) {
        Some(a) => parse_amount(&a).with_context(|| format!("invalid --amount: {}", a)),
        None => Ok(Decimal::from(10)),
    }
}

// ============================================================
// SCENARIOS
// ============================================================

#[derive(Debug, Serialize)]
struct ScenarioSummary {
    scenario: &'static str,
    attempted: usize,
    committed: usize,
    aborted: usize,
    x_balance: String,
    y_balance: String,
    elapsed_ms: u128,
}

#[derive(Debug, Clone, Copy)]
struct Scenario {
    name: &'static str,
    /// Odd-numbered transfers run Y → X
    alternate: bool,
}

async fn run_scenario(
    scenario: Scenario,
    engine: &TransferEngine,
    transfer_timeout: Option<Duration>,
    (x, y): (&Account, &Account),
    n: usize,
    amount: Decimal,
) -> anyhow::Result<ScenarioSummary> {
    let start = Instant::now();
    let mut handles = Vec::with_capacity(n);

    for i in 0..n {
        let engine = engine.clone();
        let ctx = transfer_timeout.map_or_else(TxContext::background, TxContext::with_timeout);
        let (from, to) = if scenario.alternate && i % 2 == 1 {
            (y.id, x.id)
        } else {
            (x.id, y.id)
        };
        handles.push(tokio::spawn(async move {
            engine
                .transfer_with(&ctx, TransferParams::new(from, to, amount))
                .await
        }));
    }

    let mut committed = 0;
    let mut aborted = 0;
    for handle in handles {
        let result = handle.await.context("transfer task panicked")?;
        match TransferState::of(&result) {
            TransferState::Committed => committed += 1,
            TransferState::Aborted => aborted += 1,
        }
        if let Err(e) = result {
            warn!(scenario = scenario.name, error = %e, code = e.code(), "Transfer aborted");
        }
    }

    let store = engine.store();
    let x_after = store.get_account(x.id).await?;
    let y_after = store.get_account(y.id).await?;

    Ok(ScenarioSummary {
        scenario: scenario.name,
        attempted: n,
        committed,
        aborted,
        x_balance: format_amount(x_after.balance),
        y_balance: format_amount(y_after.balance),
        elapsed_ms: start.elapsed().as_millis(),
    })
}

async fn seed_account(store: &dyn LedgerStore) -> anyhow::Result<Account> {
    let account = store
        .create_account(CreateAccountParams {
            owner: random_owner(),
            currency: Currency::Usd.to_string(),
            balance: Decimal::from(SEED_BALANCE),
        })
        .await
        .context("failed to seed account")?;
    info!(account_id = %account.id, owner = %account.owner, "Seeded account");
    Ok(account)
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            let store = match config.store.lock_timeout() {
                Some(timeout) => MemoryLedgerStore::with_lock_timeout(timeout),
                None => MemoryLedgerStore::new(),
            };
            Ok(Arc::new(store))
        }
        StoreBackend::Postgres => {
            let url = config.require_postgres_url()?;
            let db = Database::connect(url, &config.store)
                .await
                .context("failed to connect to PostgreSQL")?;
            db.health_check().await.context("PostgreSQL health check failed")?;
            db.ensure_schema().await.context("failed to apply ledger schema")?;
            Ok(Arc::new(db.ledger_store(&config.store)))
        }
    }
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env).context("failed to load config")?;
    if let Some(backend) = get_backend_override()? {
        app_config.store.backend = backend;
    }
    let _log_guard = simple_bank::logging::init_logging(&app_config);

    let n = get_transfers()?;
    let amount = get_amount()?;

    info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        profile = env!("BUILD_PROFILE"),
        backend = ?app_config.store.backend,
        transfers = n,
        amount = %amount,
        "Starting simple_bank"
    );

    let store = open_store(&app_config).await?;
    let engine = TransferEngine::new(store.clone());

    let transfer_timeout = app_config.store.transfer_timeout();

    let x = seed_account(store.as_ref()).await?;
    let y = seed_account(store.as_ref()).await?;

    let mut summaries = Vec::new();
    let scenarios = [
        Scenario {
            name: "forward",
            alternate: false,
        },
        Scenario {
            name: "alternating",
            alternate: true,
        },
    ];
    for scenario in scenarios {
        let summary = run_scenario(scenario, &engine, transfer_timeout, (&x, &y), n, amount).await?;
        info!(
            scenario = summary.scenario,
            committed = summary.committed,
            aborted = summary.aborted,
            x_balance = %summary.x_balance,
            y_balance = %summary.y_balance,
            elapsed_ms = summary.elapsed_ms as u64,
            "Scenario finished"
        );
        summaries.push(summary);
    }

    // Conservation check across both scenarios
    let x_final = store.get_account(x.id).await?;
    let y_final = store.get_account(y.id).await?;
    let total = x_final.balance + y_final.balance;
    if total != Decimal::from(2 * SEED_BALANCE) {
        error!(total = %total, "Money was created or destroyed");
        bail!("conservation violated: total balance {}", total);
    }

    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
