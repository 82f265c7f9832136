//! unitlog - TID store administration
//!
//! ```text
//! unitlog [--env <env>] dump               # text log of every record
//! unitlog [--env <env>] state <TID>        # one record
//! unitlog [--env <env>] list [TID...]      # selected records (all if none given)
//! unitlog [--env <env>] compact            # snapshot + truncate WAL
//! unitlog [--env <env>] purge <secs>       # drop CONFIRMED records older than secs
//! unitlog [--env <env>] demo               # deliver one unit in-process
//! ```

use anyhow::{Context, bail};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use unitlog::client::{Connection, FunctionCall, LoopbackTransport, UnitAttributes};
use unitlog::config::AppConfig;
use unitlog::server::{
    DispatchAdapter, FunctionRegistry, HandlerRegistry, Params, RequestContext, RetentionWorker,
    ServerFunction, TransactionHandler,
};
use unitlog::store::{self, FileTidStore, TidStore};
use unitlog::{RcStatus, ServerHandle, Tid, UnitError};

// ============================================================
// ARGUMENTS
// ============================================================

fn get_env(args: &[String]) -> String {
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Positional arguments with `--env <value>` removed
fn positional(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip = false;
    for arg in args.iter().skip(1) {
        if skip {
            skip = false;
            continue;
        }
        if arg == "--env" || arg == "-e" {
            skip = true;
            continue;
        }
        out.push(arg.clone());
    }
    out
}

fn usage() -> &'static str {
    "usage: unitlog [--env <env>] dump | state <TID> | list [TID...] | compact | purge <max_age_secs> | demo"
}

// ============================================================
// COMMANDS
// ============================================================

fn cmd_dump(store: &dyn TidStore) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let count = store::dump_text(store, stdout.lock())?;
    tracing::info!(count, "Dumped TID records");
    Ok(())
}

fn cmd_state(store: &dyn TidStore, raw: &str) -> anyhow::Result<()> {
    let tid = Tid::parse(raw)?;
    match store.get(&tid)? {
        Some(record) => println!("{}", store::format_line(&record)),
        None => bail!("{}: {}", RcStatus::NotFound, tid),
    }
    Ok(())
}

fn cmd_list(store: &dyn TidStore, raw: &[String]) -> anyhow::Result<()> {
    let filter = raw
        .iter()
        .map(|s| Tid::parse(s))
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = io::stdout().lock();
    for record in store.list(&filter)? {
        writeln!(out, "{}", store::format_line(&record))?;
    }
    Ok(())
}

fn cmd_purge(store: Arc<dyn TidStore>, config: &AppConfig, raw: &str) -> anyhow::Result<()> {
    let secs: u64 = raw
        .parse()
        .with_context(|| format!("max_age_secs must be a number: '{}'", raw))?;
    let mut worker_config = config.retention.worker_config();
    worker_config.max_age = Duration::from_secs(secs);

    let purged = RetentionWorker::new(store, worker_config).scan_and_purge()?;
    println!("purged {} confirmed record(s)", purged);
    Ok(())
}

/// Handler set that accepts every phase and logs it
struct LoggingHandler;

impl TransactionHandler for LoggingHandler {
    fn check(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus {
        tracing::info!(handle = %handle, tid = %tid, "demo: check");
        RcStatus::Ok
    }

    fn commit(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus {
        tracing::info!(handle = %handle, tid = %tid, "demo: commit");
        RcStatus::Ok
    }

    fn rollback(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus {
        tracing::info!(handle = %handle, tid = %tid, "demo: rollback");
        RcStatus::Ok
    }

    fn confirm(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus {
        tracing::info!(handle = %handle, tid = %tid, "demo: confirm");
        RcStatus::Ok
    }
}

async fn cmd_demo(store: Arc<dyn TidStore>, config: &AppConfig) -> anyhow::Result<()> {
    let system_id = config.server.system_id.clone();

    if config.retention.enabled {
        let worker = RetentionWorker::new(Arc::clone(&store), config.retention.worker_config());
        tokio::spawn(async move {
            worker.run().await;
        });
    }

    let handlers = Arc::new(HandlerRegistry::new());
    handlers.register(system_id.clone(), Arc::new(LoggingHandler))?;

    let functions = Arc::new(FunctionRegistry::new());
    let write_to_tcpic: Arc<dyn ServerFunction> =
        Arc::new(|ctx: &RequestContext, params: Params| -> Result<Params, String> {
            tracing::info!(
                unit = ?ctx.unit.as_ref().map(|u| u.to_string()),
                lines = ?params.get("TCPICDAT"),
                "demo: STFC_WRITE_TO_TCPIC"
            );
            Ok(Params::new())
        });
    functions.add("STFC_WRITE_TO_TCPIC", write_to_tcpic)?;

    let adapter = Arc::new(DispatchAdapter::new(
        store,
        handlers,
        functions,
        config.server.confirm_policy,
    ));
    let connection = Connection::new(LoopbackTransport::new(
        adapter,
        ServerHandle::new(1, system_id),
    ));

    let mut params = Params::new();
    params.insert(
        "TCPICDAT".into(),
        serde_json::json!(["bgRFC unit", "delivered in-process"]),
    );
    let mut attributes = UnitAttributes::new();
    attributes.insert("lock".into(), serde_json::json!(1));

    let mut unit = connection.initialize_unit(true)?;
    connection
        .fill_and_submit_unit(
            &mut unit,
            vec![FunctionCall::new("STFC_WRITE_TO_TCPIC", params)],
            vec!["RFCSDK_QUEUE_IN".into()],
            attributes,
        )
        .await?;
    println!("{} submitted as {}", unit.identifier(), unit.mode());
    println!("state: {}", connection.get_unit_state(&unit).await?);

    connection.confirm_unit(&unit).await?;
    println!("{} confirmed", unit.tid);
    Ok(())
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let env = get_env(&args);
    let app_config = AppConfig::load(&env)?;
    let _log_guard = unitlog::logging::init_logging(&app_config);

    let positional = positional(&args);
    let Some(command) = positional.first() else {
        bail!(usage());
    };

    let file_store = FileTidStore::open(app_config.store.file_store())
        .with_context(|| format!("Failed to open TID store at {}", app_config.store.data_dir))?;
    let file_store = Arc::new(file_store);
    let store: Arc<dyn TidStore> = file_store.clone();
    tracing::info!(env = %env, command = %command, records = store.len()?, "unitlog starting");

    let result = match (command.as_str(), &positional[1..]) {
        ("dump", []) => cmd_dump(store.as_ref()),
        ("state", [tid]) => cmd_state(store.as_ref(), tid),
        ("list", tids) => cmd_list(store.as_ref(), tids),
        ("compact", []) => file_store
            .compact()
            .map(|n| println!("compacted {} record(s)", n))
            .map_err(Into::into),
        ("purge", [secs]) => cmd_purge(Arc::clone(&store), &app_config, secs),
        ("demo", []) => cmd_demo(Arc::clone(&store), &app_config).await,
        _ => Err(anyhow::anyhow!(usage())),
    };

    finish(result, file_store.close())
}

/// The command's own error wins; a close failure is logged and reported only
/// when the command succeeded
fn finish(result: anyhow::Result<()>, closed: Result<(), UnitError>) -> anyhow::Result<()> {
    if let Err(e) = &closed {
        tracing::error!(error = %e, "Failed to close TID store");
    }
    result?;
    closed.context("Failed to close TID store")
}
