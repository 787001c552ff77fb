//! # regiontrace - Main Entry Point
//!
//! Loads a call script, runs it under the tracer on a blocking worker while
//! watching for Ctrl+C, and lets the runner write the function group file.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use regiontrace::backend::spawn_printer;
use regiontrace::cli::Args;
use regiontrace::config::TraceConfig;
use regiontrace::engine::Tracer;
use regiontrace::host::Script;
use regiontrace::registry::ModuleRegistry;
use regiontrace::runner::{Outcome, Runner};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            match e.downcast_ref::<clap::Error>() {
                // Usage errors, --help and --version render themselves.
                Some(usage) => {
                    let _ = usage.print();
                }
                None => eprintln!("error: {e:#}"),
            }
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<clap::Error>() {
        Some(usage) => usage.exit_code(),
        None => EXIT_ERROR,
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::try_parse()?;
    let config = TraceConfig::from_args(&args);

    let script = match Script::from_file(&args.script) {
        Ok(script) => script,
        Err(err) => bail!("Cannot run file {} because: {err}", args.script.display()),
    };

    let (backend, stream) =
        config.build_backend().context("Failed to set up the measurement backend")?;
    let printer = stream.map(|rx| spawn_printer(rx, std::io::stdout()));

    if !args.quiet {
        eprintln!("regiontrace v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("script: {}", args.script.display());
        eprintln!("experiment: {}", config.experiment_dir.display());
        if let Some(rank) = config.rank() {
            eprintln!("rank: {rank}");
        }
    }

    let tracer = Tracer::new(backend, ModuleRegistry::new(), config.tracer_options());
    let runner = Arc::new(Runner::new(tracer));
    let stop = runner.stop_handle();

    let mut job = tokio::task::spawn_blocking({
        let runner = Arc::clone(&runner);
        let path = args.script.clone();
        let argv = args.script_argv();
        move || runner.run_script(&script, &path, &argv)
    });

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let joined = tokio::select! {
        res = &mut job => res,
        _ = &mut ctrl_c => {
            warn!("interrupt received, stopping the script");
            stop.store(true, Ordering::Release);
            job.await
        }
    };
    let result = joined.context("Script worker failed")?;

    // The runner finalized the backend, which closes the event stream.
    drop(runner);
    if let Some(printer) = printer {
        let printed = printer.join().unwrap_or(0);
        info!("printed {printed} region events");
    }

    let outcome = result.context("Script failed")?;
    if !args.quiet {
        match outcome {
            Outcome::Completed => eprintln!("completed"),
            Outcome::Exited(code) => eprintln!("script exited with status {code}"),
            Outcome::Interrupted => eprintln!("interrupted"),
        }
    }

    Ok(())
}
