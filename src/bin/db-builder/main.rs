mod args;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use db_builder::prelude::*;

use crate::args::Args;
use crate::logging::LogWriter;

fn main() -> ExitCode {
    let args = Args::parse();
    let writer = LogWriter::new(args.log_file.clone()).unwrap_or_else(|err| {
        eprintln!("failed to open log file: {err}");
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(false)
        .with_max_level(args.log_level())
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(build = %args.build_name, "build failed: {err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(), DbBuilderError> {
    let manifest = Manifest::from_path(&args.manifest)?;
    let credentials = IniCredentials::from_path(&args.credentials)?;
    let executor = BuildExecutor::new(Arc::new(TracingSink)).with_options(ExecutorOptions {
        step_timeout: args.step_timeout,
    });
    let runner = BuildRunner::new(&manifest, &credentials).with_executor(executor);

    if args.dry_run {
        let resolved = runner.resolve(&args.build_name)?;
        println!(
            "build '{}' on connection '{}' ({} at {}:{}/{})",
            resolved.build.build_name,
            resolved.profile.name,
            resolved.dialect_id,
            resolved.profile.host,
            resolved.profile.port,
            resolved.profile.schema,
        );
        for (index, step) in plan_steps(&resolved.build).iter().enumerate() {
            println!("  {}. {step}", index + 1);
        }
        return Ok(());
    }

    let summary = runner.run(&args.build_name).await?;
    println!(
        "Database built for connection {} ({} steps in {:.2?})",
        summary.connection_name, summary.steps_executed, summary.total_duration,
    );
    Ok(())
}
