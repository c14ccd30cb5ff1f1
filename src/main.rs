// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::EnvFilter;
use veles_core::config::consts::DEFAULT_TICKS;
use veles_core::config::{load_and_validate_config, WorkflowBuilder, WorkflowConfig};
use veles_core::utils::HostValue;

const USAGE: &str = "Usage: veles-core <workflow.yaml|workflow.toml> [--ticks N] [--backend KIND] [--set path=value]...";

/// Command line options.
#[derive(Debug, Default)]
struct Options {
    workflow: String,
    ticks: Option<u64>,
    backend: Option<String>,
    overrides: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut workflow = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} expects a value", flag))
        };
        match arg.as_str() {
            "--ticks" => {
                let raw = value("--ticks")?;
                options.ticks = Some(raw.parse().with_context(|| format!("invalid tick count '{}'", raw))?);
            }
            "--backend" => options.backend = Some(value("--backend")?),
            "--set" => options.overrides.push(value("--set")?),
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            path if workflow.is_none() => workflow = Some(path.to_string()),
            extra => bail!("unexpected argument {}", extra),
        }
    }

    options.workflow = workflow.ok_or_else(|| anyhow!("missing workflow file"))?;
    Ok(options)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(options).await {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(options: Options) -> Result<()> {
    let start_time = Instant::now();

    let mut config: WorkflowConfig = load_and_validate_config(&options.workflow)?;
    for assignment in &options.overrides {
        config
            .settings
            .apply_override(assignment)
            .with_context(|| format!("applying --set {}", assignment))?;
    }

    let mut builder = WorkflowBuilder::new();
    if let Some(kind) = &options.backend {
        builder = builder.force_backend(kind.clone());
    }
    let mut workflow = builder.build(&config)?;

    let token = workflow.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let ticks = options.ticks.or(config.ticks).unwrap_or(DEFAULT_TICKS);
    workflow.initialize().await?;
    let completed = workflow.run(ticks).await?;
    let outputs = workflow.materialize_outputs()?;
    workflow.stop().await?;

    let report = serde_json::json!({
        "workflow": options.workflow,
        "ticks": HostValue::Integer(completed as i64).to_json(),
        "outputs": outputs,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!("⏱️  Total Time: {:?}", start_time.elapsed());
    Ok(())
}
