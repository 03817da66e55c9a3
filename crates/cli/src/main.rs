mod report;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use cubex_core::{Conversion, CubexArchive};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const USAGE: &str = "Usage: cubex <profile.cubex> [<metric> [--inclusive|--exclusive] [--json]]";

struct Args {
    path: PathBuf,
    metric: Option<String>,
    conversion: Conversion,
    json: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut positional = Vec::new();
    let (mut inclusive, mut exclusive, mut json) = (false, false, false);
    for arg in args {
        match arg.as_str() {
            "--inclusive" => inclusive = true,
            "--exclusive" => exclusive = true,
            "--json" => json = true,
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            _ => positional.push(arg),
        }
    }
    let mut positional = positional.into_iter();
    let Some(path) = positional.next() else {
        bail!(USAGE);
    };
    let metric = positional.next();
    if positional.next().is_some() {
        bail!(USAGE);
    }
    Ok(Args {
        path: PathBuf::from(path),
        metric,
        conversion: Conversion::from_flags(exclusive, inclusive)?,
        json,
    })
}

fn main() -> Result<()> {
    // Diagnostics on stderr; stdout carries the report.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("CUBEX_LOG").unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let archive = CubexArchive::open(&args.path)
        .with_context(|| format!("failed to open {}", args.path.display()))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let Some(name) = args.metric else {
        report::write_calltree(&mut out, &archive)?;
        return Ok(());
    };
    let metric = archive
        .metric_by_name(&name)
        .with_context(|| format!("no metric named `{name}`"))?;

    match archive.metric_values(metric) {
        Ok(values) if args.json => report::write_values_json(&mut out, &archive, &values, args.conversion)?,
        Ok(values) => report::write_values(&mut out, &archive, &values, args.conversion)?,
        Err(e) if e.is_missing_metric() => writeln!(out, "{e}")?,
        Err(e) => return Err(e).with_context(|| format!("failed to read metric `{name}`")),
    }
    archive.close();
    Ok(())
}
