//! `uni-nlp-prefetch`: fetch and open every model of a catalog ahead of
//! deployment.
//!
//! ```text
//! uni-nlp-prefetch <catalog.json> [--cache-dir <path>] [--dry-run]
//! ```
//!
//! Candle models are downloaded into the cache. ONNX models are opened from
//! their model directory, so a broken export shows up here instead of on the
//! first request. Every alias is attempted; the exit status is non-zero when
//! any of them failed.

use anyhow::{Context, bail};
use std::path::PathBuf;
use std::process;
use uni_nlp::api::{ModelAliasSpec, WarmupPolicy, catalog_from_file};
use uni_nlp::cache::{CACHE_ROOT_ENV, resolve_cache_dir, resolve_model_dir};
use uni_nlp::runtime::{ModelRuntime, ModelRuntimeBuilder};

const USAGE: &str = "\
Usage: uni-nlp-prefetch <catalog.json> [OPTIONS]

Options:
  --cache-dir <path>  Cache root (default: $UNI_NLP_CACHE_DIR or .uni_nlp_cache)
  --dry-run           Print where each model would be stored, fetch nothing
  -h, --help          Show this message";

#[derive(Debug, Default)]
struct Args {
    catalog: PathBuf,
    cache_dir: Option<String>,
    dry_run: bool,
}

enum Parsed {
    Run(Args),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Parsed> {
    let mut parsed = Args::default();
    let mut catalog = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parsed::Help),
            "--dry-run" => parsed.dry_run = true,
            "--cache-dir" => {
                parsed.cache_dir = Some(args.next().context("--cache-dir requires a path")?);
            }
            flag if flag.starts_with('-') => bail!("Unknown option: {flag}"),
            _ if catalog.is_some() => bail!("Unexpected argument: {arg}"),
            _ => catalog = Some(PathBuf::from(arg)),
        }
    }
    parsed.catalog = catalog.context("Missing required argument: <catalog.json>")?;
    Ok(Parsed::Run(parsed))
}

#[tokio::main]
async fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Parsed::Run(args)) => args,
        Ok(Parsed::Help) => {
            println!("{USAGE}");
            return;
        }
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            process::exit(2);
        }
    };
    match run(args).await {
        Ok(0) => {}
        Ok(failed) => {
            eprintln!("\n{failed} model(s) failed to prefetch");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

fn storage_path(spec: &ModelAliasSpec) -> PathBuf {
    let provider = spec.provider_id.trim_start_matches("local/");
    if provider == "onnx" {
        resolve_model_dir(provider, &spec.model_id, &spec.options)
    } else {
        resolve_cache_dir(provider, &spec.model_id, &spec.options)
    }
}

fn compiled_in(provider_id: &str) -> bool {
    match provider_id {
        "local/candle" => cfg!(feature = "provider-candle"),
        "local/onnx" => cfg!(feature = "provider-onnx"),
        _ => false,
    }
}

#[allow(unused_mut, unused_variables)]
fn with_providers(mut builder: ModelRuntimeBuilder, specs: &[ModelAliasSpec]) -> ModelRuntimeBuilder {
    let wants = |id: &str| specs.iter().any(|s| s.provider_id == id);
    #[cfg(feature = "provider-candle")]
    {
        if wants("local/candle") {
            builder = builder.register_provider(uni_nlp::provider::LocalCandleProvider::new());
        }
    }
    #[cfg(feature = "provider-onnx")]
    {
        if wants("local/onnx") {
            builder = builder.register_provider(uni_nlp::provider::LocalOnnxProvider::new());
        }
    }
    builder
}

/// Number of aliases that failed.
async fn run(args: Args) -> anyhow::Result<usize> {
    if let Some(dir) = &args.cache_dir {
        // SAFETY: no other threads read the environment yet.
        unsafe { std::env::set_var(CACHE_ROOT_ENV, dir) };
    }
    let root = std::env::var(CACHE_ROOT_ENV).unwrap_or_else(|_| ".uni_nlp_cache".to_string());
    println!("cache root : {root}");

    let specs = catalog_from_file(&args.catalog)
        .with_context(|| format!("Failed to load catalog '{}'", args.catalog.display()))?;
    println!("catalog    : {} model(s)\n", specs.len());

    if args.dry_run {
        for spec in &specs {
            println!("  {}  ({})  ->  {}", spec.alias, spec.model_id, storage_path(spec).display());
        }
        return Ok(0);
    }

    let (usable, skipped): (Vec<_>, Vec<_>) =
        specs.into_iter().partition(|s| compiled_in(&s.provider_id));
    for spec in &skipped {
        println!("  skip  {}  ({} not available in this build)", spec.alias, spec.provider_id);
    }
    if usable.is_empty() {
        println!("Nothing to prefetch.");
        return Ok(0);
    }

    let aliases: Vec<String> = usable.iter().map(|s| s.alias.clone()).collect();
    let builder = with_providers(ModelRuntime::builder(), &usable);
    let catalog = usable
        .into_iter()
        .map(|mut spec| {
            spec.warmup = WarmupPolicy::Lazy;
            spec
        })
        .collect();
    let runtime = builder.catalog(catalog).build().await?;

    let mut failed = 0;
    for alias in &aliases {
        match runtime.prefetch(&[alias.as_str()]).await {
            Ok(()) => println!("  ok    {alias}"),
            Err(e) => {
                failed += 1;
                println!("  FAIL  {alias}: {e}");
            }
        }
    }
    Ok(failed)
}
