use anyhow::{anyhow, Context, Result};
use script_host::cli::CliOverrides;
use script_host::hostfxr::HostFxr;
use script_host::runtime::RuntimeContext;
use script_host::ScriptingConfig;
use std::env;
use std::path::PathBuf;

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("[hostfxr-probe] error: {err:?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let opts = ProbeOptions::parse()?;
    script_host::init_logging(if opts.verbose { "debug" } else { "info" });

    let overrides = CliOverrides::parse(opts.passthrough)?;
    let mut config = match overrides.config_path() {
        Some(path) => ScriptingConfig::load(path)?,
        None => ScriptingConfig::default(),
    };
    config.apply_overrides(&overrides.into_config_overrides());

    let locator = config.locator();
    println!("[hostfxr-probe] candidate dotnet roots:");
    for root in locator.candidate_roots() {
        let marker = if root.is_dir() { "present" } else { "missing" };
        println!("  {} ({marker})", root.display());
    }

    let path = locator.locate()?;
    println!("[hostfxr-probe] hostfxr: {}", path.display());
    let fxr = HostFxr::load(&path)?;
    println!("[hostfxr-probe] required exports resolved");

    let Some(runtime_config) = opts.init else {
        return Ok(());
    };
    let runtime_config = config.resolve_path(&runtime_config);
    if !runtime_config.is_file() {
        return Err(anyhow!("runtime config '{}' not found", runtime_config.display()));
    }
    let mut context = RuntimeContext::initialize(&fxr, &runtime_config)
        .with_context(|| format!("initializing runtime from {}", runtime_config.display()))?;
    context.load_assembly_delegate(&fxr).context("requesting load-assembly delegate")?;
    println!("[hostfxr-probe] runtime context initialized; load-assembly delegate available");
    match context.close() {
        Some(status) => println!("[hostfxr-probe] context closed (status {status:#010x})"),
        None => println!("[hostfxr-probe] context was already closed"),
    }
    Ok(())
}

struct ProbeOptions {
    init: Option<PathBuf>,
    verbose: bool,
    passthrough: Vec<String>,
}

impl ProbeOptions {
    fn parse() -> Result<Self> {
        let mut init = None;
        let mut verbose = false;
        let mut passthrough = vec!["hostfxr_probe".to_string()];
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--init" => {
                    let value = args.next().ok_or_else(|| anyhow!("--init requires a runtimeconfig path"))?;
                    init = Some(PathBuf::from(value));
                }
                "--verbose" | "-v" => verbose = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => passthrough.push(arg),
            }
        }
        Ok(Self { init, verbose, passthrough })
    }
}

fn print_usage() {
    println!(
        "Usage: hostfxr_probe [--config <scripting.json>] [--hostfxr <path>] [--dotnet-root <dir>] \
         [--init <runtimeconfig.json>] [--verbose]"
    );
}
