use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use handoff::alternate::task::Observer;
use handoff::config::{HandoffConfig, Runtime};
use handoff::{run_tasks, run_threads, Bridge, StopSignal, Tick};
use log::debug;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "handoff", version, about = "Native-call bridge and alternating counter")]
struct Cli {
    /// JSON config supplying defaults for every subcommand.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pass text through the native `rustdemo` call and print the answer.
    Bridge(BridgeArgs),
    /// Hand a counter back and forth between two workers.
    Alternate(AlternateArgs),
}

#[derive(Args)]
struct BridgeArgs {
    /// Manifest of the library to load.
    #[arg(long, conflicts_with = "linked")]
    manifest: Option<PathBuf>,
    /// Use the exports linked into this binary instead of loading a library.
    #[arg(long)]
    linked: bool,
    /// Platform entry to use instead of the build target.
    #[arg(long)]
    platform: Option<String>,
    input: Option<String>,
}

#[derive(Args)]
struct AlternateArgs {
    #[arg(long, conflicts_with = "forever")]
    rounds: Option<u64>,
    /// Run until interrupted.
    #[arg(long)]
    forever: bool,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_enum)]
    runtime: Option<Runtime>,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_bridge(config: &HandoffConfig, args: BridgeArgs) -> Result<()> {
    let input = args.input.unwrap_or_else(|| config.bridge.input.clone());
    let manifest = if args.linked {
        None
    } else {
        args.manifest.or_else(|| config.bridge.manifest.clone())
    };
    let platform = args.platform.or_else(|| config.bridge.platform.clone());

    let bridge = match (manifest, platform) {
        (None, _) => Bridge::linked(),
        (Some(manifest), None) => Bridge::open(&manifest)?,
        (Some(manifest), Some(platform)) => Bridge::open_with_platform(&manifest, &platform)?,
    };

    let output = bridge.call(&input)?;
    println!("{}", output);

    Ok(())
}

/// Prints one tick, ending the run once stdout can no longer be written.
fn print_tick(tick: &Tick, stop: &StopSignal) {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", tick) {
        debug!("stdout closed: {}", e);
        stop.trigger();
    }
}

fn run_alternate(config: &HandoffConfig, args: AlternateArgs) -> Result<()> {
    let mut counter = config.alternate.counter();
    if args.forever {
        counter.rounds = None;
    } else if let Some(rounds) = args.rounds {
        counter.rounds = Some(rounds);
    }
    if let Some(seed) = args.seed {
        counter.seed = seed;
    }
    let runtime = args.runtime.unwrap_or(config.alternate.runtime);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let stop = StopSignal::new();
        {
            let stop = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    debug!("interrupted");
                    stop.trigger();
                }
            });
        }

        let ticks = match runtime {
            Runtime::Thread => {
                tokio::task::spawn_blocking(move || {
                    run_threads(&counter, &stop, &|tick: &Tick| print_tick(tick, &stop))
                })
                .await
                .map_err(|e| anyhow!("counter thread failed: {}", e))??
            }
            Runtime::Task => {
                let printer_stop = stop.clone();
                let observe: Observer =
                    Arc::new(move |tick: &Tick| print_tick(tick, &printer_stop));
                run_tasks(&counter, &stop, observe).await?
            }
        };

        debug!("reported {} values", ticks.len());
        Ok::<(), anyhow::Error>(())
    })
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = cli
        .config
        .as_ref()
        .map(HandoffConfig::from_file)
        .transpose()
        .map(Option::unwrap_or_default)
        .and_then(|config| match cli.command {
            Command::Bridge(args) => run_bridge(&config, args),
            Command::Alternate(args) => run_alternate(&config, args),
        });

    if let Err(e) = result {
        eprintln!("error: {:?}", e);
        std::process::exit(1);
    }
}
