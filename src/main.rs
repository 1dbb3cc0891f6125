use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};

use opbot::{modules, Bus, Config, Context, Event};

const NAME: &str = "opbot";

/// opbot - object store and command bus for small bots
#[derive(Parser, Debug)]
#[command(name = "opbot", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Working directory (overrides config)
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Dispatch worker count (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Run this command once instead of reading from stdin
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(workdir) = args.workdir {
        config.workdir = workdir;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    let level = if args.verbose { Level::DEBUG } else { config.level() };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::new(config);
    for module in modules::builtin() {
        ctx.scan(module);
    }
    let bus = Bus::start(Arc::clone(&ctx));

    if args.command.is_empty() {
        banner(&ctx);
        console(&bus).await?;
    } else {
        run_line(&bus, &args.command.join(" ")).await?;
    }

    bus.shutdown().await;
    for event in ctx.take_errors() {
        eprintln!("{}: {}", event.txt(), event.error().unwrap_or("unknown error"));
    }
    Ok(())
}

fn banner(ctx: &Context) {
    println!(
        "{} started at {} {}",
        NAME.to_uppercase(),
        chrono::Local::now().format("%a %b %e %H:%M:%S %Y"),
        ctx.config.to_object().printable(Some("workdir,workers"), None)
    );
}

async fn console(bus: &Bus) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        run_line(bus, &line).await?;
    }
    info!("console closed");
    Ok(())
}

async fn run_line(bus: &Bus, line: &str) -> Result<(), Box<dyn std::error::Error>> {
    let event = Arc::new(Event::new(line).with_origin("console"));
    bus.submit(Arc::clone(&event)).await?;
    match bus.context().config.reply_timeout() {
        Some(limit) => {
            if tokio::time::timeout(limit, event.wait()).await.is_err() {
                warn!(command = %event.cmd(), "no reply within timeout");
                return Ok(());
            }
        }
        None => {
            event.wait().await;
        }
    }
    for reply in event.replies() {
        println!("{}", reply);
    }
    Ok(())
}
