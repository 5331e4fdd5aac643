use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use vanegateway::Gateway;

#[derive(Parser)]
#[command(name = "vanegateway", about = "A reverse proxy programmed in the vane language")]
struct Args {
	/// Path to the configuration file.
	#[arg(short, long, default_value = "/etc/vanegateway/config.vane")]
	config: PathBuf,
}

fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();
	let args = Args::parse();
	let file = File::open(&args.config)
		.with_context(|| format!("open config {}", args.config.display()))?;
	let stmts = vane::parse(BufReader::new(file)).context("parse config")?;

	let runtime = tokio::runtime::Runtime::new().context("build runtime")?;
	let ctx = vane::Context::new();
	let gateway = Gateway::new(runtime.handle().clone());
	gateway.register(&ctx);

	// Each top-level statement gets its own thread and child scope, so
	// several listeners can serve side by side.
	let workers: Vec<_> = stmts
		.into_iter()
		.map(|stmt| {
			let scope = ctx.fork();
			std::thread::spawn(move || {
				if let Err(e) = stmt.execute(&scope) {
					error!("evaluate configuration: {e}");
				}
			})
		})
		.collect();
	for worker in workers {
		let _ = worker.join();
	}
	Ok(())
}
