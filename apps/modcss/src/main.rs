use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, info};
use modcss_optimize::Config;
use std::io::{BufWriter, Write};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "modcss")]
#[command(about = "Build-time optimizations for CSS Modules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Inline class names into scripts and prune unused stylesheet rules
    Optimize(Config),
}

fn main() -> Result<()> {
    env_logger::init();

    // stdout is line buffered; batch the report writes.
    let mut stdout = BufWriter::new(std::io::stdout());

    let cli = Cli::parse();
    debug!("Parsed CLI arguments: {:?}", cli.command);

    let start = Instant::now();

    match cli.command {
        Commands::Optimize(cfg) => {
            let num_threads = rayon::current_num_threads();
            info!("Running CSS Modules optimization (using {} threads)", num_threads);
            debug!(
                "Config: root={:?}, manifest={:?}, out_dir={:?}",
                cfg.root, cfg.manifest, cfg.out_dir
            );

            let result = modcss_optimize::run_optimize(cfg)?;
            let elapsed_ms = start.elapsed().as_millis();

            if result.inlined.is_empty() && result.pruned.is_empty() && result.errors.is_empty() {
                modcss_optimize::print_nothing_to_optimize(&mut stdout, result.files_analyzed)?;
            } else {
                modcss_optimize::print_report(&mut stdout, &result)?;
            }

            writeln!(
                stdout,
                "\n{} Finished in {}ms on {} files (using {} threads).",
                "●".bright_blue(),
                elapsed_ms.to_string().cyan(),
                result.files_analyzed.to_string().cyan(),
                num_threads.to_string().cyan()
            )?;
            stdout.flush()?;

            if !result.errors.is_empty() {
                // Unparseable modules kept their stylesheets whole; fail CI
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
