// src/main.rs

use genedag::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("genedag error: {err:?}");
            std::process::exit(1);
        }
    }
}

/// `Ok(false)` when the pipeline ran but did not succeed.
async fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    match run(args).await? {
        None => Ok(true),
        Some(report) => {
            print!("{report}");
            Ok(report.succeeded())
        }
    }
}
