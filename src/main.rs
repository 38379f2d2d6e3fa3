use std::path::PathBuf;

use clap::Parser;
use epci_merger::{logging, merge_file};

#[derive(Parser)]
#[command(
    name = "epci-merger",
    version,
    about = "Merges commune boundaries into one polygon per EPCI"
)]
struct Cli {
    /// Path to GeoJSON file containing forms to merge
    #[arg(short = 'i', long = "input_file")]
    input_file: PathBuf,

    /// Path to save result
    #[arg(short = 'o', long = "output_file")]
    output_file: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    logging::init();

    match merge_file(&cli.input_file, &cli.output_file) {
        Ok(groups) => tracing::info!(groups, "processing completed successfully"),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
