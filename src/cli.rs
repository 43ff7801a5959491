use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the recipe corpus CSV (title, ingredients, directions, NER)
    #[arg(short = 'c', long, default_value = "recipes.csv")]
    pub corpus_file: PathBuf,

    /// Path to the per-100g nutrition table CSV
    #[arg(short = 'n', long, default_value = "nutrition.csv")]
    pub nutrition_file: PathBuf,

    /// Path to the recommendation request JSON
    #[arg(short = 'r', long)]
    pub request_file: PathBuf,

    /// Override the invocation timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
