use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Game script to mine
    #[arg(default_value = "assets/main.js")]
    pub input: PathBuf,
    /// Output directory for the data documents
    #[arg(default_value = "data")]
    pub output: PathBuf,
}
