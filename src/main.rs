mod app;
mod error;
mod export;
mod io;
mod markers;
mod matrix;
mod metadata;
mod palette;
mod tree;
mod ui;

use app::{AppConfig, Outcome, PhyloDashApp};
use clap::Parser;

fn main() {
    let _ = env_logger::builder().format_timestamp(None).try_init();

    let config = AppConfig::parse();
    match PhyloDashApp::run(&config) {
        Ok(Outcome::Rendered | Outcome::Warned) => {}
        Ok(Outcome::Failed) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
