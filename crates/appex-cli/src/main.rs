use anyhow::Result;
use clap::Parser;

use appex::AppexOptions;
use appex::run_main;
use appex::{ClassOptions, FieldOptions, OutputOptions};

#[derive(Parser, Debug)]
#[command(
    name = "appex",
    about = "appex: build a structured exception and print it",
    version
)]
pub struct Cli {
    /// JSON file with camelCase exception config keys
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<String>,

    #[command(flatten)]
    class: ClassOptions,

    #[command(flatten)]
    fields: FieldOptions,

    #[command(flatten)]
    output: OutputOptions,
}

pub fn run(args: Cli) -> Result<()> {
    // Initialize tracing subscriber for logging
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let opts = AppexOptions {
        config: args.config,
        class: args.class,
        fields: args.fields,
        output: args.output,
    };

    let output = run_main(&opts)?;
    println!("{output}");
    Ok(())
}

pub fn main() -> Result<()> {
    let args = Cli::parse();
    run(args)
}
