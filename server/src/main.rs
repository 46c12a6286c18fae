use clap::{CommandFactory, FromArgMatches};
use dotenv::dotenv;
use hfserver_backends::{vllm::lenient_get_one, VllmAdapter};
use tracing::info;

use backend::{build_engine_args, select_backend};
use cli::{Args, TRUST_REMOTE_CODE};

pub mod backend;
pub mod cli;
#[cfg(test)]
pub mod tests;

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let adapter = VllmAdapter::detect();
    info!(vllm_available = adapter.vllm_available(), "Building command line");

    let command = adapter.maybe_add_vllm_cli_parser(Args::command())?;
    let matches = command.get_matches();
    let args = Args::from_arg_matches(&matches)?;

    let engine_args = build_engine_args(&args, &adapter, &matches)?;
    // only registered along with vLLM's native flags
    let trust_remote_code =
        lenient_get_one::<bool>(&matches, TRUST_REMOTE_CODE).unwrap_or_default();

    let plan = select_backend(&args, &adapter, engine_args, trust_remote_code)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);

    Ok(())
}
