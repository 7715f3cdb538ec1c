use clap::Parser;
use tracing_subscriber::EnvFilter;
use worldline::api::{Cli, Command, run_http_server, run_plan};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { port } => {
            if let Err(e) = run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Plan {
            input,
            trials,
            seed,
            save,
            name,
        } => {
            let result = tokio::task::block_in_place(|| {
                run_plan(&input, trials, seed, save.as_deref(), &name)
            });
            if let Err(e) = result {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
    }
}
