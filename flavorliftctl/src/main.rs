use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = flavorliftctl::Cli::parse();
    if let Err(err) = flavorliftctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
