use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = spotify_controller::Cli::parse();

    let code = match spotify_controller::run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            log::error!(target: "cli", "Fatal error ({}): {}", e.kind(), e);
            eprintln!("Fatal error: {}", e);
            1
        }
    };

    // Exit directly: a blocked stdin read would otherwise hold up runtime shutdown.
    std::process::exit(code);
}
