#[tokio::main]
async fn main() {
    if let Err(e) = aa55_bridge::app().await {
        // logging may not be up yet if the config was the problem
        eprintln!("Error: {:?}", e);
        std::process::exit(255);
    }
}
