//! NovelRead Backend - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() {
    if let Err(e) = novelread_backend::run().await {
        eprintln!("novelread-backend: {}", e);
        std::process::exit(1);
    }
}
