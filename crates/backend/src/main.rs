//! # Dermalens Backend - Main Entry Point

use clap::Parser;
use dermalens_backend::BackendCliOptions;
use dermalens_shared::Result;

#[tokio::main]
async fn main() -> Result<()> {
    BackendCliOptions::parse().run().await
}
