//! Chroma-Key Background Removal CLI Tool
//!
//! Command-line interface for keying solid backdrops out of rendered images
//! with the chroma-bgremove library.

#[cfg(feature = "cli")]
use chroma_bgremove::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
