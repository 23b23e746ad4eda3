//! Binary entry point; all logic lives in [`loadgen::cli`].

use anyhow::Result;

fn main() -> Result<()> {
    loadgen::cli::execute()
}
