//! `burrow images`: list images available to `run`.

use anyhow::Context;
use burrow_image::storage::ImageStore;
use burrow_runtime::engine::Engine;
use clap::Args;

use crate::output::Table;

/// Arguments for the `images` command.
#[derive(Args, Debug)]
pub struct ImagesArgs {
    /// Print image names only.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Executes the `images` command.
///
/// # Errors
///
/// Returns an error if the image directory cannot be read.
pub fn execute(engine: &Engine, args: &ImagesArgs) -> anyhow::Result<()> {
    let store = ImageStore::new(engine.config());
    let images = store.list().context("failed to list images")?;
    if args.quiet {
        for image in &images {
            println!("{image}");
        }
        return Ok(());
    }

    let mut table = Table::new(&["IMAGE", "UNPACKED"]);
    for image in images {
        let unpacked = if store.layer_path(&image).is_dir() { "yes" } else { "no" };
        table.row(vec![image, unpacked.to_string()]);
    }
    print!("{}", table.render());
    Ok(())
}
