//! `retrohost info`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use retrohost_core::{CoreHost, Frontend, NullInput, NullSink};

#[derive(Args)]
pub struct InfoArgs {
    /// Core module (.so / .dll / .dylib)
    #[arg(long)]
    pub core: PathBuf,

    /// Host configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn execute(args: InfoArgs) -> Result<()> {
    let config = crate::run::load_config(args.config.as_deref())?;
    let mut frontend = Frontend::new(
        &config,
        Box::new(NullSink::default()),
        Box::new(NullInput),
    );

    let mut host = CoreHost::load(&args.core, &mut frontend)
        .with_context(|| format!("failed to load core {}", args.core.display()))?;
    let info = host.info().clone();
    host.unload(&mut frontend);

    println!("name:          {}", info.library_name);
    println!("version:       {}", info.library_version);
    println!("extensions:    {}", info.valid_extensions.join(", "));
    println!("need_fullpath: {}", info.need_fullpath);
    println!("block_extract: {}", info.block_extract);
    Ok(())
}
