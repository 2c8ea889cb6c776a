//! version command - Show library and manifest schema versions

use super::Context;
use crate::assembly::schema::{ASSEMBLY_VERSION, LIBRARY_NAME, LIBRARY_VERSION};
use anyhow::Result;

pub fn version(ctx: &Context) -> Result<()> {
    if ctx.quiet {
        println!("{LIBRARY_VERSION}");
    } else {
        println!("{LIBRARY_NAME} {LIBRARY_VERSION}");
        println!("cloud assembly schema {ASSEMBLY_VERSION}");
    }
    Ok(())
}
