//! Worker process entry point. Spawned by the host, one process per
//! plugin invocation; all protocol handling lives in the library.

use anyhow::Result;

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(vivarium::worker::run())
}
