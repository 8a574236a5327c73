use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// Install the fmt subscriber, teeing to `log` when given.
pub(crate) fn init(log: Option<&Path>, verbose: bool) -> io::Result<()> {
    let writer = match log {
        Some(path) => {
            let file = Mutex::new(File::create(path)?);
            BoxMakeWriter::new(io::stdout.and(file))
        }
        None => BoxMakeWriter::new(io::stdout),
    };
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(verbose)
        .with_max_level(level)
        .init();
    Ok(())
}
