//! Build an in-memory filesystem from a list of paths given on the command
//! line, attach a logging observer, then print the resulting tree.

use std::sync::Arc;

use clap::Parser;
use vfscore::{AccessMode, Envelope, Filesystem, FnSink, MemoryFilesystem, MemoryFilesystemConfig, OpenMode, ShareMode};

#[derive(Parser)]
#[command(version, about = "Populate and walk an in-memory virtual filesystem")]
struct Args {
    /// Paths to create as empty files, e.g. "docs/readme.txt".
    #[clap(required = true)]
    paths: Vec<String>,
}

fn walk(fs: &dyn Filesystem, path: &str, depth: usize) {
    let Ok(entries) = fs.browse(path) else { return };
    for entry in entries {
        println!("{}{}", "  ".repeat(depth), entry.name);
        if entry.is_directory() {
            walk(fs, &entry.path, depth + 1);
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let fs = MemoryFilesystem::new(MemoryFilesystemConfig::default());
    let sink = Arc::new(FnSink(|envelope: &Envelope| {
        log::info!("{:?}", envelope.event);
    }));
    let handle = fs.observe("**", sink, None).unwrap();

    for path in &args.paths {
        if let Some((parent, _)) = vfscore::path::split_parent(path) {
            if !parent.is_empty() {
                fs.create_directory(&parent).unwrap();
            }
        }
        drop(fs.open(path, OpenMode::OpenOrCreate, AccessMode::WRITE, ShareMode::empty()).unwrap());
    }

    walk(fs.as_ref(), "", 0);
    handle.dispose();
}
