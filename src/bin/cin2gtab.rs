use std::{env, fs, process};

use anyhow::{bail, Result};
use gtab::{cin, format::writer, pack};
use tracing::info;

// Forward converter: .cin source definition in, sorted binary table out.

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("cin2gtab: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let [input, output] = args.as_slice() else {
        bail!("usage: cin2gtab <input.cin> <output.gtab>");
    };

    let def = cin::parse_file(input)?;
    info!(
        cname = %def.cname,
        keys = def.keynames.len(),
        entries = def.entries.len(),
        "parsed table definition"
    );

    let built = pack::build(&def)?;
    info!(
        keybits = built.keybits,
        max_press = built.max_press,
        key64 = built.key64,
        "packed items"
    );

    if let Err(e) = writer::write(&built, output) {
        // Leave no partial table behind.
        let _ = fs::remove_file(output);
        return Err(e.into());
    }
    info!(path = %output, "wrote table");
    Ok(())
}
