use std::{
    env,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    process,
};

use gtab::format::reader::{self, LoadedTable};

// Reverse converter: binary table in (v2 or legacy), .cin source out.
// With -b the tool prints a machine-readable status line on stdout:
// status:keybits:max_press:entry_count, status 0 meaning success.

const STATUS_USAGE: i32 = -1;
const STATUS_READ: i32 = 1;
const STATUS_WRITE: i32 = 2;

fn usage() -> ! {
    println!(
        "gtab2cin - convert gtab to cin format\n\n\
         Usage: gtab2cin -i <gtab> -o <cin>\n\n\
         Options:\n\
         \x20   -h         Show this help message\n\
         \x20   -i FILE    Input table (.gtab) filename\n\
         \x20   -o FILE    Output table (.cin) filename\n\
         \x20   -b         Machine-readable output"
    );
    process::exit(1);
}

fn bot_output(status: i32, table: Option<&LoadedTable>) {
    match table {
        Some(t) if status == 0 => {
            println!("0:{}:{}:{}", t.keybits, t.max_press, t.item_count)
        }
        _ => println!("{}:0:0:0", status),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut input = None;
    let mut output = None;
    let mut bot = false;
    let mut args = env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "-i" => input = args.next(),
            "-o" => output = args.next(),
            "-b" => bot = true,
            _ => usage(),
        }
    }
    let (Some(input), Some(output)) = (input, output) else {
        if bot {
            bot_output(STATUS_USAGE, None);
            process::exit(1);
        }
        usage();
    };

    let table = match reader::read(&input) {
        Ok(t) => t,
        Err(e) => {
            if bot {
                bot_output(STATUS_READ, None);
            } else {
                eprintln!("gtab2cin: {}", e);
            }
            process::exit(1);
        }
    };

    let ename = Path::new(&input)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.clone());

    if let Err(e) = write_cin(&table, &output, &ename) {
        if bot {
            bot_output(STATUS_WRITE, None);
        } else {
            eprintln!("gtab2cin: cannot write {}: {}", output, e);
        }
        let _ = std::fs::remove_file(&output);
        process::exit(1);
    }

    if bot {
        bot_output(0, Some(&table));
    } else {
        println!("gtab2cin done");
    }
}

fn write_cin(table: &LoadedTable, output: &str, ename: &str) -> std::io::Result<()> {
    let file = File::create(output)?;
    let mut w = BufWriter::new(file);
    table.reconstruct(&mut w, ename)?;
    w.flush()
}
