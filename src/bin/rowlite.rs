//! # rowlite CLI Entry Point
//!
//! ```bash
//! # open an existing database file
//! rowlite mydb.db
//!
//! # create a new one
//! rowlite --create mydb.db
//! rowlite --create --page-size 512 mydb.db
//! ```

use std::env;
use std::path::PathBuf;

use eyre::{bail, Result, WrapErr};
use rowlite::cli::Repl;
use rowlite::Database;

const DEFAULT_PAGE_SIZE: u32 = 4096;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut create_mode = false;
    let mut page_size = DEFAULT_PAGE_SIZE;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("rowlite {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--create" | "-c" => {
                create_mode = true;
            }
            "--page-size" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    bail!("--page-size needs a value");
                };
                page_size = value
                    .parse()
                    .wrap_err_with(|| format!("bad page size: {}", value))?;
            }
            arg if arg.starts_with('-') => {
                bail!("unknown option: {}", arg);
            }
            arg => {
                if db_path.is_some() {
                    bail!("more than one database path given");
                }
                db_path = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    let Some(path) = db_path else {
        print_usage();
        return Ok(());
    };

    let db = if create_mode {
        Database::create(&path, page_size)?
    } else {
        Database::open(&path)?
    };

    Repl::new(db)?.run()
}

fn print_usage() {
    println!("usage: rowlite [options] <database-file>");
    println!();
    println!("options:");
    println!("  -c, --create        create a new database file");
    println!("      --page-size N   page size for --create (default {})", DEFAULT_PAGE_SIZE);
    println!("  -h, --help          show this message");
    println!("  -v, --version       show the version");
}
