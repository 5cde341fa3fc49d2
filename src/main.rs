//! Kestrel - UCI entry point.
//!
//! With no arguments the engine speaks UCI on stdin/stdout at the default
//! depth; `uci <depth>` overrides the depth per `go`.

use anyhow::{bail, Context, Result};
use kestrel_engine::uci::UciHandler;

const DEFAULT_DEPTH: u8 = 8;

fn print_options() {
    println!("Options:");
    println!("(none)       - start the engine in UCI mode (default depth = {DEFAULT_DEPTH})");
    println!("uci [depth]  - start the engine in UCI mode with the given search depth");
    println!("help         - show this message");
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None => UciHandler::new(DEFAULT_DEPTH).run(),
        Some("uci") => {
            let depth = match args.get(2) {
                Some(raw) => raw
                    .parse::<u8>()
                    .with_context(|| format!("could not parse depth argument {raw:?}"))?,
                None => DEFAULT_DEPTH,
            };
            if depth < 1 {
                bail!("depth must be at least 1");
            }
            UciHandler::new(depth).run();
        }
        Some("help") => print_options(),
        Some(other) => {
            print_options();
            bail!("invalid command line argument {other:?}");
        }
    }

    Ok(())
}
