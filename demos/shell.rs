//! Interactive driver for the buddy allocator.
//!
//! Reads one command per line from stdin and prints the result in brackets,
//! followed by the arena layout:
//!
//! ```text
//!   A 100      ->  [0](128A)(128F)(256F)(512F)(1024F)(2048F)
//!   F 0        ->  [0](4096F)
//! ```
//!
//! `A <n>` allocates `n` bytes and prints the offset (`-1` on failure),
//! `F <offset>` frees the block at `offset` and prints `0` (`-1` on failure).
//! An empty line ends the session.
//!
//! The arena size comes from `RBUDDY_TOTAL_SIZE` and `RBUDDY_MIN_SIZE`
//! (4096 and 128 by default). Set `RUST_LOG=trace` to watch splits and merges.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use log::{info, warn};
use rbuddy::{ArenaConfig, BuddyAllocator, Offset};

/// Runs a single command and returns what goes between the brackets.
fn execute(
  allocator: &mut BuddyAllocator,
  line: &str,
) -> i64 {
  let mut parts = line.split_whitespace();
  let op = parts.next();
  let arg = parts.next().and_then(|arg| arg.parse::<usize>().ok());

  match (op, arg) {
    (Some("A"), Some(size)) => match allocator.alloc(size) {
      Ok(offset) => offset.get() as i64,
      Err(err) => {
        warn!("{err}");
        -1
      }
    },
    (Some("F"), Some(offset)) => match allocator.free(Offset::new(offset)) {
      Ok(()) => 0,
      Err(_) => -1,
    },
    _ => {
      warn!("unrecognised command {line:?}");
      -1
    }
  }
}

fn main() -> Result<()> {
  pretty_env_logger::init();

  let config = ArenaConfig::from_env()?;
  let mut allocator = BuddyAllocator::new(config)?;
  info!(
    "managing {} bytes in blocks of at least {} bytes",
    allocator.total_size(),
    allocator.min_size()
  );

  let stdin = io::stdin();
  let mut stdout = io::stdout().lock();

  for line in stdin.lock().lines() {
    let line = line?;
    if line.trim().is_empty() {
      break;
    }

    let result = execute(&mut allocator, &line);
    writeln!(stdout, "[{result}]{}", allocator.dump())?;
    stdout.flush()?;
  }

  Ok(())
}
