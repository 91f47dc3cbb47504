use clap::Parser;
use serde::Serialize;
use snapshot_js::SnapshotEntry;
use std::io::stdin;
use std::io::stdout;
use std::io::Read;
use std::path::PathBuf;
use std::process::exit;

/// Validate a snapshot blob and print its entry-point table as JSON.
#[derive(Parser, Debug)]
#[command(author, version)]
struct Cli {
  /// Snapshot blob to inspect; reads stdin when omitted.
  input: Option<PathBuf>,

  /// Validate only; print nothing on success.
  #[arg(long)]
  verify: bool,
}

#[derive(Serialize)]
struct Report<'a> {
  version: u32,
  entries: &'a [SnapshotEntry],
}

fn main() {
  let args = Cli::parse();

  let bytes = match &args.input {
    Some(path) => std::fs::read(path).unwrap_or_else(|err| {
      eprintln!("error: cannot read {}: {err}", path.display());
      exit(2);
    }),
    None => {
      let mut bytes = Vec::new();
      stdin().read_to_end(&mut bytes).expect("read from stdin");
      bytes
    }
  };

  let snapshot = match snapshot_js::load(&bytes) {
    Ok(snapshot) => snapshot,
    Err(err) => {
      eprintln!("error: {err}");
      exit(1);
    }
  };

  if !args.verify {
    let report = Report {
      version: snapshot_js::SNAPSHOT_VERSION,
      entries: snapshot.entries(),
    };
    serde_json::to_writer_pretty(stdout(), &report).expect("write to stdout");
    println!();
  }
}
