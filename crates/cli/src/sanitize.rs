//! `geodiff sanitize`: bulk value replacement in one CSV.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use geodiff_recon::config::{default_chunk_size, RowFilter};
use geodiff_recon::export::write_snapshot;
use geodiff_recon::loader::{read_snapshot, LoadOptions};
use geodiff_recon::sanitize::{replace_values, ReplaceRule};

use crate::exit_codes::{EXIT_BACKEND, EXIT_USAGE};
use crate::CliError;

pub struct SanitizeArgs {
    pub input: PathBuf,
    pub fields: Option<Vec<String>>,
    pub find: Option<String>,
    pub replace: String,
    pub where_clause: Option<String>,
    pub key: Option<String>,
    pub geometry_field: Option<String>,
    pub chunk_size: Option<usize>,
    pub output: Option<PathBuf>,
}

pub fn cmd_sanitize(args: SanitizeArgs) -> Result<(), CliError> {
    if args.chunk_size == Some(0) {
        return Err(CliError::usage("--chunk-size must be greater than 0"));
    }
    let filter = match args.where_clause.as_deref() {
        Some(raw) => Some(
            RowFilter::parse(raw)
                .ok_or_else(|| CliError::usage(format!("--where expects COLUMN=V1|V2, got '{raw}'")))?,
        ),
        None => None,
    };
    let file = File::open(&args.input)
        .map_err(|e| CliError::new(EXIT_USAGE, format!("cannot read {}: {e}", args.input.display())))?;
    let name = args.input.file_stem().and_then(|s| s.to_str()).unwrap_or("input");
    let options = LoadOptions {
        key_field: args.key.as_deref().unwrap_or(""),
        geometry_field: args.geometry_field.as_deref(),
        ..Default::default()
    };
    let snapshot = read_snapshot(file, name, &options)?;

    log::debug!("sanitize: {} rows from {}", snapshot.row_count(), args.input.display());

    let rule = ReplaceRule { fields: args.fields, find: args.find, replace: args.replace, filter };
    let (cleaned, replaced) = replace_values(&snapshot, &rule, args.chunk_size.unwrap_or_else(default_chunk_size))?;

    match &args.output {
        Some(path) => {
            let out = File::create(path)
                .map_err(|e| CliError::new(EXIT_BACKEND, format!("cannot write {}: {e}", path.display())))?;
            write_snapshot(BufWriter::new(out), &cleaned)?;
            eprintln!("wrote {}", path.display());
        }
        None => write_snapshot(io::stdout().lock(), &cleaned)?,
    }

    eprintln!("sanitize: replaced {replaced} value(s) in {} row(s)", cleaned.row_count());
    Ok(())
}
