//! CLI Exit Code Registry
//!
//! Single source of truth for `geodiff` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                                     |
//! |------|-------------------------------------------------------------|
//! | 0    | Success                                                     |
//! | 1    | General error (unspecified)                                 |
//! | 2    | Usage error (bad args, unreadable input file)               |
//! | 3    | Invalid config (TOML parse or validation)                   |
//! | 4    | Schema or parse validation failure in the data              |
//! | 5    | Geometry backend or store failure                           |
//! | 6    | Run completed, but some entities had no counterpart         |

use geodiff_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure, including panics.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing input file.
pub const EXIT_USAGE: u8 = 2;

/// Config could not be parsed or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Missing field, bad cell, wrong layer kind or malformed grid.
pub const EXIT_VALIDATION: u8 = 4;

/// Backend raised, or reading/writing a store failed.
pub const EXIT_BACKEND: u8 = 5;

/// One or more entities were skipped for lack of a counterpart.
/// Every other output is complete.
pub const EXIT_SKIPPED: u8 = 6;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::SchemaMismatch { .. }
        | ReconError::TypeMismatch { .. }
        | ReconError::Parse { .. }
        | ReconError::LayerKindMismatch { .. }
        | ReconError::InvalidGrid(_) => EXIT_VALIDATION,
        ReconError::Backend { .. } | ReconError::Io { .. } => EXIT_BACKEND,
        ReconError::MissingCounterpart { .. } => EXIT_SKIPPED,
    }
}
