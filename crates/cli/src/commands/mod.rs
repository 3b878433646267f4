pub(crate) mod check;
pub(crate) mod render;

use std::path::Path;
use std::process;

use crate::{report_error, OutputFormat};

/// Read a template or data file, exiting with a diagnostic on failure.
pub(crate) fn read_file(path: &Path, what: &str, output: OutputFormat, quiet: bool) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading {} '{}': {}", what, path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

/// Print every syntax error of a failed compile.
pub(crate) fn report_compile_error(
    path: &Path,
    error: &whisker_core::CompileError,
    output: OutputFormat,
    quiet: bool,
) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => {
            let err_json = serde_json::to_string_pretty(&error.to_json_value())
                .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", error));
            eprintln!("{}", err_json);
        }
        OutputFormat::Text => eprintln!("{}: {}", path.display(), error),
    }
}
