use std::path::Path;
use std::process;

use super::{read_file, report_compile_error};
use crate::OutputFormat;

pub(crate) fn cmd_check(file: &Path, output: OutputFormat, quiet: bool) {
    let text = read_file(file, "template", output, quiet);

    let document = match whisker_core::parse(&text) {
        Ok(d) => d,
        Err(e) => {
            report_compile_error(file, &e, output, quiet);
            process::exit(1);
        }
    };

    if quiet {
        return;
    }
    let partials: Vec<&str> = document.partials.names().collect();
    match output {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "ok": true,
                "nodes": document.root.count(),
                "partials": partials,
            });
            let json = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => {
            println!("{}: ok", file.display());
            if !partials.is_empty() {
                println!("partials: {}", partials.join(", "));
            }
        }
    }
}
