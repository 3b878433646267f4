use std::io::Write;
use std::path::Path;
use std::process;

use whisker_eval::{compile, RenderError, Value};

use super::{read_file, report_compile_error};
use crate::config::{self, Overrides};
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_render(
    template_path: &Path,
    data_path: Option<&Path>,
    config_path: Option<&Path>,
    overrides: Overrides,
    out_path: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) {
    let settings = match config::load(config_path) {
        Ok(c) => config::apply(c, overrides),
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    tracing::debug!(?settings, "render settings");

    let text = read_file(template_path, "template", output, quiet);
    let data = match data_path {
        Some(path) => {
            let raw = read_file(path, "data", output, quiet);
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(v) => Value::from(v),
                Err(e) => {
                    let msg = format!("error parsing JSON in '{}': {}", path.display(), e);
                    report_error(&msg, output, quiet);
                    process::exit(1);
                }
            }
        }
        None => Value::Map(Default::default()),
    };

    let template = match compile(&text, settings.into_options()) {
        Ok(t) => t,
        Err(e) => {
            report_compile_error(template_path, &e, output, quiet);
            process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let rendered = match rt.block_on(template.render(data)) {
        Ok(r) => r,
        Err(e) => {
            let msg = match &e {
                RenderError::Timeout(_) => format!("render error: {} (output discarded)", e),
                _ => format!("render error: {}", e),
            };
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    if rendered.truncated {
        tracing::warn!(bytes = rendered.len(), "output truncated at the size limit");
    }

    let written = match out_path {
        Some(path) => std::fs::write(path, &rendered.bytes)
            .map_err(|e| format!("error writing '{}': {}", path.display(), e)),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&rendered.bytes)
                .and_then(|()| stdout.flush())
                .map_err(|e| format!("error writing output: {}", e))
        }
    };
    if let Err(msg) = written {
        report_error(&msg, output, quiet);
        process::exit(1);
    }
}
