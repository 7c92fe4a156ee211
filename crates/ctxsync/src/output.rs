use libctxsync_core::CoreError;
use serde::Serialize;

use crate::cli::Cli;

pub const SCHEMA_VERSION: u32 = 1;

/// JSON response envelope
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub schema_version: u32,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonError>,
}

#[derive(Serialize)]
pub struct JsonError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// Output a successful result.
///
/// `human` renders the text shown without `--json`; it is not called in
/// quiet mode.
pub fn output_success<T: Serialize>(cli: &Cli, data: T, human: impl FnOnce(&T) -> String) {
    if cli.json {
        let response = JsonResponse {
            schema_version: SCHEMA_VERSION,
            ok: true,
            data: Some(data),
            error: None,
        };
        println!("{}", to_pretty(&response));
    } else if !cli.quiet {
        let text = human(&data);
        if !text.is_empty() {
            println!("{}", text.trim_end());
        }
    }
}

/// Output an error
pub fn output_error(cli: &Cli, err: &CoreError) {
    let suggestions = err.suggestions();
    if cli.json {
        let mut details = err.details().unwrap_or(serde_json::Value::Null);
        if !suggestions.is_empty() {
            if let serde_json::Value::Object(map) = &mut details {
                map.insert("suggestions".to_string(), serde_json::json!(suggestions));
            } else {
                details = serde_json::json!({ "suggestions": suggestions });
            }
        }

        let response: JsonResponse<()> = JsonResponse {
            schema_version: SCHEMA_VERSION,
            ok: false,
            data: None,
            error: Some(JsonError {
                code: err.error_code().to_string(),
                message: err.to_string(),
                details,
            }),
        };
        eprintln!("{}", to_pretty(&response));
    } else {
        eprintln!("error: {}", err);
        if !suggestions.is_empty() {
            eprintln!();
            eprintln!("Suggestions:");
            for suggestion in suggestions {
                eprintln!("  - {}", suggestion);
            }
        }
    }
}

/// Print a progress line (ignored in JSON and quiet mode)
pub fn print_human(cli: &Cli, msg: &str) {
    if !cli.json && !cli.quiet {
        println!("{}", msg);
    }
}

/// Print one JSON line per streamed record (used by `watch --json`)
pub fn print_json_line<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("error: failed to encode output: {}", e),
    }
}

fn to_pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        format!(
            "{{\"schema_version\":{},\"ok\":false,\"error\":{{\"code\":\"internal_error\",\"message\":\"{}\"}}}}",
            SCHEMA_VERSION, e
        )
    })
}
