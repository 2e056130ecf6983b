pub mod catalog;
pub mod config;
pub mod doctor;
pub mod migrate;

use serde::Serialize;

/// Process exit code plus the text printed to stdout.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    error_class: Option<&'a str>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload =
            CommandOutcome { command, status: "ok", error_class: None, message: message.into() };
        Self::json(command, 0, &payload)
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
        };
        Self::json(command, exit_code, &payload)
    }

    /// Pretty-prints `payload`; a serialization failure becomes a flat error envelope.
    pub fn json(command: &str, exit_code: u8, payload: &impl Serialize) -> Self {
        match serde_json::to_string_pretty(payload) {
            Ok(output) => Self { exit_code, output },
            Err(error) => Self {
                exit_code: exit_code.max(3),
                output: format!(
                    "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
                    escape_json(command),
                    escape_json(&error.to_string())
                ),
            },
        }
    }
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
