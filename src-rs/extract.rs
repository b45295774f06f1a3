use serde_json::Value;

use crate::error::{Result, UiTestError};

const PREVIEW_CHARS: usize = 200;

/// Parses the JSON document embedded in bridge output.
///
/// The document starts at the first line whose trimmed text begins with `{`
/// and runs to the end of the output; anything before it is preamble.
pub fn extract_json(output: &str) -> Result<Value> {
    let lines: Vec<&str> = output.split('\n').collect();
    let Some(start) = lines.iter().position(|line| line.trim().starts_with('{')) else {
        return Err(UiTestError::NoJsonFound {
            preview: output.chars().take(PREVIEW_CHARS).collect(),
        });
    };
    let document = lines[start..].join("\n");
    Ok(serde_json::from_str(&document)?)
}
