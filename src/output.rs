use std::path::Path;

use crate::consult::{ConsultationResult, Outcome};
use crate::error::OutputError;

const RULE: &str = "---\n\n";

pub const QUESTION_HEADING: &str = "질문";

/// Appended to the heading of a failed model's section.
pub const FAILED_MARKER: &str = "(실패)";

/// Pretty-printed JSON array of results. Non-ASCII text is kept literal.
pub fn render_json(results: &[ConsultationResult]) -> Result<String, OutputError> {
    Ok(serde_json::to_string_pretty(results)?)
}

/// Markdown summary: title, the prompt verbatim, then one section per result
/// in order. Failed sections carry the [`FAILED_MARKER`] and the error text.
pub fn render_markdown(title: &str, prompt: &str, results: &[ConsultationResult]) -> String {
    let mut md = String::new();
    md.push_str(&format!("# {title}\n\n"));
    md.push_str(&format!("## {QUESTION_HEADING}\n\n"));
    md.push_str(prompt);
    md.push_str("\n\n");
    md.push_str(RULE);

    for result in results {
        match result.outcome() {
            Outcome::Success { response, .. } => {
                md.push_str(&format!("## {}\n\n", result.model()));
                md.push_str(response);
                md.push_str("\n\n");
            }
            Outcome::Failure { error } => {
                md.push_str(&format!("## {} {FAILED_MARKER}\n\n", result.model()));
                md.push_str(&format!("Error: {error}\n\n"));
            }
        }
        md.push_str(RULE);
    }

    md
}

/// Write both artifacts. JSON goes first; a failure there skips the Markdown.
pub async fn write_outputs(
    results: &[ConsultationResult],
    title: &str,
    prompt: &str,
    json_path: &Path,
    markdown_path: &Path,
) -> Result<(), OutputError> {
    let json = render_json(results)?;
    write_atomic(json_path, json.as_bytes()).await?;
    tracing::info!(path = %json_path.display(), "results saved");

    let markdown = render_markdown(title, prompt, results);
    write_atomic(markdown_path, markdown.as_bytes()).await?;
    tracing::info!(path = %markdown_path.display(), "summary saved");

    Ok(())
}

/// Temp file + rename so readers never see a partial artifact.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), OutputError> {
    let io_err = |source: std::io::Error| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    tokio::fs::write(tmp_path, contents).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(tmp_path, path).await {
        let _ = tokio::fs::remove_file(tmp_path).await;
        return Err(io_err(e));
    }
    Ok(())
}
