use crate::error::Result;
use crate::model::PackageSummaries;

/// Render summaries as the pretty JSON document written to `summary.json`.
pub fn render(summaries: &PackageSummaries) -> Result<String> {
    let json = serde_json::to_string_pretty(summaries)?;
    Ok(json)
}
