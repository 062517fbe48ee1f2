use crate::model::{PackageSummaries, PackageSummary};

/// Render summaries as a console table, packages with errors first.
pub fn render(summaries: &PackageSummaries) -> String {
    let mut output = String::new();

    if summaries.packages.is_empty() {
        output.push_str("\n  No package records found.\n\n");
        return output;
    }

    let mut sorted: Vec<&PackageSummary> = summaries.packages.iter().collect();
    sorted.sort_by(|a, b| {
        b.has_error
            .cmp(&a.has_error)
            .then_with(|| b.deps_errors.cmp(&a.deps_errors))
            .then_with(|| a.name.cmp(&b.name))
    });

    output.push_str(&format!("\n  {} package(s) audited:\n\n", sorted.len()));

    for summary in &sorted {
        let status_tag = if summary.has_error {
            "[ERROR]   "
        } else if summary.attestation_issuers.is_empty() {
            "[NONE]    "
        } else {
            "[ATTESTED]"
        };

        output.push_str(&format!(
            "  {} {}@{} ({})\n",
            status_tag, summary.name, summary.version, summary.ecosystem
        ));
        output.push_str(&format!(
            "             deps: {}, with errors: {}\n",
            summary.deps, summary.deps_errors
        ));
        for issuer in &summary.attestation_issuers {
            output.push_str(&format!("             issuer: {}\n", issuer));
        }
        output.push('\n');
    }

    let with_errors = sorted.iter().filter(|s| s.has_error).count();
    let attested = sorted
        .iter()
        .filter(|s| !s.has_error && !s.attestation_issuers.is_empty())
        .count();
    output.push_str(&format!(
        "  Result: {} attested, {} with errors, {} without provenance\n\n",
        attested,
        with_errors,
        sorted.len() - attested - with_errors,
    ));

    output
}
