use std::collections::HashMap;

use crate::rules::{Diagnostic, DiagnosticKind, RuleDescriptor};

/// Input type for SARIF rendering.
#[derive(Debug)]
pub struct SarifIssue {
    pub file: String,
    pub rule: String,
    pub kind: DiagnosticKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl SarifIssue {
    pub fn from_diagnostic(diagnostic: &Diagnostic, file: String) -> Self {
        Self {
            file,
            rule: diagnostic.rule_id.clone(),
            kind: diagnostic.kind,
            message: diagnostic.message.clone(),
            line: diagnostic.location.line,
            column: diagnostic.location.column,
        }
    }
}

/// Violations are errors; internal rule faults are notes.
fn sarif_level(kind: DiagnosticKind) -> &'static str {
    match kind {
        DiagnosticKind::Violation => "error",
        DiagnosticKind::InternalFault => "note",
    }
}

/// Renders a SARIF 2.1.0 JSON string from a list of issues.
/// Rule descriptions come from `rules` when the id is registered there.
pub fn render_sarif(issues: &[SarifIssue], rules: &[RuleDescriptor]) -> String {
    let descriptions: HashMap<&str, &str> = rules
        .iter()
        .map(|r| (r.id.as_str(), r.description))
        .collect();

    // Collect unique rule IDs for the driver.rules array
    let mut seen_rules: Vec<&str> = Vec::new();
    for issue in issues {
        if !seen_rules.contains(&issue.rule.as_str()) {
            seen_rules.push(&issue.rule);
        }
    }

    let rules_json: Vec<serde_json::Value> = seen_rules
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r,
                "shortDescription": { "text": descriptions.get(r).copied().unwrap_or(*r) }
            })
        })
        .collect();

    let results_json: Vec<serde_json::Value> = issues
        .iter()
        .map(|i| {
            serde_json::json!({
                "ruleId": i.rule,
                "level": sarif_level(i.kind),
                "message": { "text": i.message },
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": {
                            "uri": i.file,
                            "uriBaseId": "%SRCROOT%"
                        },
                        "region": { "startLine": i.line, "startColumn": i.column }
                    }
                }]
            })
        })
        .collect();

    let sarif = serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "espolint",
                    "version": env!("CARGO_PKG_VERSION"),
                    "rules": rules_json
                }
            },
            "results": results_json
        }]
    });

    serde_json::to_string_pretty(&sarif).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{SourceLocation, default_rules};

    fn diagnostic(rule_id: &str, kind: DiagnosticKind) -> Diagnostic {
        Diagnostic {
            rule_id: rule_id.to_string(),
            message: "Saving the same entity inside afterSave".to_string(),
            location: SourceLocation {
                file: "/work/mod/src/backend/Hooks/Order/Audit.php".to_string(),
                line: 23,
                column: 9,
            },
            kind,
        }
    }

    #[test]
    fn test_render_sarif_produces_valid_structure() {
        let issues = vec![SarifIssue::from_diagnostic(
            &diagnostic("espocrm.hooks.noSameEntitySaveRule", DiagnosticKind::Violation),
            "src/backend/Hooks/Order/Audit.php".to_string(),
        )];
        let sarif = render_sarif(&issues, &default_rules());
        assert!(sarif.contains("\"$schema\""), "must have schema");
        assert!(sarif.contains("\"startLine\": 23"), "must include line number");

        let parsed: serde_json::Value = serde_json::from_str(&sarif).expect("must be valid JSON");
        assert_eq!(parsed["version"], "2.1.0");
        let run = &parsed["runs"][0];
        assert_eq!(run["tool"]["driver"]["name"], "espolint");
        assert_eq!(run["results"][0]["ruleId"], "espocrm.hooks.noSameEntitySaveRule");
        assert_eq!(run["results"][0]["level"], "error");
        assert_eq!(
            run["results"][0]["locations"][0]["physicalLocation"]["region"]["startColumn"],
            9
        );
        assert_ne!(
            run["tool"]["driver"]["rules"][0]["shortDescription"]["text"],
            "espocrm.hooks.noSameEntitySaveRule",
            "registered rules carry their description"
        );
    }

    #[test]
    fn test_internal_faults_are_notes() {
        let issue = SarifIssue::from_diagnostic(
            &diagnostic("espocrm.core.internalRuleFault", DiagnosticKind::InternalFault),
            "a.php".to_string(),
        );
        assert_eq!(issue.kind, DiagnosticKind::InternalFault);
        let parsed: serde_json::Value =
            serde_json::from_str(&render_sarif(&[issue], &[])).expect("valid JSON");
        assert_eq!(parsed["runs"][0]["results"][0]["level"], "note");
        assert_eq!(
            parsed["runs"][0]["tool"]["driver"]["rules"][0]["shortDescription"]["text"],
            "espocrm.core.internalRuleFault"
        );
    }

    #[test]
    fn test_empty_report_is_valid_sarif() {
        let parsed: serde_json::Value =
            serde_json::from_str(&render_sarif(&[], &[])).expect("valid JSON");
        assert_eq!(parsed["runs"][0]["results"].as_array().map(Vec::len), Some(0));
    }
}
