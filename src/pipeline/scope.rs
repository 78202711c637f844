//! Project scope-change detection.
//!
//! Runs only on owner-authored messages that the classifier tagged with
//! scope-change labels. Produces an owner-only clarifying question plus a
//! structured report for the external notification dispatcher — this core
//! never sends notifications itself.

use serde::{Deserialize, Serialize};

// ── Categories ──────────────────────────────────────────────────────

/// Closed set of project scope changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeChangeCategory {
    MaterialChange,
    SizeChange,
    FeatureAddition,
    FeatureRemoval,
    TimelineChange,
    BudgetChange,
}

impl ScopeChangeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaterialChange => "material_change",
            Self::SizeChange => "size_change",
            Self::FeatureAddition => "feature_addition",
            Self::FeatureRemoval => "feature_removal",
            Self::TimelineChange => "timeline_change",
            Self::BudgetChange => "budget_change",
        }
    }

    /// Human wording used in the clarifying question.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::MaterialChange => "materials",
            Self::SizeChange => "the project size",
            Self::FeatureAddition => "an added feature",
            Self::FeatureRemoval => "a removed feature",
            Self::TimelineChange => "the timeline",
            Self::BudgetChange => "the budget",
        }
    }
}

/// Map one free-text scope label to a category. Unrecognized labels drop.
pub fn map_scope_label(label: &str) -> Option<ScopeChangeCategory> {
    let label = label.to_lowercase();

    let matches = |words: &[&str]| words.iter().any(|w| label.contains(w));

    if matches(&["material"]) {
        Some(ScopeChangeCategory::MaterialChange)
    } else if matches(&["size", "area", "dimension", "square"]) {
        Some(ScopeChangeCategory::SizeChange)
    } else if matches(&["addition", "add", "new feature", "extra"]) {
        Some(ScopeChangeCategory::FeatureAddition)
    } else if matches(&["removal", "remove", "drop", "without"]) {
        Some(ScopeChangeCategory::FeatureRemoval)
    } else if matches(&["timeline", "schedule", "deadline", "date"]) {
        Some(ScopeChangeCategory::TimelineChange)
    } else if matches(&["budget", "price", "cost", "spend"]) {
        Some(ScopeChangeCategory::BudgetChange)
    } else {
        None
    }
}

/// Map a batch of labels into an ordered, deduplicated category list.
pub fn map_scope_labels(labels: &[String]) -> Vec<ScopeChangeCategory> {
    let set: std::collections::BTreeSet<ScopeChangeCategory> =
        labels.iter().filter_map(|l| map_scope_label(l)).collect();
    set.into_iter().collect()
}

// ── Report ──────────────────────────────────────────────────────────

/// Structured record handed to the notification dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeChangeReport {
    pub categories: Vec<ScopeChangeCategory>,
    /// Free-form detail from the classifier, passed through untouched.
    pub details: serde_json::Value,
    /// Distinct other providers active on the transaction.
    pub other_participant_ids: Vec<String>,
}

/// Build the scope-change report and owner-only question.
///
/// Returns `None` when there are no mapped categories or no other providers
/// on the transaction — with nobody to notify, there is nothing to ask.
pub fn build_report(
    labels: &[String],
    details: serde_json::Value,
    other_provider_ids: Vec<String>,
) -> Option<(ScopeChangeReport, String)> {
    let categories = map_scope_labels(labels);
    if categories.is_empty() || other_provider_ids.is_empty() {
        return None;
    }

    let question = compose_question(&categories, &other_provider_ids);
    let report = ScopeChangeReport {
        categories,
        details,
        other_participant_ids: other_provider_ids,
    };
    Some((report, question))
}

/// Compose the owner-only clarifying question.
fn compose_question(categories: &[ScopeChangeCategory], providers: &[String]) -> String {
    let changes = match categories {
        [only] => only.describe().to_string(),
        [head @ .., last] => {
            let head: Vec<&str> = head.iter().map(|c| c.describe()).collect();
            format!("{} and {}", head.join(", "), last.describe())
        }
        [] => unreachable!("build_report filters empty category lists"),
    };

    let provider_list = providers.join(", ");
    let count = providers.len();
    let noun = if count == 1 { "provider" } else { "providers" };

    format!(
        "It sounds like you're changing {changes} on this project. {count} other {noun} \
         ({provider_list}) have also been discussing it — want me to let them know so \
         their bids stay accurate?"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_scope_labels() {
        assert_eq!(
            map_scope_label("material change"),
            Some(ScopeChangeCategory::MaterialChange)
        );
        assert_eq!(
            map_scope_label("timeline change"),
            Some(ScopeChangeCategory::TimelineChange)
        );
        assert_eq!(
            map_scope_label("budget increase"),
            Some(ScopeChangeCategory::BudgetChange)
        );
    }

    #[test]
    fn unmapped_scope_labels_drop() {
        assert_eq!(map_scope_label("vibe shift"), None);
        assert!(map_scope_labels(&["vibe shift".to_string()]).is_empty());
    }

    #[test]
    fn batch_mapping_dedupes_and_orders() {
        let labels = vec![
            "budget change".to_string(),
            "material change".to_string(),
            "changing materials".to_string(),
        ];
        let categories = map_scope_labels(&labels);
        assert_eq!(
            categories,
            vec![
                ScopeChangeCategory::MaterialChange,
                ScopeChangeCategory::BudgetChange
            ]
        );
    }

    #[test]
    fn report_names_all_other_providers() {
        let (report, question) = build_report(
            &["material change".to_string()],
            serde_json::json!({"from": "rocks", "to": "mulch"}),
            vec!["pro-2".to_string(), "pro-3".to_string()],
        )
        .unwrap();

        assert_eq!(report.categories, vec![ScopeChangeCategory::MaterialChange]);
        assert_eq!(report.other_participant_ids, vec!["pro-2", "pro-3"]);
        assert!(question.contains("pro-2"));
        assert!(question.contains("pro-3"));
        assert!(question.contains("materials"));
        assert!(question.contains("2 other providers"));
    }

    #[test]
    fn no_other_providers_means_no_report() {
        let result = build_report(
            &["material change".to_string()],
            serde_json::Value::Null,
            vec![],
        );
        assert!(result.is_none());
    }

    #[test]
    fn no_mapped_categories_means_no_report() {
        let result = build_report(
            &["vibe shift".to_string()],
            serde_json::Value::Null,
            vec!["pro-2".to_string()],
        );
        assert!(result.is_none());
    }

    #[test]
    fn question_joins_multiple_categories() {
        let (_, question) = build_report(
            &["material change".to_string(), "budget change".to_string()],
            serde_json::Value::Null,
            vec!["pro-2".to_string()],
        )
        .unwrap();
        assert!(question.contains("materials and the budget"));
        assert!(question.contains("1 other provider "));
    }

    #[test]
    fn details_pass_through_untouched() {
        let details = serde_json::json!({"note": "owner wants cedar"});
        let (report, _) = build_report(
            &["material change".to_string()],
            details.clone(),
            vec!["pro-9".to_string()],
        )
        .unwrap();
        assert_eq!(report.details, details);
    }
}
