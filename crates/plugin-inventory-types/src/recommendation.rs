use serde::{Deserialize, Serialize};

use crate::target::Target;

/// One remote-provided plugin request.
///
/// `version_expr` may be a full version, a `vMAJOR.MINOR` prefix, a `vMAJOR`
/// prefix, or empty (meaning "latest compatible") — interpreted by the
/// version resolver, not by this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub name: String,
    pub target: Target,
    #[serde(default)]
    pub version_expr: String,
}

/// Merges a list of recommendations on `(name, target)`, keeping the
/// latest-wins policy when two entries disagree on the version expression:
/// later list positions overwrite earlier ones, preserving first-seen order
/// for iteration (so the sync engine's "process in the order returned by
/// the recommendation source" ordering guarantee still holds).
pub fn merge_recommendations(recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    let mut order: Vec<(String, Target)> = Vec::new();
    let mut merged: std::collections::HashMap<(String, Target), Recommendation> =
        std::collections::HashMap::new();

    for rec in recommendations {
        let key = (rec.name.clone(), rec.target);
        if !merged.contains_key(&key) {
            order.push(key.clone());
        }
        merged.insert(key, rec);
    }

    order
        .into_iter()
        .map(|key| merged.remove(&key).expect("key was just inserted"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_entry_wins_on_conflicting_version_expr() {
        let recs = vec![
            Recommendation {
                name: "k8s".into(),
                target: Target::ClusterManagement,
                version_expr: "v1".into(),
            },
            Recommendation {
                name: "k8s".into(),
                target: Target::ClusterManagement,
                version_expr: "v2".into(),
            },
        ];
        let merged = merge_recommendations(recs);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].version_expr, "v2");
    }

    #[test]
    fn preserves_first_seen_order() {
        let recs = vec![
            Recommendation {
                name: "b".into(),
                target: Target::Global,
                version_expr: "".into(),
            },
            Recommendation {
                name: "a".into(),
                target: Target::Global,
                version_expr: "".into(),
            },
            Recommendation {
                name: "b".into(),
                target: Target::Global,
                version_expr: "v1".into(),
            },
        ];
        let merged = merge_recommendations(recs);
        let names: Vec<&str> = merged.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(merged[0].version_expr, "v1");
    }
}
