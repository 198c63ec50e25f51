//! Sub-category and group classification.
//!
//! Features of the multi-category source are classified by matching their
//! name against an ordered pattern list; the first match wins. A declared
//! type code of 2 always means JSDF.

use lazy_static::lazy_static;
use regex::Regex;

pub const OTHER: &str = "OTHER";
pub const OTHER_GROUP: &str = "Other";
pub const MILITARY_GROUP: &str = "Military";

/// Declared feature type that marks Self-Defense Force airspace.
pub const JSDF_TYPE_CODE: i64 = 2;

lazy_static! {
    // Order matters: e.g. "HELI" must be tried before "AP"
    static ref SUB_CATEGORY_PATTERNS: Vec<(&'static str, Regex)> = [
        ("CTR", r"\bCTR\b"),
        ("INFO ZONE", r"\bINFO(RMATION)?\s*ZONE\b"),
        ("TCA", r"\bTCA\b"),
        ("ACA", r"\bACA\b"),
        ("PCA", r"\bPCA\b"),
        ("HELI", r"HELI"),
        ("AP", r"\bAP\b|AIRPORT|AERODROME"),
        ("GP", r"\bGP\b|GLIDER"),
        ("SURFACE", r"SURFACE"),
        ("JSDF", r"JSDF|\bSDF\b"),
        ("TRAINING AREA", r"TRAINING\s*AREA"),
        ("CAMP", r"CAMP"),
    ]
    .into_iter()
    .map(|(label, pattern)| {
        let regex =
            Regex::new(&format!("(?i){}", pattern)).expect("classification pattern is valid");
        (label, regex)
    })
    .collect();
}

// Fixed sub-category -> group table
const GROUPS: &[(&str, &str)] = &[
    ("CTR", "Control Zone"),
    ("INFO ZONE", "Information Zone"),
    ("TCA", "Terminal Control Airspace"),
    ("ACA", "Terminal Control Airspace"),
    ("PCA", "Positive Control Area"),
    ("HELI", "Aerodrome"),
    ("AP", "Aerodrome"),
    ("GP", "Aerodrome"),
    ("SURFACE", "Obstacle Limitation Surface"),
    ("JSDF", MILITARY_GROUP),
    ("TRAINING AREA", MILITARY_GROUP),
    ("CAMP", MILITARY_GROUP),
];

/// Sub-category for a feature of the multi-category source.
pub fn classify_sub_category(name: &str, type_code: Option<i64>) -> &'static str {
    if type_code == Some(JSDF_TYPE_CODE) {
        return "JSDF";
    }
    SUB_CATEGORY_PATTERNS
        .iter()
        .find(|(_, regex)| regex.is_match(name))
        .map(|(label, _)| *label)
        .unwrap_or(OTHER)
}

fn table_group(category: &str) -> Option<&'static str> {
    GROUPS
        .iter()
        .find(|(sub, _)| sub.eq_ignore_ascii_case(category))
        .map(|(_, group)| *group)
}

/// Group of a pattern-derived sub-category; unknown ones are "Other".
pub fn group_for_sub_category(sub_category: &str) -> &'static str {
    table_group(sub_category).unwrap_or(OTHER_GROUP)
}

/// Group of a one-file-per-category source.
///
/// Falls back to the first `_`, `-`, `.` or space separated token of the
/// category name when the table has no entry.
pub fn group_for_category(category: &str) -> String {
    if let Some(group) = table_group(category) {
        return group.to_string();
    }
    category
        .split(['_', '-', ' ', '.'])
        .find(|token| !token.is_empty())
        .unwrap_or(OTHER_GROUP)
        .to_string()
}

/// Icon letter for a group: `M` for military, `C` otherwise.
pub fn icon_for_group(group: &str) -> &'static str {
    if group == MILITARY_GROUP {
        "M"
    } else {
        "C"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_patterns_pick_sub_category() {
        assert_eq!(classify_sub_category("TOKYO TCA", Some(0)), "TCA");
        assert_eq!(group_for_sub_category("TCA"), "Terminal Control Airspace");
        assert_eq!(classify_sub_category("Narita CTR", None), "CTR");
        assert_eq!(classify_sub_category("OSAKA INFORMATION ZONE", None), "INFO ZONE");
        assert_eq!(classify_sub_category("Tokyo Heliport", None), "HELI");
        assert_eq!(classify_sub_category("SENDAI AP", None), "AP");
        assert_eq!(classify_sub_category("HORIZONTAL SURFACE", None), "SURFACE");
        assert_eq!(classify_sub_category("FUJI TRAINING AREA", None), "TRAINING AREA");
        assert_eq!(classify_sub_category("CAMP ZAMA", None), "CAMP");
    }

    #[test]
    fn first_match_wins() {
        // Both CTR and TCA appear; CTR is earlier in the list
        assert_eq!(classify_sub_category("KANSAI TCA/CTR", None), "CTR");
    }

    #[test]
    fn type_code_two_is_always_jsdf() {
        assert_eq!(classify_sub_category("TOKYO TCA", Some(2)), "JSDF");
        assert_eq!(classify_sub_category("", Some(2)), "JSDF");
        assert_eq!(group_for_sub_category("JSDF"), MILITARY_GROUP);
        assert_eq!(icon_for_group(MILITARY_GROUP), "M");
    }

    #[test]
    fn unmatched_names_are_other() {
        assert_eq!(classify_sub_category("SOMEWHERE", Some(0)), OTHER);
        assert_eq!(group_for_sub_category(OTHER), OTHER_GROUP);
        assert_eq!(icon_for_group(OTHER_GROUP), "C");
    }

    #[test]
    fn file_categories_fall_back_to_first_token() {
        assert_eq!(group_for_category("ctr"), "Control Zone");
        assert_eq!(group_for_category("restricted_areas"), "restricted");
        assert_eq!(group_for_category("-danger-zones"), "danger");
        assert_eq!(group_for_category(""), OTHER_GROUP);
    }
}
