//! Fixed vocabularies of the school report forms.

pub const GRADE_LABELS: [(i64, &str); 13] = [
    (0, "Kinder"),
    (1, "Grade 1"),
    (2, "Grade 2"),
    (3, "Grade 3"),
    (4, "Grade 4"),
    (5, "Grade 5"),
    (6, "Grade 6"),
    (7, "Grade 7"),
    (8, "Grade 8"),
    (9, "Grade 9"),
    (10, "Grade 10"),
    (11, "Grade 11"),
    (12, "Grade 12"),
];

pub const RMA_GRADE_LABELS: [(i64, &str); 11] = [
    (0, "k"),
    (1, "g1"),
    (2, "g2"),
    (3, "g3"),
    (4, "g4"),
    (5, "g5"),
    (6, "g6"),
    (7, "g7"),
    (8, "g8"),
    (9, "g9"),
    (10, "g10"),
];

pub const PCT_AREAS: [&str; 4] = ["access", "quality", "equity", "enabling_mechanisms"];

pub const READING_PERIODS: [&str; 3] = ["bosy", "mosy", "eosy"];

pub const CRLA_LEVELS: [&str; 4] = ["low_emerging", "high_emerging", "developing", "transitioning"];

pub const PHILIRI_LEVELS: [&str; 3] = ["frustration", "instructional", "independent"];

/// Codes for reasons of non-mastery. `f` ("others") requires a write-up.
pub const NON_MASTERY_REASONS: [(&str, &str); 6] = [
    ("a", "Difficulty in understanding the lesson"),
    ("b", "Lack of learning materials"),
    ("c", "Absenteeism"),
    ("d", "Lack of parental support"),
    ("e", "Reading difficulty"),
    ("f", "Others"),
];

pub const SLP_DEFAULT_SUBJECT: &str = "overall";

const PRIMARY_SUBJECTS: &[&str] = &[
    "mother_tongue",
    "filipino",
    "english",
    "mathematics",
    "araling_panlipunan",
    "mapeh",
    "esp",
];

const GRADE_3_SUBJECTS: &[&str] = &[
    "mother_tongue",
    "filipino",
    "english",
    "mathematics",
    "science",
    "araling_panlipunan",
    "mapeh",
    "esp",
];

const INTERMEDIATE_SUBJECTS: &[&str] = &[
    "filipino",
    "english",
    "mathematics",
    "science",
    "araling_panlipunan",
    "mapeh",
    "esp",
    "epp",
];

const SECONDARY_SUBJECTS: &[&str] = &[
    "filipino",
    "english",
    "mathematics",
    "science",
    "araling_panlipunan",
    "mapeh",
    "esp",
    "tle",
];

pub fn grade_label(grade: i64) -> Option<&'static str> {
    GRADE_LABELS
        .iter()
        .find(|(n, _)| *n == grade)
        .map(|(_, label)| *label)
}

pub fn rma_grade_label(grade: i64) -> Option<&'static str> {
    RMA_GRADE_LABELS
        .iter()
        .find(|(n, _)| *n == grade)
        .map(|(_, label)| *label)
}

pub fn is_rma_grade_label(label: &str) -> bool {
    RMA_GRADE_LABELS.iter().any(|(_, l)| *l == label)
}

/// Learning areas reported in SLP for a grade. Senior high grades report a
/// single overall row.
pub fn slp_subjects_for_grade(grade: i64) -> &'static [&'static str] {
    match grade {
        0..=2 => PRIMARY_SUBJECTS,
        3 => GRADE_3_SUBJECTS,
        4 | 5 => INTERMEDIATE_SUBJECTS,
        6..=10 => SECONDARY_SUBJECTS,
        _ => &[SLP_DEFAULT_SUBJECT],
    }
}

/// Grade numbers with a known label, clamped to the given span. Without a
/// span every grade is returned.
pub fn grades_in_span(span: Option<(i64, i64)>) -> Vec<i64> {
    let all = GRADE_LABELS.iter().map(|(n, _)| *n);
    match span {
        Some((start, end)) => {
            let start = start.max(0);
            let end = end.max(start);
            all.filter(|n| *n >= start && *n <= end).collect()
        }
        None => all.collect(),
    }
}

/// (grade label, subject) pairs for the SLP table of a school.
pub fn slp_grade_subject_pairs(span: Option<(i64, i64)>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = grades_in_span(span)
        .into_iter()
        .filter_map(|n| grade_label(n).map(|label| (n, label)))
        .flat_map(|(n, label)| {
            slp_subjects_for_grade(n)
                .iter()
                .map(move |subject| (label.to_string(), subject.to_string()))
        })
        .collect();
    if pairs.is_empty() {
        pairs.push(("Kinder".to_string(), SLP_DEFAULT_SUBJECT.to_string()));
    }
    pairs
}

/// RMA grade labels for a school; all of them when the span yields none.
pub fn rma_grade_labels(span: Option<(i64, i64)>) -> Vec<String> {
    let labels: Vec<String> = grades_in_span(span)
        .into_iter()
        .filter_map(rma_grade_label)
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        RMA_GRADE_LABELS.iter().map(|(_, l)| l.to_string()).collect()
    } else {
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slp_pairs_follow_span() {
        let pairs = slp_grade_subject_pairs(Some((3, 4)));
        assert!(pairs.contains(&("Grade 3".to_string(), "mother_tongue".to_string())));
        assert!(pairs.contains(&("Grade 4".to_string(), "epp".to_string())));
        assert!(!pairs.iter().any(|(g, _)| g == "Grade 5"));
    }

    #[test]
    fn test_senior_high_uses_overall_row() {
        let pairs = slp_grade_subject_pairs(Some((11, 12)));
        assert_eq!(
            pairs,
            vec![
                ("Grade 11".to_string(), "overall".to_string()),
                ("Grade 12".to_string(), "overall".to_string()),
            ]
        );
    }

    #[test]
    fn test_rma_labels_fall_back_to_all() {
        assert_eq!(rma_grade_labels(Some((1, 2))), vec!["g1", "g2"]);
        assert_eq!(rma_grade_labels(Some((11, 12))).len(), RMA_GRADE_LABELS.len());
    }
}
