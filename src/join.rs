use std::collections::HashMap;
use std::hash::Hash;

use crate::models::{
    CourseCatalogRow, CourseMetricRecord, CourseRateRecord, JoinedRiskRow, PrerequisiteEntry,
    RiskRecord, StudentSummaryRecord,
};
use crate::risk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Only keys present on both sides.
    Inner,
    /// One output per distinct left key; `right` is `None` when unmatched.
    LeftEnrich,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joined<'a, L, R> {
    pub left: &'a L,
    pub right: Option<&'a R>,
}

/// Maps key to record. On duplicate keys the last occurrence wins.
pub fn index_by<'a, T, K, F>(records: &'a [T], key_of: F) -> HashMap<K, &'a T>
where
    K: Eq + Hash,
    F: Fn(&'a T) -> K,
{
    let mut index = HashMap::with_capacity(records.len());
    for record in records {
        index.insert(key_of(record), record);
    }
    index
}

/// Keyed join driven by `left`. Output follows the first-seen order of each
/// distinct left key, carrying that key's last occurrence. Inputs are not
/// modified.
pub fn join<'a, L, R, K, FL, FR>(
    left: &'a [L],
    right: &'a [R],
    left_key: FL,
    right_key: FR,
    mode: JoinMode,
) -> Vec<Joined<'a, L, R>>
where
    K: Eq + Hash + Clone,
    FL: Fn(&'a L) -> K,
    FR: Fn(&'a R) -> K,
{
    let right_index = index_by(right, right_key);

    let mut slots: HashMap<K, usize> = HashMap::with_capacity(left.len());
    let mut driving: Vec<(K, &'a L)> = Vec::with_capacity(left.len());
    for record in left {
        let key = left_key(record);
        match slots.get(&key) {
            Some(&slot) => driving[slot].1 = record,
            None => {
                slots.insert(key.clone(), driving.len());
                driving.push((key, record));
            }
        }
    }

    driving
        .into_iter()
        .filter_map(|(key, left)| {
            let right = right_index.get(&key).copied();
            match (mode, right) {
                (JoinMode::Inner, None) => None,
                _ => Some(Joined { left, right }),
            }
        })
        .collect()
}

/// Summary rows that have a matching risk record. Students without one are not
/// at risk; risk records without a summary row are dropped.
pub fn join_at_risk(summary: &[StudentSummaryRecord], risk: &[RiskRecord]) -> Vec<JoinedRiskRow> {
    join(
        summary,
        risk,
        |s| s.student_id.as_str(),
        |r| r.student_id.as_str(),
        JoinMode::Inner,
    )
    .into_iter()
    .filter_map(|joined| joined.right.map(|r| (joined.left, r)))
    .map(|(student, record)| {
        let mut student = student.clone();
        if student.name.as_deref().map_or(true, str::is_empty) {
            student.name = record.name.clone();
        }
        JoinedRiskRow {
            student,
            score: record.score,
            score_display: risk::score_display(record.score),
            flags: record.flags.clone(),
            risk: risk::classify(record.score),
        }
    })
    .collect()
}

/// Pass-rate rows enriched with the DFW rate for the same course (0 when the
/// DFW feed has no entry).
pub fn join_course_rates(
    pass_rates: &[CourseRateRecord],
    dfw_rates: &[CourseRateRecord],
) -> Vec<CourseMetricRecord> {
    join(
        pass_rates,
        dfw_rates,
        |p| p.course_id.as_str(),
        |d| d.course_id.as_str(),
        JoinMode::LeftEnrich,
    )
    .into_iter()
    .map(|Joined { left, right }| CourseMetricRecord {
        course_id: left.course_id.clone(),
        title: left
            .title
            .clone()
            .or_else(|| right.and_then(|r| r.title.clone()))
            .unwrap_or_default(),
        department: left
            .department
            .clone()
            .or_else(|| right.and_then(|r| r.department.clone()))
            .unwrap_or_default(),
        level: left.level.or_else(|| right.and_then(|r| r.level)),
        pass_rate: left.pass_rate.unwrap_or(0.0),
        dfw_rate: right.and_then(|r| r.dfw_rate).unwrap_or(0.0),
    })
    .collect()
}

pub fn join_prerequisites(
    courses: &[CourseMetricRecord],
    prerequisites: &[PrerequisiteEntry],
) -> Vec<CourseCatalogRow> {
    join(
        courses,
        prerequisites,
        |c| c.course_id.as_str(),
        |p| p.course_id.as_str(),
        JoinMode::LeftEnrich,
    )
    .into_iter()
    .map(|Joined { left, right }| CourseCatalogRow {
        course: left.clone(),
        prerequisites: right.map(|p| p.prerequisites.clone()).unwrap_or_default(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskLevel;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn student(id: &str) -> StudentSummaryRecord {
        StudentSummaryRecord {
            student_id: id.to_string(),
            major: Some("CS".to_string()),
            cohort_year: Some(2023),
            ..Default::default()
        }
    }

    fn flagged(id: &str, score: Option<f64>) -> RiskRecord {
        RiskRecord {
            student_id: id.to_string(),
            score,
            flags: vec!["low-attendance".to_string()],
            ..Default::default()
        }
    }

    fn pass(id: &str, rate: f64) -> CourseRateRecord {
        CourseRateRecord {
            course_id: id.to_string(),
            title: Some(format!("{id} title")),
            pass_rate: Some(rate),
            ..Default::default()
        }
    }

    fn dfw(id: &str, rate: f64) -> CourseRateRecord {
        CourseRateRecord {
            course_id: id.to_string(),
            dfw_rate: Some(rate),
            ..Default::default()
        }
    }

    #[test]
    fn empty_risk_feed_yields_no_at_risk_rows() {
        let rows = join_at_risk(&[student("S1")], &[]);
        assert!(rows.is_empty());
    }

    #[test]
    fn matched_student_carries_score_and_flags() {
        let rows = join_at_risk(&[student("S1")], &[flagged("S1", Some(2.5))]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, Some(2.5));
        assert_eq!(rows[0].risk, RiskLevel::High);
        assert_eq!(rows[0].score_display, "2.50 (High)");
        assert_eq!(rows[0].flags, vec!["low-attendance".to_string()]);
    }

    #[test]
    fn orphan_risk_records_are_dropped() {
        let rows = join_at_risk(
            &[student("S1"), student("S2")],
            &[flagged("S2", Some(0.5)), flagged("S9", Some(3.0))],
        );
        let ids: Vec<&str> = rows.iter().map(|r| r.student.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S2"]);
    }

    #[test]
    fn risk_name_fills_missing_summary_name() {
        let mut record = flagged("S1", None);
        record.name = Some("Avery Lee".to_string());
        let rows = join_at_risk(&[student("S1")], &[record]);
        assert_eq!(rows[0].student.display_name(), "Avery Lee");
        assert_eq!(rows[0].risk, RiskLevel::Unknown);
    }

    #[test]
    fn duplicate_keys_resolve_to_last_occurrence() {
        let mut first = student("S1");
        first.gpa = Some(1.0);
        let mut second = student("S1");
        second.gpa = Some(3.0);
        let rows = join_at_risk(
            &[first, student("S2"), second],
            &[flagged("S1", Some(0.5)), flagged("S1", Some(1.5)), flagged("S2", None)],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].student.student_id, "S1");
        assert_eq!(rows[0].student.gpa, Some(3.0));
        assert_eq!(rows[0].score, Some(1.5));
    }

    #[test]
    fn missing_dfw_rate_defaults_to_zero() {
        let rows = join_course_rates(
            &[pass("CS101", 0.9), pass("CS102", 0.7)],
            &[dfw("CS102", 0.25), dfw("CS999", 0.5)],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].dfw_rate, 0.0);
        assert_eq!(rows[1].dfw_rate, 0.25);
        assert_eq!(rows[1].title, "CS102 title");
    }

    #[test]
    fn courses_without_prerequisites_get_empty_list() {
        let courses = join_course_rates(&[pass("CS101", 0.9), pass("CS201", 0.8)], &[]);
        let prereqs = vec![PrerequisiteEntry {
            course_id: "CS201".to_string(),
            title: None,
            prerequisites: vec![crate::models::PrerequisiteRef {
                course_id: "CS101".to_string(),
                title: None,
            }],
        }];
        let rows = join_prerequisites(&courses, &prereqs);
        assert!(rows[0].prerequisites.is_empty());
        assert_eq!(rows[1].prerequisites[0].course_id, "CS101");
    }

    fn ids() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("S[0-9]", 0..12)
    }

    proptest! {
        #[test]
        fn inner_join_is_bounded_and_keys_exist_on_both_sides(left in ids(), right in ids()) {
            let summary: Vec<_> = left.iter().map(|id| student(id)).collect();
            let risk: Vec<_> = right.iter().map(|id| flagged(id, Some(1.0))).collect();
            let rows = join_at_risk(&summary, &risk);

            prop_assert!(rows.len() <= summary.len().min(risk.len()));
            for row in &rows {
                prop_assert!(left.contains(&row.student.student_id));
                prop_assert!(right.contains(&row.student.student_id));
            }
        }

        #[test]
        fn left_enrich_emits_one_row_per_distinct_left_key(left in ids(), right in ids()) {
            let passes: Vec<_> = left.iter().map(|id| pass(id, 0.5)).collect();
            let dfws: Vec<_> = right.iter().map(|id| dfw(id, 0.2)).collect();
            let rows = join_course_rates(&passes, &dfws);

            let distinct: HashSet<&String> = left.iter().collect();
            prop_assert_eq!(rows.len(), distinct.len());
            for row in &rows {
                let expected = if right.contains(&row.course_id) { 0.2 } else { 0.0 };
                prop_assert_eq!(row.dfw_rate, expected);
            }
        }
    }
}
