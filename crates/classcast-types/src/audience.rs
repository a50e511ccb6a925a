//! Recipient resolution.
//!
//! One pure function turns a [`SelectionSpec`] into the deduplicated,
//! roster-ordered audience. The admin client calls it for the compose-time
//! preview and the server calls it again at commit time, so the two can only
//! diverge when the roster itself changed in between, which is tolerated.

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::{Audience, SelectionSpec, Student};

/// Resolve a selection spec against a roster snapshot.
///
/// `send_to_all` dominates: when set, the grade and individual selections are
/// ignored entirely. Otherwise the audience is the union of grade matches and
/// explicitly picked students, deduplicated by id, in roster order. An empty
/// spec resolves to an empty audience; rejecting that is the caller's job.
pub fn resolve(spec: &SelectionSpec, roster: &[Student]) -> Audience {
    let mut seen: HashSet<Uuid> = HashSet::with_capacity(roster.len());
    let mut recipient_ids = Vec::new();

    for student in roster {
        let selected = spec.send_to_all
            || spec.grades.contains(&student.grade)
            || spec.student_ids.contains(&student.id);

        if selected && seen.insert(student.id) {
            recipient_ids.push(student.id);
        }
    }

    let count = recipient_ids.len();
    Audience {
        recipient_ids,
        count,
    }
}

/// Case-insensitive substring match on name or grade. An empty query
/// matches everything. Backs the compose screen's roster filter box.
pub fn matches_filter(student: &Student, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    student.name.to_lowercase().contains(&query) || student.grade.to_lowercase().contains(&query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn student(id: Uuid, name: &str, grade: &str) -> Student {
        Student {
            id,
            name: name.into(),
            grade: grade.into(),
            active: true,
            last_login: None,
            registered_at: Utc::now(),
        }
    }

    fn roster() -> (Vec<Student>, Vec<Uuid>) {
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let roster = vec![
            student(ids[0], "Ada Lim", "G1"),
            student(ids[1], "Ben Ortiz", "G1"),
            student(ids[2], "Cleo Marsh", "G1"),
            student(ids[3], "Dev Rao", "G2"),
            student(ids[4], "Elif Kaya", "G3"),
        ];
        (roster, ids)
    }

    #[test]
    fn union_of_grade_and_individual_never_double_counts() {
        let (roster, ids) = roster();
        // ids[0] is in G1 *and* picked individually; must count once.
        let spec = SelectionSpec {
            send_to_all: false,
            grades: ["G1".to_string()].into(),
            student_ids: [ids[0], ids[3]].into(),
        };

        let audience = resolve(&spec, &roster);
        assert_eq!(audience.count, 4);
        assert_eq!(audience.recipient_ids, vec![ids[0], ids[1], ids[2], ids[3]]);

        let unique: HashSet<_> = audience.recipient_ids.iter().collect();
        assert_eq!(unique.len(), audience.recipient_ids.len());
        assert!(audience.count <= roster.len());
    }

    #[test]
    fn send_to_all_dominates_other_selections() {
        let (roster, ids) = roster();
        let noisy = SelectionSpec {
            send_to_all: true,
            grades: ["G9".to_string()].into(),
            student_ids: [ids[1]].into(),
        };
        let plain = SelectionSpec {
            send_to_all: true,
            ..Default::default()
        };

        assert_eq!(
            resolve(&noisy, &roster).recipient_ids,
            resolve(&plain, &roster).recipient_ids
        );
        assert_eq!(resolve(&noisy, &roster).count, roster.len());
    }

    #[test]
    fn empty_spec_resolves_to_empty_audience() {
        let (roster, _) = roster();
        let audience = resolve(&SelectionSpec::default(), &roster);
        assert_eq!(audience.count, 0);
        assert!(audience.recipient_ids.is_empty());
    }

    #[test]
    fn resolution_preserves_roster_order() {
        let (roster, ids) = roster();
        let spec = SelectionSpec {
            send_to_all: false,
            grades: Default::default(),
            // BTreeSet order differs from roster order; roster order must win.
            student_ids: [ids[4], ids[0], ids[2]].into(),
        };

        let audience = resolve(&spec, &roster);
        assert_eq!(audience.recipient_ids, vec![ids[0], ids[2], ids[4]]);
    }

    #[test]
    fn grade_plus_individual_scenario_counts_four_of_five() {
        // 5 students, 3 in G1; select grade G1 plus s4 from G2 => 4, not 5.
        let (roster, ids) = roster();
        let spec = SelectionSpec {
            send_to_all: false,
            grades: ["G1".to_string()].into(),
            student_ids: [ids[3]].into(),
        };
        assert_eq!(resolve(&spec, &roster).count, 4);
    }

    #[test]
    fn unknown_grades_and_ids_resolve_to_nobody() {
        let (roster, _) = roster();
        let spec = SelectionSpec {
            send_to_all: false,
            grades: ["G9".to_string()].into(),
            student_ids: [Uuid::new_v4()].into(),
        };
        assert_eq!(resolve(&spec, &roster).count, 0);
    }

    #[test]
    fn filter_matches_name_and_grade_case_insensitively() {
        let s = student(Uuid::new_v4(), "Ada Lim", "G1");
        assert!(matches_filter(&s, "ada"));
        assert!(matches_filter(&s, "LIM"));
        assert!(matches_filter(&s, "g1"));
        assert!(matches_filter(&s, ""));
        assert!(matches_filter(&s, "  ada "));
        assert!(!matches_filter(&s, "ben"));
    }
}
