//! The full targeting-and-accounting flow against a real store:
//! resolve a selection, freeze the audience, track reads, edit, re-aggregate.

use chrono::Utc;
use uuid::Uuid;

use classcast_db::models::MessageRow;
use classcast_db::{Database, fmt_ts};
use classcast_types::audience::resolve;
use classcast_types::models::{SelectionSpec, Student};
use classcast_types::stats::read_stats;

fn student(name: &str, grade: &str) -> Student {
    Student {
        id: Uuid::new_v4(),
        name: name.into(),
        grade: grade.into(),
        active: true,
        last_login: None,
        registered_at: Utc::now(),
    }
}

fn message_row(id: &str) -> MessageRow {
    let now = fmt_ts(&Utc::now());
    MessageRow {
        id: id.into(),
        sender_id: "admin-1".into(),
        sender_name: "Ms. Rivera".into(),
        kind: "reminder".into(),
        title: "Quiz on Friday".into(),
        content: "Review the unit 3 word list before Friday.".into(),
        priority: "high".into(),
        scheduled_at: None,
        sent_at: Some(now.clone()),
        created_at: now.clone(),
        updated_at: now,
    }
}

fn to_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[test]
fn grade_plus_individual_selection_tracks_reads_through_an_audience_edit() {
    // 5 students, 3 in G1; s4 sits in G2.
    let roster = vec![
        student("Ada Lim", "G1"),
        student("Ben Ortiz", "G1"),
        student("Cleo Marsh", "G1"),
        student("Dev Rao", "G2"),
        student("Elif Kaya", "G3"),
    ];
    let s4 = roster[3].id;

    // {grades: {G1}} ∪ {s4} resolves to 4 recipients, not 5.
    let spec = SelectionSpec {
        send_to_all: false,
        grades: ["G1".to_string()].into(),
        student_ids: [s4].into(),
    };
    let audience = resolve(&spec, &roster);
    assert_eq!(audience.count, 4);

    let db = Database::open_in_memory().unwrap();
    let recipients = to_strings(&audience.recipient_ids);
    db.insert_message(&message_row("m1"), &recipients).unwrap();

    // s4 reads it: 1 of 4 = 25%.
    db.mark_read("m1", &s4.to_string(), &fmt_ts(&Utc::now())).unwrap();
    let (read, total) = db.read_count("m1").unwrap();
    let stats = read_stats(read, total);
    assert_eq!((stats.read_count, stats.total, stats.percentage), (1, 4, 25));

    // Edit drops grade G1 and keeps only s4: the kept receipt survives
    // with its read state, so stats become 1 of 1 = 100%.
    let narrowed = resolve(
        &SelectionSpec {
            send_to_all: false,
            grades: Default::default(),
            student_ids: [s4].into(),
        },
        &roster,
    );
    let new_order = to_strings(&narrowed.recipient_ids);
    let removed: Vec<String> = recipients
        .iter()
        .filter(|id| !new_order.contains(id))
        .cloned()
        .collect();
    assert_eq!(removed.len(), 3);

    db.update_message(&message_row("m1"), Some((&new_order, &removed)))
        .unwrap();

    assert_eq!(db.recipient_ids("m1").unwrap(), vec![s4.to_string()]);
    let (read, total) = db.read_count("m1").unwrap();
    let stats = read_stats(read, total);
    assert_eq!((stats.read_count, stats.total, stats.percentage), (1, 1, 100));
}

#[test]
fn roster_changes_after_dispatch_never_alter_a_frozen_audience() {
    let mut roster = vec![student("Ada Lim", "G1"), student("Ben Ortiz", "G1")];

    let all = SelectionSpec {
        send_to_all: true,
        ..Default::default()
    };
    let audience = resolve(&all, &roster);

    let db = Database::open_in_memory().unwrap();
    let frozen = to_strings(&audience.recipient_ids);
    db.insert_message(&message_row("m1"), &frozen).unwrap();

    // The roster grows and shrinks after dispatch.
    roster.push(student("Cleo Marsh", "G2"));
    roster.remove(0);

    // The stored message still addresses exactly the snapshot it was
    // created from; only a fresh resolution sees the new roster.
    assert_eq!(db.recipient_ids("m1").unwrap(), frozen);
    assert_eq!(resolve(&all, &roster).count, 2);
    assert_eq!(db.read_count("m1").unwrap(), (0, 2));
}
