//! Compose-time draft state.
//!
//! A draft lives entirely client-side; nothing here is persisted. The draft
//! holds the author's selection intent plus the roster filter box, and
//! answers the live "N recipients" preview through the same resolver the
//! server uses at commit time.

use chrono::{DateTime, Utc};

use crate::audience::{matches_filter, resolve};
use crate::models::{MessageKind, Priority, SelectionSpec, Student};

#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub kind: MessageKind,
    pub title: String,
    pub content: String,
    pub priority: Priority,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub selection: SelectionSpec,
    /// Current text in the roster filter box. Scopes `toggle_filtered`,
    /// nothing else.
    pub filter: String,
}

impl MessageDraft {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            title: String::new(),
            content: String::new(),
            priority: Priority::Medium,
            scheduled_at: None,
            selection: SelectionSpec::default(),
            filter: String::new(),
        }
    }

    /// Live recipient count for the compose preview.
    pub fn preview_count(&self, roster: &[Student]) -> usize {
        resolve(&self.selection, roster).count
    }

    /// Students currently visible under the filter box.
    pub fn filtered_view<'a>(&self, roster: &'a [Student]) -> Vec<&'a Student> {
        roster
            .iter()
            .filter(|s| matches_filter(s, &self.filter))
            .collect()
    }

    /// The "select all in view" checkbox. If every filtered student is
    /// already individually selected, deselect exactly those; otherwise add
    /// the whole filtered set. Selections outside the filter are untouched.
    pub fn toggle_filtered(&mut self, roster: &[Student]) {
        let view: Vec<_> = self.filtered_view(roster).iter().map(|s| s.id).collect();
        if view.is_empty() {
            return;
        }

        let all_selected = view.iter().all(|id| self.selection.student_ids.contains(id));
        if all_selected {
            for id in &view {
                self.selection.student_ids.remove(id);
            }
        } else {
            self.selection.student_ids.extend(view);
        }
    }
}
