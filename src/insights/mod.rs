//! Read-only analysis pass over projects, tasks and team members.
//!
//! [`generate`] is a pure function of a [`Snapshot`] and the current date;
//! the same inputs always yield the same ordered list of findings.

mod rules;
mod snapshot;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

pub use snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Critical,
    Warning,
    Positive,
    Info,
}

impl InsightCategory {
    /// Sort key; lower comes first.
    pub fn priority(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Warning => 1,
            Self::Positive => 2,
            Self::Info => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Insight {
    pub category: InsightCategory,
    /// Stable identifier of the rule that produced the finding.
    #[schema(example = "overdue_tasks")]
    pub code: &'static str,
    #[schema(example = "alert-triangle")]
    pub icon: &'static str,
    pub title: String,
    pub description: String,
}

impl Insight {
    fn new(
        category: InsightCategory,
        code: &'static str,
        icon: &'static str,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code,
            icon,
            title: title.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InsightsResponse {
    pub insights: Vec<Insight>,
    pub generated_at: DateTime<Utc>,
}

/// Runs every rule in its fixed order, then stable-sorts by category.
pub fn generate(snapshot: &Snapshot, today: NaiveDate) -> Vec<Insight> {
    let mut insights = Vec::new();

    insights.extend(rules::overdue_tasks(&snapshot.tasks, today));
    insights.extend(rules::overdue_projects(&snapshot.projects, today));
    insights.extend(rules::unassigned_high_priority(&snapshot.tasks));

    insights.extend(rules::due_soon_tasks(&snapshot.tasks, today));
    insights.extend(rules::overloaded_members(&snapshot.tasks, &snapshot.members));
    insights.extend(rules::behind_schedule_projects(&snapshot.projects, today));

    insights.extend(rules::recently_completed(&snapshot.tasks));
    insights.extend(rules::on_track_projects(&snapshot.projects, today));
    insights.extend(rules::top_performer(&snapshot.tasks, &snapshot.members));

    insights.extend(rules::summary_stats(snapshot));

    insights.sort_by_key(|insight| insight.category.priority());
    insights
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::rules::fixtures::{member, project, task};
    use super::*;
    use crate::models::project::ProjectStatus;
    use crate::models::task::{Priority, TaskStatus};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn overdue_task_scenario_yields_single_critical_finding() {
        let today = today();
        let p1 = project("P1", ProjectStatus::Active, today - Duration::days(30), today + Duration::days(30), 50);
        let mut t1 = task(p1.id, "T1", today - Duration::days(10), today - Duration::days(3));
        t1.status = TaskStatus::InProgress;
        t1.priority = Priority::High;
        t1.assignee_id = Some(Uuid::new_v4());

        let snapshot = Snapshot {
            projects: vec![p1],
            tasks: vec![t1],
            members: vec![],
        };

        let insights = generate(&snapshot, today);
        let overdue: Vec<_> = insights.iter().filter(|i| i.code == "overdue_tasks").collect();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].category, InsightCategory::Critical);
        assert!(overdue[0].description.contains("3 days"));
        assert!(overdue[0].description.contains("\"T1\""));
    }

    #[test]
    fn output_is_sorted_by_category_and_stable_within() {
        let today = today();
        let p = project("Late", ProjectStatus::Active, today - Duration::days(20), today - Duration::days(1), 10);
        let mut done = task(p.id, "Done", today - Duration::days(5), today + Duration::days(5));
        done.status = TaskStatus::Completed;
        done.progress = 100;
        let soon = task(p.id, "Soon", today, today + Duration::days(2));
        let mut late = task(p.id, "Late task", today - Duration::days(5), today - Duration::days(1));
        late.priority = Priority::High;

        let snapshot = Snapshot {
            projects: vec![p],
            tasks: vec![done, soon, late],
            members: vec![],
        };

        let insights = generate(&snapshot, today);
        let priorities: Vec<u8> = insights.iter().map(|i| i.category.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);

        let critical: Vec<&str> = insights
            .iter()
            .filter(|i| i.category == InsightCategory::Critical)
            .map(|i| i.code)
            .collect();
        assert_eq!(critical, vec!["overdue_tasks", "overdue_project", "unassigned_high_priority"]);
        assert_eq!(insights.last().map(|i| i.code), Some("summary"));
    }

    #[test]
    fn generation_is_deterministic() {
        let today = today();
        let p = project("Alpha", ProjectStatus::Active, today - Duration::days(10), today + Duration::days(10), 20);
        let alice = member("Alice");
        let mut tasks = Vec::new();
        for i in 0..6 {
            let mut t = task(p.id, &format!("Task {i}"), today - Duration::days(3), today + Duration::days(i));
            t.assignee_id = Some(alice.id);
            tasks.push(t);
        }
        let snapshot = Snapshot {
            projects: vec![p],
            tasks,
            members: vec![alice],
        };

        let first = serde_json::to_string(&generate(&snapshot, today)).unwrap();
        let second = serde_json::to_string(&generate(&snapshot, today)).unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn empty_snapshot_yields_only_empty_state() {
        let insights = generate(&Snapshot::default(), today());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].code, "empty_state");
        assert_eq!(insights[0].category, InsightCategory::Info);
    }
}
