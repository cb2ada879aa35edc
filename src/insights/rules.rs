use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use super::{Insight, InsightCategory, Snapshot};
use crate::models::project::{Project, ProjectStatus};
use crate::models::task::{Priority, Task, TaskStatus};
use crate::models::team_member::{MemberStatus, TeamMember};

const DUE_SOON_DAYS: i64 = 3;
const OVERLOAD_THRESHOLD: usize = 5;
const TOP_PERFORMER_MIN: usize = 2;
const LISTED_NAMES: usize = 3;
const UNKNOWN_MEMBER: &str = "Unknown";

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 {
        one
    } else {
        many
    }
}

fn quoted_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names
        .take(LISTED_NAMES)
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn member_name(members: &[TeamMember], id: Uuid) -> &str {
    members
        .iter()
        .find(|m| m.id == id)
        .map(|m| m.name.as_str())
        .unwrap_or(UNKNOWN_MEMBER)
}

/// Counts per key, preserving first-seen order.
fn counts_in_order(keys: impl Iterator<Item = Uuid>) -> Vec<(Uuid, usize)> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut counts: Vec<(Uuid, usize)> = Vec::new();
    for key in keys {
        match index.get(&key) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                index.insert(key, counts.len());
                counts.push((key, 1));
            }
        }
    }
    counts
}

/// Expected progress for a project's schedule at `today`, or `None` when the
/// schedule has no usable span or has not started.
fn expected_progress(project: &Project, today: NaiveDate) -> Option<f64> {
    if matches!(project.status, ProjectStatus::Completed | ProjectStatus::OnHold) {
        return None;
    }
    if project.end_date <= project.start_date {
        return None;
    }

    let total_days = (project.end_date - project.start_date).num_days();
    let elapsed_days = (today - project.start_date).num_days();
    if elapsed_days <= 0 || total_days <= 0 {
        return None;
    }

    Some((elapsed_days as f64 / total_days as f64 * 100.0).min(100.0))
}

fn is_overdue(end_date: NaiveDate, completed: bool, today: NaiveDate) -> bool {
    end_date < today && !completed
}

pub(super) fn overdue_tasks(tasks: &[Task], today: NaiveDate) -> Vec<Insight> {
    let overdue: Vec<&Task> = tasks
        .iter()
        .filter(|t| is_overdue(t.end_date, t.status == TaskStatus::Completed, today))
        .collect();

    let mut most_overdue: Option<(&Task, i64)> = None;
    for task in &overdue {
        let days = (today - task.end_date).num_days();
        match most_overdue {
            Some((_, best)) if days <= best => {}
            _ => most_overdue = Some((task, days)),
        }
    }
    let Some((worst, days_late)) = most_overdue else {
        return Vec::new();
    };

    let count = overdue.len();
    let high = overdue.iter().filter(|t| t.priority == Priority::High).count();

    let mut description = format!("{count} {} past the due date.", plural(count, "task is", "tasks are"));
    if high > 0 {
        description.push_str(&format!(" {high} {} high priority.", plural(high, "is", "are")));
    }
    description.push_str(&format!(
        " \"{}\" is {days_late} {} late.",
        worst.name,
        plural(days_late as usize, "day", "days")
    ));

    vec![Insight::new(
        InsightCategory::Critical,
        "overdue_tasks",
        "alert-triangle",
        format!("{count} overdue {}", plural(count, "task", "tasks")),
        description,
    )]
}

pub(super) fn overdue_projects(projects: &[Project], today: NaiveDate) -> Vec<Insight> {
    projects
        .iter()
        .filter(|p| is_overdue(p.end_date, p.status == ProjectStatus::Completed, today))
        .map(|p| {
            let days_late = (today - p.end_date).num_days();
            Insight::new(
                InsightCategory::Critical,
                "overdue_project",
                "folder-clock",
                format!("Project \"{}\" is past its deadline", p.name),
                format!(
                    "The deadline passed {days_late} {} ago and the project is {}% complete.",
                    plural(days_late as usize, "day", "days"),
                    p.progress
                ),
            )
        })
        .collect()
}

pub(super) fn unassigned_high_priority(tasks: &[Task]) -> Vec<Insight> {
    let unassigned: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.priority == Priority::High && t.assignee_id.is_none() && t.status != TaskStatus::Completed)
        .collect();
    if unassigned.is_empty() {
        return Vec::new();
    }

    let count = unassigned.len();
    let mut names = quoted_names(unassigned.iter().map(|t| t.name.as_str()));
    if count > LISTED_NAMES {
        names.push_str(&format!(" and {} more", count - LISTED_NAMES));
    }

    vec![Insight::new(
        InsightCategory::Critical,
        "unassigned_high_priority",
        "user-x",
        format!("{count} high priority {} without an assignee", plural(count, "task", "tasks")),
        format!("{names} {} an assignee.", plural(count, "needs", "need")),
    )]
}

pub(super) fn due_soon_tasks(tasks: &[Task], today: NaiveDate) -> Vec<Insight> {
    let deadline = today + Duration::days(DUE_SOON_DAYS);
    let due_soon: Vec<&Task> = tasks
        .iter()
        .filter(|t| today <= t.end_date && t.end_date <= deadline && t.status != TaskStatus::Completed)
        .collect();
    if due_soon.is_empty() {
        return Vec::new();
    }

    let count = due_soon.len();
    vec![Insight::new(
        InsightCategory::Warning,
        "due_soon",
        "clock",
        format!("{count} {} due in the next {DUE_SOON_DAYS} days", plural(count, "task", "tasks")),
        format!(
            "{} {} attention.",
            quoted_names(due_soon.iter().map(|t| t.name.as_str())),
            plural(count, "needs", "need")
        ),
    )]
}

pub(super) fn overloaded_members(tasks: &[Task], members: &[TeamMember]) -> Vec<Insight> {
    let counts = counts_in_order(
        tasks
            .iter()
            .filter(|t| t.status.is_active())
            .filter_map(|t| t.assignee_id),
    );

    counts
        .into_iter()
        .filter(|(_, count)| *count >= OVERLOAD_THRESHOLD)
        .map(|(id, count)| {
            Insight::new(
                InsightCategory::Warning,
                "overloaded_member",
                "user-cog",
                format!("{} is overloaded", member_name(members, id)),
                format!("{count} active tasks assigned. Consider redistributing the workload."),
            )
        })
        .collect()
}

pub(super) fn behind_schedule_projects(projects: &[Project], today: NaiveDate) -> Vec<Insight> {
    projects
        .iter()
        .filter_map(|p| {
            let expected = expected_progress(p, today)?;
            let actual = p.progress as f64;
            if expected > 30.0 && actual < expected * 0.7 {
                let diff = (expected - actual) as i64;
                Some(Insight::new(
                    InsightCategory::Warning,
                    "behind_schedule",
                    "trending-down",
                    format!("\"{}\" is behind schedule", p.name),
                    format!(
                        "Current progress: {}%. Expected: {}%. Difference of {diff} percentage points.",
                        p.progress, expected as i64
                    ),
                ))
            } else {
                None
            }
        })
        .collect()
}

pub(super) fn recently_completed(tasks: &[Task]) -> Vec<Insight> {
    let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
    if completed == 0 {
        return Vec::new();
    }

    let pct = completed * 100 / tasks.len();
    vec![Insight::new(
        InsightCategory::Positive,
        "recently_completed",
        "check-circle",
        format!("{completed} {} completed", plural(completed, "task", "tasks")),
        format!("{pct}% of all tasks are finished."),
    )]
}

pub(super) fn on_track_projects(projects: &[Project], today: NaiveDate) -> Vec<Insight> {
    let on_track: Vec<&Project> = projects
        .iter()
        .filter(|p| matches!(expected_progress(p, today), Some(expected) if p.progress as f64 >= expected))
        .collect();
    if on_track.is_empty() {
        return Vec::new();
    }

    let count = on_track.len();
    vec![Insight::new(
        InsightCategory::Positive,
        "on_track",
        "trending-up",
        format!("{count} {} on track", plural(count, "project", "projects")),
        format!(
            "{} {} at or above the expected progress.",
            quoted_names(on_track.iter().map(|p| p.name.as_str())),
            plural(count, "is", "are")
        ),
    )]
}

pub(super) fn top_performer(tasks: &[Task], members: &[TeamMember]) -> Vec<Insight> {
    let counts = counts_in_order(
        tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter_map(|t| t.assignee_id),
    );

    let mut top: Option<(Uuid, usize)> = None;
    for (id, count) in counts {
        match top {
            Some((_, best)) if count <= best => {}
            _ => top = Some((id, count)),
        }
    }

    match top {
        Some((id, count)) if count >= TOP_PERFORMER_MIN => vec![Insight::new(
            InsightCategory::Positive,
            "top_performer",
            "trophy",
            format!("{} leads in deliveries", member_name(members, id)),
            format!("{count} completed tasks. Highest number of deliveries on the team."),
        )],
        _ => Vec::new(),
    }
}

pub(super) fn summary_stats(snapshot: &Snapshot) -> Vec<Insight> {
    if snapshot.tasks.is_empty() {
        return vec![Insight::new(
            InsightCategory::Info,
            "empty_state",
            "info",
            "No tasks yet",
            "Create projects and tasks to see detailed insights.",
        )];
    }

    let active_projects = snapshot
        .projects
        .iter()
        .filter(|p| p.status == ProjectStatus::Active)
        .count();
    let active_members = snapshot
        .members
        .iter()
        .filter(|m| m.status == MemberStatus::Active)
        .count();
    let pending = |priority: Priority| {
        snapshot
            .tasks
            .iter()
            .filter(|t| t.priority == priority && t.status != TaskStatus::Completed)
            .count()
    };

    vec![Insight::new(
        InsightCategory::Info,
        "summary",
        "bar-chart",
        "Overview",
        format!(
            "{active_projects} active {}, {active_members} available {}, {} tasks in total. \
             Pending by priority: {} high, {} medium, {} low.",
            plural(active_projects, "project", "projects"),
            plural(active_members, "member", "members"),
            snapshot.tasks.len(),
            pending(Priority::High),
            pending(Priority::Medium),
            pending(Priority::Low),
        ),
    )]
}

#[cfg(test)]
pub(super) mod fixtures {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use crate::models::project::{Project, ProjectStatus};
    use crate::models::task::{Priority, Task, TaskStatus};
    use crate::models::team_member::{MemberStatus, TeamMember};

    pub fn project(name: &str, status: ProjectStatus, start: NaiveDate, end: NaiveDate, progress: i64) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            color: "#3B82F6".to_string(),
            status,
            progress,
            start_date: start,
            end_date: end,
            owner_id: None,
            member_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn task(project_id: Uuid, name: &str, start: NaiveDate, end: NaiveDate) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            project_id,
            name: name.to_string(),
            description: None,
            start_date: start,
            end_date: end,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            progress: 0,
            assignee_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn member(name: &str) -> TeamMember {
        let now = Utc::now();
        TeamMember {
            id: Uuid::new_v4(),
            user_id: None,
            department_id: None,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            job_title: None,
            status: MemberStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::fixtures::{member, project, task};
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn most_overdue_tie_goes_to_first_encountered() {
        let today = today();
        let pid = Uuid::new_v4();
        let a = task(pid, "First", today - Duration::days(9), today - Duration::days(4));
        let b = task(pid, "Second", today - Duration::days(9), today - Duration::days(4));
        let c = task(pid, "Newer", today - Duration::days(9), today - Duration::days(1));

        let insights = overdue_tasks(&[a, b, c], today);
        assert_eq!(insights.len(), 1);
        assert!(insights[0].description.contains("\"First\" is 4 days late"));
        assert_eq!(insights[0].title, "3 overdue tasks");
    }

    #[test]
    fn single_day_overdue_uses_singular() {
        let today = today();
        let t = task(Uuid::new_v4(), "Solo", today - Duration::days(5), today - Duration::days(1));
        let insights = overdue_tasks(&[t], today);
        assert!(insights[0].description.contains("is 1 day late"));
        assert_eq!(insights[0].title, "1 overdue task");
    }

    #[test]
    fn completed_tasks_are_never_overdue() {
        let today = today();
        let mut t = task(Uuid::new_v4(), "Done", today - Duration::days(5), today - Duration::days(2));
        t.status = TaskStatus::Completed;
        t.progress = 100;
        assert!(overdue_tasks(&[t], today).is_empty());
    }

    #[test]
    fn behind_schedule_reports_percentage_point_gap() {
        let today = today();
        let p = project("Alpha", ProjectStatus::Active, today - Duration::days(10), today + Duration::days(10), 20);
        let insights = behind_schedule_projects(&[p], today);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].category, InsightCategory::Warning);
        assert!(insights[0].description.contains("Expected: 50%"));
        assert!(insights[0].description.contains("Difference of 30 percentage points"));
    }

    #[test]
    fn behind_schedule_needs_thirty_percent_elapsed() {
        let today = today();
        // 25% elapsed, zero progress
        let p = project("Early", ProjectStatus::Active, today - Duration::days(5), today + Duration::days(15), 0);
        assert!(behind_schedule_projects(&[p], today).is_empty());
    }

    #[test]
    fn degenerate_spans_are_skipped() {
        let today = today();
        let same_day = project("Same", ProjectStatus::Active, today - Duration::days(2), today - Duration::days(2), 0);
        let inverted = project("Inverted", ProjectStatus::Active, today, today - Duration::days(5), 0);
        let not_started = project("Future", ProjectStatus::Planning, today + Duration::days(1), today + Duration::days(9), 0);

        let all = [same_day, inverted, not_started];
        assert!(behind_schedule_projects(&all, today).is_empty());
        assert!(on_track_projects(&all, today).is_empty());
    }

    #[test]
    fn on_hold_and_completed_projects_are_not_scheduled() {
        let today = today();
        let held = project("Held", ProjectStatus::OnHold, today - Duration::days(10), today + Duration::days(10), 0);
        let done = project("Done", ProjectStatus::Completed, today - Duration::days(10), today + Duration::days(10), 100);
        assert!(behind_schedule_projects(&[held.clone()], today).is_empty());
        assert!(on_track_projects(&[held, done], today).is_empty());
    }

    #[test]
    fn on_track_lists_at_most_three_names() {
        let today = today();
        let projects: Vec<Project> = (0..4)
            .map(|i| {
                project(
                    &format!("P{i}"),
                    ProjectStatus::Active,
                    today - Duration::days(10),
                    today + Duration::days(10),
                    60,
                )
            })
            .collect();

        let insights = on_track_projects(&projects, today);
        assert_eq!(insights[0].title, "4 projects on track");
        assert!(insights[0].description.starts_with("\"P0\", \"P1\", \"P2\" are"));
    }

    #[test]
    fn due_soon_window_is_inclusive() {
        let today = today();
        let pid = Uuid::new_v4();
        let edge_low = task(pid, "Today", today - Duration::days(1), today);
        let edge_high = task(pid, "Three", today, today + Duration::days(3));
        let outside = task(pid, "Four", today, today + Duration::days(4));
        let past = task(pid, "Past", today - Duration::days(4), today - Duration::days(1));

        let insights = due_soon_tasks(&[edge_low, edge_high, outside, past], today);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "2 tasks due in the next 3 days");
        assert!(insights[0].description.contains("\"Today\", \"Three\""));
    }

    #[test]
    fn unassigned_overflow_is_counted() {
        let pid = Uuid::new_v4();
        let day = today();
        let tasks: Vec<Task> = (0..5)
            .map(|i| {
                let mut t = task(pid, &format!("H{i}"), day, day);
                t.priority = Priority::High;
                t
            })
            .collect();

        let insights = unassigned_high_priority(&tasks);
        assert!(insights[0].description.starts_with("\"H0\", \"H1\", \"H2\" and 2 more need"));
    }

    #[test]
    fn overload_counts_only_active_statuses() {
        let day = today();
        let pid = Uuid::new_v4();
        let bob = member("Bob");
        let mut tasks = Vec::new();
        for i in 0..4 {
            let mut t = task(pid, &format!("Active {i}"), day, day);
            t.assignee_id = Some(bob.id);
            t.status = if i % 2 == 0 { TaskStatus::Review } else { TaskStatus::InProgress };
            tasks.push(t);
        }
        let mut finished = task(pid, "Finished", day, day);
        finished.assignee_id = Some(bob.id);
        finished.status = TaskStatus::Completed;
        tasks.push(finished);

        assert!(overloaded_members(&tasks, std::slice::from_ref(&bob)).is_empty());

        let mut fifth = task(pid, "Fifth", day, day);
        fifth.assignee_id = Some(bob.id);
        tasks.push(fifth);

        let insights = overloaded_members(&tasks, &[bob]);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Bob is overloaded");
        assert!(insights[0].description.starts_with("5 active tasks"));
    }

    #[test]
    fn overloaded_assignee_without_member_row_is_unknown() {
        let day = today();
        let ghost = Uuid::new_v4();
        let tasks: Vec<Task> = (0..5)
            .map(|i| {
                let mut t = task(Uuid::new_v4(), &format!("G{i}"), day, day);
                t.assignee_id = Some(ghost);
                t
            })
            .collect();

        let insights = overloaded_members(&tasks, &[]);
        assert_eq!(insights[0].title, "Unknown is overloaded");
    }

    #[test]
    fn top_performer_requires_two_and_prefers_first_seen() {
        let day = today();
        let pid = Uuid::new_v4();
        let ann = member("Ann");
        let ben = member("Ben");

        let done = |who: Uuid, name: &str| {
            let mut t = task(pid, name, day, day);
            t.status = TaskStatus::Completed;
            t.progress = 100;
            t.assignee_id = Some(who);
            t
        };

        let members = [ann.clone(), ben.clone()];
        assert!(top_performer(&[done(ann.id, "a1")], &members).is_empty());

        let tied = [done(ben.id, "b1"), done(ann.id, "a1"), done(ann.id, "a2"), done(ben.id, "b2")];
        let insights = top_performer(&tied, &members);
        assert_eq!(insights[0].title, "Ben leads in deliveries");
    }

    #[test]
    fn completion_percentage_truncates() {
        let day = today();
        let pid = Uuid::new_v4();
        let mut done = task(pid, "done", day, day);
        done.status = TaskStatus::Completed;
        let tasks = [done, task(pid, "b", day, day), task(pid, "c", day, day)];

        let insights = recently_completed(&tasks);
        assert_eq!(insights[0].description, "33% of all tasks are finished.");
    }

    #[test]
    fn summary_counts_pending_by_priority() {
        let day = today();
        let p = project("Live", ProjectStatus::Active, day, day + Duration::days(5), 0);
        let mut high = task(p.id, "h", day, day);
        high.priority = Priority::High;
        let mut low_done = task(p.id, "l", day, day);
        low_done.priority = Priority::Low;
        low_done.status = TaskStatus::Completed;
        let mut away = member("Away");
        away.status = MemberStatus::Away;

        let snapshot = Snapshot {
            projects: vec![p],
            tasks: vec![high, low_done, task(Uuid::new_v4(), "m", day, day)],
            members: vec![member("Here"), away],
        };

        let insights = summary_stats(&snapshot);
        assert_eq!(
            insights[0].description,
            "1 active project, 1 available member, 3 tasks in total. Pending by priority: 1 high, 1 medium, 0 low."
        );
    }
}
