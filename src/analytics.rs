use crate::model::{Activity, ActivityCategory, ActivityStatus, Role, User};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// One calendar month of approved work, keyed `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPoint {
    pub month: String,
    pub label: String,
    pub activities: usize,
    pub points: i64,
}

/// Deterministic cohort comparison. Rank is competition rank (ties share a
/// rank) of the student's approved-point total among all student-role users.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub department_average: f64,
    pub semester_average: f64,
    pub rank: usize,
    pub cohort_size: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_activities: usize,
    pub approved_activities: usize,
    pub pending_activities: usize,
    pub rejected_activities: usize,
    pub total_points: i64,
    pub category_breakdown: BTreeMap<&'static str, i64>,
    pub monthly_progress: Vec<MonthlyPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
}

pub fn student_summary(
    activities: &[Activity],
    users: &[User],
    student_id: &str,
    today: NaiveDate,
) -> Summary {
    let own: Vec<&Activity> = activities
        .iter()
        .filter(|a| a.student_id == student_id)
        .collect();
    let mut summary = summarize(&own, today);
    summary.comparison = Some(comparison(activities, users, student_id));
    summary
}

/// Campus-wide view: same accounting as the per-student variant, no cohort
/// comparison (rank against the whole campus is not meaningful for a scope
/// that is the whole campus).
pub fn global_summary(activities: &[Activity], today: NaiveDate) -> Summary {
    let all: Vec<&Activity> = activities.iter().collect();
    summarize(&all, today)
}

fn summarize(activities: &[&Activity], today: NaiveDate) -> Summary {
    let count = |status: ActivityStatus| activities.iter().filter(|a| a.status == status).count();
    Summary {
        total_activities: activities.len(),
        approved_activities: count(ActivityStatus::Approved),
        pending_activities: count(ActivityStatus::Pending),
        rejected_activities: count(ActivityStatus::Rejected),
        total_points: approved_points(activities.iter().copied()),
        category_breakdown: category_breakdown(activities),
        monthly_progress: monthly_progress(activities, today),
        comparison: None,
    }
}

/// Only approved activities ever contribute points.
pub fn approved_points<'a>(activities: impl Iterator<Item = &'a Activity>) -> i64 {
    activities
        .filter(|a| a.status == ActivityStatus::Approved)
        .map(|a| a.points.unwrap_or(0))
        .sum()
}

/// Always fully populated: every one of the ten categories is present, zeros
/// included, so chart consumers never see a sparse map.
pub fn category_breakdown(activities: &[&Activity]) -> BTreeMap<&'static str, i64> {
    let mut breakdown: BTreeMap<&'static str, i64> = ActivityCategory::ALL
        .iter()
        .map(|c| (c.as_str(), 0))
        .collect();
    for a in activities {
        if a.status == ActivityStatus::Approved {
            *breakdown.entry(a.category.as_str()).or_insert(0) += a.points.unwrap_or(0);
        }
    }
    breakdown
}

/// Six calendar months ending with `today`'s month, oldest first. Activity
/// dates are matched by their `YYYY-MM` prefix; only approved records count.
pub fn monthly_progress(activities: &[&Activity], today: NaiveDate) -> Vec<MonthlyPoint> {
    (0..6)
        .rev()
        .map(|back| {
            let (year, month) = shift_month(today.year(), today.month(), back);
            let key = format!("{:04}-{:02}", year, month);
            let label = NaiveDate::from_ymd_opt(year, month, 1)
                .map(|d| d.format("%b %Y").to_string())
                .unwrap_or_else(|| key.clone());
            let in_month: Vec<&&Activity> = activities
                .iter()
                .filter(|a| a.status == ActivityStatus::Approved && a.date.starts_with(&key))
                .collect();
            MonthlyPoint {
                month: key,
                label,
                activities: in_month.len(),
                points: in_month.iter().map(|a| a.points.unwrap_or(0)).sum(),
            }
        })
        .collect()
}

fn shift_month(year: i32, month: u32, back: i32) -> (i32, u32) {
    let total = year * 12 + month as i32 - 1 - back;
    (total.div_euclid(12), total.rem_euclid(12) as u32 + 1)
}

fn comparison(activities: &[Activity], users: &[User], student_id: &str) -> Comparison {
    let students: Vec<&User> = users.iter().filter(|u| u.role == Role::Student).collect();
    let total_for =
        |uid: &str| approved_points(activities.iter().filter(|a| a.student_id == uid));
    let own_total = total_for(student_id);
    let rank = 1 + students
        .iter()
        .filter(|u| u.id != student_id && total_for(&u.id) > own_total)
        .count();

    let me = students.iter().find(|u| u.id == student_id);
    let department = me.and_then(|m| m.department.as_deref());
    let semester = me.and_then(|m| m.semester);

    let mut dept_totals: Vec<i64> = Vec::new();
    let mut sem_totals: Vec<i64> = Vec::new();
    for u in &students {
        let total = total_for(&u.id);
        if department.is_some() && u.department.as_deref() == department {
            dept_totals.push(total);
        }
        if semester.is_some() && u.semester == semester {
            sem_totals.push(total);
        }
    }

    Comparison {
        department_average: mean(&dept_totals),
        semester_average: mean(&sem_totals),
        rank,
        cohort_size: students.len(),
    }
}

fn mean(totals: &[i64]) -> f64 {
    if totals.is_empty() {
        return 0.0;
    }
    totals.iter().map(|&t| t as f64).sum::<f64>() / totals.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivityCategory, ActivityType};

    fn activity(
        id: &str,
        student: &str,
        status: ActivityStatus,
        category: ActivityCategory,
        date: &str,
        points: Option<i64>,
    ) -> Activity {
        Activity {
            id: id.to_string(),
            title: format!("activity {id}"),
            description: String::new(),
            category,
            kind: ActivityType::Seminar,
            date: date.to_string(),
            duration: None,
            location: None,
            organizer: None,
            certificates: None,
            images: None,
            status,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            points,
            student_id: student.to_string(),
            created_at: format!("{date}T00:00:00Z"),
            updated_at: format!("{date}T00:00:00Z"),
        }
    }

    fn student(id: &str, department: &str, semester: i64) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@demo.com"),
            password: None,
            name: id.to_string(),
            role: Role::Student,
            student_id: Some(format!("S{id}")),
            department: Some(department.to_string()),
            semester: Some(semester),
            avatar: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 30).expect("date")
    }

    #[test]
    fn total_points_sums_approved_only() {
        let acts = vec![
            activity("1", "u1", ActivityStatus::Approved, ActivityCategory::Research, "2025-08-01", Some(25)),
            activity("2", "u1", ActivityStatus::Approved, ActivityCategory::Workshop, "2025-07-10", Some(5)),
            activity("3", "u1", ActivityStatus::Pending, ActivityCategory::Research, "2025-08-02", Some(99)),
            activity("4", "u1", ActivityStatus::Rejected, ActivityCategory::Academic, "2025-06-01", Some(40)),
            activity("5", "u2", ActivityStatus::Approved, ActivityCategory::Academic, "2025-08-03", Some(10)),
        ];
        let summary = student_summary(&acts, &[student("u1", "CS", 6)], "u1", today());
        assert_eq!(summary.total_points, 30);
        assert_eq!(summary.total_activities, 4);
        assert_eq!(summary.approved_activities, 2);
        assert_eq!(summary.pending_activities, 1);
        assert_eq!(summary.rejected_activities, 1);
    }

    #[test]
    fn empty_scope_has_zero_points_and_full_breakdown() {
        let summary = student_summary(&[], &[], "ghost", today());
        assert_eq!(summary.total_points, 0);
        assert_eq!(summary.category_breakdown.len(), 10);
        assert!(summary.category_breakdown.values().all(|&v| v == 0));
    }

    #[test]
    fn breakdown_has_all_ten_keys_and_buckets_points_by_category() {
        let acts = vec![
            activity("1", "u1", ActivityStatus::Approved, ActivityCategory::Research, "2025-08-01", Some(25)),
            activity("2", "u1", ActivityStatus::Approved, ActivityCategory::Research, "2025-07-01", Some(25)),
            activity("3", "u1", ActivityStatus::Pending, ActivityCategory::Workshop, "2025-08-01", Some(5)),
        ];
        let refs: Vec<&Activity> = acts.iter().collect();
        let breakdown = category_breakdown(&refs);
        assert_eq!(breakdown.len(), 10);
        assert_eq!(breakdown["research"], 50);
        assert_eq!(breakdown["workshop"], 0);
        assert_eq!(breakdown["community-service"], 0);
    }

    #[test]
    fn monthly_progress_covers_six_months_oldest_first() {
        let acts = vec![
            activity("1", "u1", ActivityStatus::Approved, ActivityCategory::Academic, "2025-08-12", Some(10)),
            activity("2", "u1", ActivityStatus::Approved, ActivityCategory::Academic, "2025-03-05", Some(5)),
            // Outside the window.
            activity("3", "u1", ActivityStatus::Approved, ActivityCategory::Academic, "2025-02-28", Some(99)),
            // In the window but not approved.
            activity("4", "u1", ActivityStatus::Pending, ActivityCategory::Academic, "2025-08-13", Some(99)),
        ];
        let refs: Vec<&Activity> = acts.iter().collect();
        let months = monthly_progress(&refs, today());
        assert_eq!(months.len(), 6);
        assert_eq!(months[0].month, "2025-03");
        assert_eq!(months[5].month, "2025-08");
        assert_eq!(months[0].points, 5);
        assert_eq!(months[5].points, 10);
        assert_eq!(months[5].activities, 1);
        assert_eq!(months[1].points, 0);
    }

    #[test]
    fn month_window_crosses_year_boundaries() {
        let jan = NaiveDate::from_ymd_opt(2026, 1, 15).expect("date");
        let months = monthly_progress(&[], jan);
        let keys: Vec<&str> = months.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(keys, vec!["2025-08", "2025-09", "2025-10", "2025-11", "2025-12", "2026-01"]);
        assert_eq!(months[5].label, "Jan 2026");
    }

    #[test]
    fn rank_is_deterministic_competition_rank() {
        let users = vec![student("u1", "CS", 6), student("u2", "CS", 6), student("u3", "ME", 4)];
        let acts = vec![
            activity("1", "u1", ActivityStatus::Approved, ActivityCategory::Academic, "2025-08-01", Some(10)),
            activity("2", "u2", ActivityStatus::Approved, ActivityCategory::Research, "2025-08-01", Some(25)),
            activity("3", "u3", ActivityStatus::Approved, ActivityCategory::Academic, "2025-08-01", Some(10)),
        ];
        let cmp = student_summary(&acts, &users, "u1", today()).comparison.expect("comparison");
        assert_eq!(cmp.rank, 2);
        assert_eq!(cmp.cohort_size, 3);
        // u1 and u3 tie on 10 points; both rank 2.
        let cmp3 = student_summary(&acts, &users, "u3", today()).comparison.expect("comparison");
        assert_eq!(cmp3.rank, 2);
        let cmp2 = student_summary(&acts, &users, "u2", today()).comparison.expect("comparison");
        assert_eq!(cmp2.rank, 1);
        // Department average only spans the student's own department.
        assert_eq!(cmp.department_average, 17.5);
        assert_eq!(cmp3.department_average, 10.0);
    }

    #[test]
    fn global_summary_sums_real_points_and_skips_comparison() {
        let acts = vec![
            activity("1", "u1", ActivityStatus::Approved, ActivityCategory::Academic, "2025-08-01", Some(10)),
            activity("2", "u2", ActivityStatus::Approved, ActivityCategory::Research, "2025-08-01", Some(25)),
            activity("3", "u2", ActivityStatus::Pending, ActivityCategory::Research, "2025-08-01", None),
        ];
        let summary = global_summary(&acts, today());
        // Real recorded points, not approvedCount * 10.
        assert_eq!(summary.total_points, 35);
        assert_eq!(summary.total_activities, 3);
        assert!(summary.comparison.is_none());
    }
}
