//! Manager dashboard aggregates.
//!
//! Calendar fields are taken in UTC.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Utc};
use folhas_core::{Designer, DesignerId, Job, WorkOrder};

pub const UNASSIGNED: &str = "unassigned";
const TOP_JOBS: usize = 10;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    /// Year and month, 1-12.
    Month(i32, u32),
}

impl Period {
    pub fn year(&self) -> i32 {
        match self {
            Period::Year(y) | Period::Month(y, _) => *y,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        match self {
            Period::Year(y) => at.year() == *y,
            Period::Month(y, m) => at.year() == *y && at.month() == *m,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesignerCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesignerAverage {
    pub name: String,
    pub average_days: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopJob {
    pub work_order: WorkOrder,
    pub item: String,
    /// Turnaround, if the job is completed.
    pub days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignerTop {
    pub designer: DesignerId,
    pub name: String,
    pub jobs: Vec<TopJob>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total: usize,
    pub per_designer: Vec<DesignerCount>,
    pub average_days_per_designer: Vec<DesignerAverage>,
    pub overall_average_days: f64,
    /// Jobs opened in each month of the period's year, January first.
    pub opened_per_month: [usize; 12],
    pub top_per_designer: Vec<DesignerTop>,
    /// Every creation year in the data, newest first.
    pub available_years: Vec<i32>,
}

/// Whole days from creation to completion, rounded up.
pub fn turnaround_days(job: &Job) -> Option<i64> {
    let done = job.completed_at?;
    let ms = (done - job.created_at).num_milliseconds().abs();
    Some((ms + DAY_MS - 1) / DAY_MS)
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn average(days: &[i64]) -> f64 {
    if days.is_empty() {
        return 0.0;
    }
    round1(days.iter().sum::<i64>() as f64 / days.len() as f64)
}

pub fn available_years(jobs: &[Job]) -> Vec<i32> {
    let years: BTreeSet<i32> = jobs.iter().map(|j| j.created_at.year()).collect();
    years.into_iter().rev().collect()
}

pub fn compute(jobs: &[Job], designers: &[Designer], period: Period) -> Metrics {
    let names: HashMap<DesignerId, &str> =
        designers.iter().map(|d| (d.id, d.name.as_str())).collect();
    let label = |id: Option<DesignerId>| match id {
        None => UNASSIGNED.to_string(),
        Some(id) => names.get(&id).map_or_else(|| id.to_string(), |n| n.to_string()),
    };

    let in_period: Vec<&Job> = jobs.iter().filter(|j| period.contains(j.created_at)).collect();

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut turnaround: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    let mut all_days = Vec::new();
    for job in &in_period {
        let name = label(job.designer);
        *counts.entry(name.clone()).or_default() += 1;
        if let Some(days) = turnaround_days(job) {
            turnaround.entry(name).or_default().push(days);
            all_days.push(days);
        }
    }

    let mut opened_per_month = [0usize; 12];
    for job in jobs.iter().filter(|j| j.created_at.year() == period.year()) {
        opened_per_month[job.created_at.month0() as usize] += 1;
    }

    let top_per_designer = designers
        .iter()
        .filter(|d| d.active)
        .map(|d| {
            let mut mine: Vec<&Job> = in_period
                .iter()
                .copied()
                .filter(|j| j.designer == Some(d.id))
                .collect();
            mine.sort_by(|a, b| b.work_order.cmp(&a.work_order));
            DesignerTop {
                designer: d.id,
                name: d.name.clone(),
                jobs: mine
                    .into_iter()
                    .take(TOP_JOBS)
                    .map(|j| TopJob {
                        work_order: j.work_order,
                        item: j.item.clone(),
                        days: turnaround_days(j),
                    })
                    .collect(),
            }
        })
        .collect();

    Metrics {
        total: in_period.len(),
        per_designer: counts
            .into_iter()
            .map(|(name, count)| DesignerCount { name, count })
            .collect(),
        average_days_per_designer: turnaround
            .into_iter()
            .map(|(name, days)| DesignerAverage {
                average_days: average(&days),
                name,
            })
            .collect(),
        overall_average_days: average(&all_days),
        opened_per_month,
        top_per_designer,
        available_years: available_years(jobs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use folhas_core::{JobId, Revision};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn job(n: u16, created: DateTime<Utc>, designer: Option<DesignerId>) -> Job {
        Job {
            id: JobId::new(),
            work_order: WorkOrder::new(n).unwrap(),
            item: format!("item {n}"),
            created_at: created,
            designer,
            in_progress: false,
            has_questions: false,
            mockup_sent: false,
            paginated: false,
            questions_at: None,
            mockup_sent_at: None,
            completed_at: None,
            path: None,
            revision: Revision::ZERO,
        }
    }

    fn designer(name: &str) -> Designer {
        Designer {
            id: DesignerId::new(),
            name: name.into(),
            email: None,
            active: true,
        }
    }

    #[test]
    fn turnaround_rounds_up_partial_days() {
        let mut j = job(1, at(2024, 3, 1), None);
        assert_eq!(turnaround_days(&j), None);
        j.completed_at = Some(j.created_at);
        assert_eq!(turnaround_days(&j), Some(0));
        j.completed_at = Some(j.created_at + Duration::hours(1));
        assert_eq!(turnaround_days(&j), Some(1));
        j.completed_at = Some(j.created_at + Duration::days(2) + Duration::minutes(1));
        assert_eq!(turnaround_days(&j), Some(3));
    }

    #[test]
    fn groups_by_designer_and_period() {
        let ana = designer("Ana");
        let mut a = job(10, at(2024, 1, 5), Some(ana.id));
        a.completed_at = Some(a.created_at + Duration::days(1));
        let mut b = job(11, at(2024, 1, 20), Some(ana.id));
        b.completed_at = Some(b.created_at + Duration::days(2));
        let c = job(12, at(2024, 2, 1), None);
        let d = job(13, at(2023, 12, 31), Some(ana.id));
        let jobs = vec![a, b, c, d];

        let year = compute(&jobs, &[ana.clone()], Period::Year(2024));
        assert_eq!(year.total, 3);
        assert_eq!(
            year.per_designer,
            vec![
                DesignerCount { name: "Ana".into(), count: 2 },
                DesignerCount { name: UNASSIGNED.into(), count: 1 },
            ]
        );
        assert_eq!(year.average_days_per_designer[0].average_days, 1.5);
        assert_eq!(year.overall_average_days, 1.5);
        assert_eq!(year.opened_per_month[0], 2);
        assert_eq!(year.opened_per_month[1], 1);
        assert_eq!(year.available_years, vec![2024, 2023]);

        let feb = compute(&jobs, &[ana], Period::Month(2024, 2));
        assert_eq!(feb.total, 1);
        assert_eq!(feb.opened_per_month[0], 2);
        assert_eq!(feb.overall_average_days, 0.0);
    }

    #[test]
    fn averages_round_to_one_decimal() {
        assert_eq!(average(&[1, 1, 2]), 1.3);
        assert_eq!(average(&[]), 0.0);
    }

    #[test]
    fn top_jobs_are_highest_work_orders() {
        let ana = designer("Ana");
        let jobs: Vec<Job> = (1..=12)
            .map(|n| job(n * 100, at(2024, 6, 1), Some(ana.id)))
            .collect();
        let m = compute(&jobs, std::slice::from_ref(&ana), Period::Year(2024));
        let top = &m.top_per_designer[0];
        assert_eq!(top.jobs.len(), 10);
        assert_eq!(top.jobs[0].work_order.get(), 1200);
        assert_eq!(top.jobs[9].work_order.get(), 300);
    }
}
