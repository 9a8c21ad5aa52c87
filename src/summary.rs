// 📊 Summary - Read-only aggregations for the CLI and viewer
// Nothing here feeds back into reconciliation.

use crate::hr;
use crate::table::{EntityId, Table, Value};
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;

/// Age buckets as half-open ranges [lower, upper)
pub const AGE_BUCKETS: &[(i64, i64, &str)] = &[
    (15, 25, "16-24"),
    (25, 35, "25-34"),
    (35, 45, "35-44"),
    (45, 55, "45-54"),
    (55, 65, "55-64"),
    (65, 120, "65+"),
];

pub const DEFAULT_GROWTH_TOP_N: usize = 10;
pub const DEFAULT_TOP_TITLES: usize = 15;
pub const DEFAULT_SALARY_BINS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub group: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    pub group: String,
    pub mean: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalaryGrowth {
    pub entity: EntityId,
    pub min: f64,
    pub max: f64,
    pub growth_pct: f64,
}

/// Rows per distinct value of `column`, largest group first
///
/// Unknown cells are counted under `unknown_marker`. A missing column yields
/// nothing.
pub fn headcount_by(snapshot: &Table, column: &str, unknown_marker: &str) -> Vec<GroupCount> {
    let Some(values) = snapshot.column_values(column) else {
        return Vec::new();
    };

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value.render(unknown_marker)).or_insert(0) += 1;
    }

    let mut groups: Vec<GroupCount> = counts
        .into_iter()
        .map(|(group, count)| GroupCount { group, count })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.group.cmp(&b.group)));
    groups
}

/// Count of ages per bucket, every bucket listed in order
///
/// Non-numeric ages and ages outside every bucket are not counted.
pub fn age_group_distribution(snapshot: &Table, age_column: &str) -> Vec<GroupCount> {
    let mut counts = vec![0usize; AGE_BUCKETS.len()];

    if let Some(values) = snapshot.column_values(age_column) {
        for age in values.filter_map(Value::as_f64) {
            if let Some(idx) = AGE_BUCKETS
                .iter()
                .position(|(lo, hi, _)| age >= *lo as f64 && age < *hi as f64)
            {
                counts[idx] += 1;
            }
        }
    }

    AGE_BUCKETS
        .iter()
        .zip(counts)
        .map(|((_, _, label), count)| GroupCount {
            group: label.to_string(),
            count,
        })
        .collect()
}

/// Mean of `value_column` per group of `group_column`, highest mean first
///
/// Only numeric cells contribute; groups with none are omitted.
pub fn mean_by(
    snapshot: &Table,
    group_column: &str,
    value_column: &str,
    unknown_marker: &str,
) -> Vec<GroupMean> {
    let (Some(group_idx), Some(value_idx)) = (
        snapshot.column_index(group_column),
        snapshot.column_index(value_column),
    ) else {
        return Vec::new();
    };

    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for row in snapshot.rows() {
        if let Some(v) = row[value_idx].as_f64() {
            let entry = sums
                .entry(row[group_idx].render(unknown_marker))
                .or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }

    let mut means: Vec<GroupMean> = sums
        .into_iter()
        .map(|(group, (sum, count))| GroupMean {
            group,
            mean: sum / count as f64,
            count,
        })
        .collect();
    means.sort_by(|a, b| b.mean.total_cmp(&a.mean).then_with(|| a.group.cmp(&b.group)));
    means
}

/// Entities with the largest (max - min) / min salary growth
///
/// Entities whose smallest recorded amount is not positive are skipped.
pub fn top_salary_growth(
    salary: &Table,
    key_column: &str,
    amount_column: &str,
    n: usize,
) -> Vec<SalaryGrowth> {
    let (Some(key_idx), Some(amount_idx)) = (
        salary.column_index(key_column),
        salary.column_index(amount_column),
    ) else {
        return Vec::new();
    };

    let mut ranges: BTreeMap<EntityId, (f64, f64)> = BTreeMap::new();
    for row in salary.rows() {
        let (Some(id), Some(amount)) = (EntityId::from_value(&row[key_idx]), row[amount_idx].as_f64())
        else {
            continue;
        };
        ranges
            .entry(id)
            .and_modify(|(lo, hi)| {
                *lo = lo.min(amount);
                *hi = hi.max(amount);
            })
            .or_insert((amount, amount));
    }

    let mut growth: Vec<SalaryGrowth> = ranges
        .into_iter()
        .filter(|(_, (min, _))| *min > 0.0)
        .map(|(entity, (min, max))| SalaryGrowth {
            entity,
            min,
            max,
            growth_pct: (max - min) / min * 100.0,
        })
        .collect();

    growth.sort_by(|a, b| {
        b.growth_pct
            .total_cmp(&a.growth_pct)
            .then_with(|| a.entity.cmp(&b.entity))
    });
    growth.truncate(n);
    growth
}

/// Mean of `amount_column` per calendar year of `date_column`, oldest first
///
/// Rows without a parsed timestamp or a numeric amount are skipped.
pub fn mean_by_year(table: &Table, date_column: &str, amount_column: &str) -> Vec<GroupMean> {
    let (Some(date_idx), Some(amount_idx)) = (
        table.column_index(date_column),
        table.column_index(amount_column),
    ) else {
        return Vec::new();
    };

    let mut sums: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for row in table.rows() {
        let (Some(ts), Some(amount)) = (row[date_idx].as_timestamp(), row[amount_idx].as_f64()) else {
            continue;
        };
        let entry = sums.entry(ts.year()).or_insert((0.0, 0));
        entry.0 += amount;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(year, (sum, count))| GroupMean {
            group: year.to_string(),
            mean: sum / count as f64,
            count,
        })
        .collect()
}

/// Histogram of the numeric cells of `column` over `bins` equal-width bins
///
/// The last bin includes the maximum. When every value is equal there is a
/// single bin.
pub fn distribution(table: &Table, column: &str, bins: usize) -> Vec<GroupCount> {
    let Some(values) = table.column_values(column) else {
        return Vec::new();
    };
    let values: Vec<f64> = values.filter_map(Value::as_f64).collect();
    if bins == 0 || values.is_empty() {
        return Vec::new();
    }

    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let bins = if hi > lo { bins } else { 1 };
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in &values {
        let idx = if width > 0.0 {
            (((v - lo) / width) as usize).min(bins - 1)
        } else {
            0
        };
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let start = lo + width * i as f64;
            let end = if i + 1 == bins { hi } else { start + width };
            GroupCount {
                group: format!("{:.0}-{:.0}", start, end),
                count,
            }
        })
        .collect()
}

/// First of `candidates` that `table` has
pub fn first_column<'a>(table: &Table, candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|c| table.has_column(c))
}

// ============================================================================
// WORKFORCE SUMMARY
// ============================================================================

/// Every aggregate the `summary` command and the viewer show
///
/// Sections whose columns are absent stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkforceSummary {
    pub headcount_by_department: Vec<GroupCount>,
    pub gender: Vec<GroupCount>,
    pub age_groups: Vec<GroupCount>,
    pub top_titles: Vec<GroupCount>,
    pub location: Vec<GroupCount>,
    pub employment_type: Vec<GroupCount>,
    pub salary_by_year: Vec<GroupMean>,
    pub salary_histogram: Vec<GroupCount>,
    pub salary_by_department: Vec<GroupMean>,
    pub salary_by_gender: Vec<GroupMean>,
    pub salary_growth: Vec<SalaryGrowth>,
}

impl WorkforceSummary {
    /// Aggregate an employee snapshot, plus the salary history when loaded
    pub fn build(snapshot: &Table, salary: Option<&Table>, unknown_marker: &str) -> Self {
        let optional_headcount = |candidates: &[&str]| {
            first_column(snapshot, candidates)
                .map(|column| headcount_by(snapshot, column, unknown_marker))
                .unwrap_or_default()
        };

        let mut top_titles = headcount_by(snapshot, hr::TITLE_ATTR, unknown_marker);
        top_titles.truncate(DEFAULT_TOP_TITLES);

        let (salary_by_year, salary_growth) = match salary {
            Some(history) => (
                mean_by_year(history, hr::FROM_DATE, hr::AMOUNT),
                top_salary_growth(history, hr::EMPLOYEE_ID, hr::AMOUNT, DEFAULT_GROWTH_TOP_N),
            ),
            None => (Vec::new(), Vec::new()),
        };

        WorkforceSummary {
            headcount_by_department: headcount_by(snapshot, hr::DEPT_NAME, unknown_marker),
            gender: headcount_by(snapshot, hr::GENDER, unknown_marker),
            age_groups: age_group_distribution(snapshot, hr::AGE),
            top_titles,
            location: optional_headcount(hr::LOCATION_COLUMNS),
            employment_type: optional_headcount(hr::EMPLOYMENT_TYPE_COLUMNS),
            salary_by_year,
            salary_histogram: distribution(snapshot, hr::LATEST_SALARY, DEFAULT_SALARY_BINS),
            salary_by_department: mean_by(snapshot, hr::DEPT_NAME, hr::LATEST_SALARY, unknown_marker),
            salary_by_gender: mean_by(snapshot, hr::GENDER, hr::LATEST_SALARY, unknown_marker),
            salary_growth,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Table {
        Table::from_rows(
            "snap",
            ["employee_id", "dept_name", "age", "latest_salary"],
            vec![
                vec![Value::Int(1), Value::text("Sales"), Value::Int(24), Value::Int(50_000)],
                vec![Value::Int(2), Value::text("Sales"), Value::Int(25), Value::Unknown],
                vec![Value::Int(3), Value::text("R&D"), Value::Int(70), Value::Int(90_000)],
                vec![Value::Int(4), Value::Unknown, Value::Int(10), Value::Float(40_000.0)],
                vec![Value::Int(5), Value::text("R&D"), Value::Unknown, Value::Int(70_000)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_headcount_groups_unknown_under_marker() {
        let counts = headcount_by(&snapshot(), "dept_name", "N/A");
        assert_eq!(
            counts,
            vec![
                GroupCount { group: "R&D".into(), count: 2 },
                GroupCount { group: "Sales".into(), count: 2 },
                GroupCount { group: "N/A".into(), count: 1 },
            ]
        );
        assert!(headcount_by(&snapshot(), "region", "N/A").is_empty());
    }

    #[test]
    fn test_age_groups_are_half_open() {
        let groups = age_group_distribution(&snapshot(), "age");
        assert_eq!(groups.len(), 6);
        assert_eq!(groups[0].count, 1); // 24
        assert_eq!(groups[1].count, 1); // 25
        assert_eq!(groups[5].count, 1); // 70
        // age 10 and unknown are outside every bucket
        assert_eq!(groups.iter().map(|g| g.count).sum::<usize>(), 3);
    }

    #[test]
    fn test_mean_by_skips_non_numeric() {
        let means = mean_by(&snapshot(), "dept_name", "latest_salary", "N/A");
        assert_eq!(means[0].group, "R&D");
        assert_eq!(means[0].mean, 80_000.0);
        assert_eq!(means[0].count, 2);

        let sales = means.iter().find(|m| m.group == "Sales").unwrap();
        assert_eq!(sales.count, 1);
        assert_eq!(sales.mean, 50_000.0);
    }

    #[test]
    fn test_salary_growth() {
        let salary = Table::from_rows(
            "salary",
            ["employee_id", "amount"],
            vec![
                vec![Value::Int(1), Value::Int(100)],
                vec![Value::Int(1), Value::Int(150)],
                vec![Value::Int(2), Value::Int(100)],
                vec![Value::Int(2), Value::Int(300)],
                vec![Value::Int(3), Value::Int(0)],
                vec![Value::Int(3), Value::Int(500)],
                vec![Value::Int(4), Value::Unknown],
            ],
        )
        .unwrap();

        let top = top_salary_growth(&salary, "employee_id", "amount", 10);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].entity, EntityId::Int(2));
        assert_eq!(top[0].growth_pct, 200.0);
        assert_eq!(top[1].growth_pct, 50.0);

        assert_eq!(top_salary_growth(&salary, "employee_id", "amount", 1).len(), 1);
    }

    fn day(y: i32, m: u32, d: u32) -> Value {
        Value::Timestamp(
            chrono::NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_mean_by_year() {
        let salary = Table::from_rows(
            "salary",
            ["employee_id", "amount", "from_date"],
            vec![
                vec![Value::Int(1), Value::Int(100), day(2021, 3, 1)],
                vec![Value::Int(2), Value::Int(300), day(2021, 9, 1)],
                vec![Value::Int(1), Value::Int(150), day(2020, 1, 1)],
                vec![Value::Int(3), Value::Int(999), Value::Invalid("bad-date".into())],
                vec![Value::Int(3), Value::Unknown, day(2022, 1, 1)],
            ],
        )
        .unwrap();

        let years = mean_by_year(&salary, "from_date", "amount");
        assert_eq!(
            years,
            vec![
                GroupMean { group: "2020".into(), mean: 150.0, count: 1 },
                GroupMean { group: "2021".into(), mean: 200.0, count: 2 },
            ]
        );
        assert!(mean_by_year(&salary, "to_date", "amount").is_empty());
    }

    #[test]
    fn test_distribution_bins() {
        let table = Table::from_rows(
            "snap",
            ["latest_salary"],
            (0..=10).map(|i| vec![Value::Int(i * 10)]).chain([vec![Value::Unknown]]),
        )
        .unwrap();

        let bins = distribution(&table, "latest_salary", 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.iter().map(|b| b.count).collect::<Vec<_>>(), vec![2, 2, 2, 2, 3]);
        assert_eq!(bins[0].group, "0-20");
        assert_eq!(bins[4].group, "80-100");

        assert!(distribution(&table, "latest_salary", 0).is_empty());
        assert!(distribution(&table, "age", 5).is_empty());
    }

    #[test]
    fn test_distribution_single_value() {
        let table = Table::from_rows("snap", ["x"], vec![vec![Value::Int(7)], vec![Value::Int(7)]]).unwrap();
        assert_eq!(
            distribution(&table, "x", 4),
            vec![GroupCount { group: "7-7".into(), count: 2 }]
        );
    }

    #[test]
    fn test_workforce_summary_sections() {
        let snapshot = Table::from_rows(
            "snap",
            ["employee_id", "gender", "office", "title", "dept_name", "age", "latest_salary"],
            vec![
                vec![Value::Int(1), Value::text("F"), Value::text("Lima"), Value::text("Engineer"), Value::text("R&D"), Value::Int(30), Value::Int(100)],
                vec![Value::Int(2), Value::text("M"), Value::text("Lima"), Value::text("Engineer"), Value::text("R&D"), Value::Int(40), Value::Int(200)],
                vec![Value::Int(3), Value::text("F"), Value::text("Quito"), Value::Unknown, Value::text("Sales"), Value::Int(50), Value::Int(300)],
            ],
        )
        .unwrap();
        let salary = Table::from_rows(
            "salary",
            ["employee_id", "amount", "from_date"],
            vec![
                vec![Value::Int(1), Value::Int(50), day(2020, 1, 1)],
                vec![Value::Int(1), Value::Int(100), day(2021, 1, 1)],
            ],
        )
        .unwrap();

        let summary = WorkforceSummary::build(&snapshot, Some(&salary), "N/A");

        assert_eq!(summary.gender[0], GroupCount { group: "F".into(), count: 2 });
        assert_eq!(summary.location[0], GroupCount { group: "Lima".into(), count: 2 });
        assert!(summary.employment_type.is_empty());
        assert_eq!(summary.top_titles[0], GroupCount { group: "Engineer".into(), count: 2 });
        assert!(summary.top_titles.iter().any(|g| g.group == "N/A"));

        let women = summary.salary_by_gender.iter().find(|g| g.group == "F").unwrap();
        assert_eq!(women.mean, 200.0);
        assert_eq!(summary.salary_by_department[0].group, "Sales");
        assert_eq!(summary.salary_by_year.len(), 2);
        assert_eq!(summary.salary_growth[0].growth_pct, 100.0);
        assert_eq!(summary.salary_histogram.iter().map(|g| g.count).sum::<usize>(), 3);

        let without_history = WorkforceSummary::build(&snapshot, None, "N/A");
        assert!(without_history.salary_by_year.is_empty());
        assert!(without_history.salary_growth.is_empty());
    }

    #[test]
    fn test_top_titles_capped() {
        let snapshot = Table::from_rows(
            "snap",
            ["employee_id", "title"],
            (0..20).map(|i| vec![Value::Int(i), Value::text(format!("Title {:02}", i))]),
        )
        .unwrap();
        let summary = WorkforceSummary::build(&snapshot, None, "N/A");
        assert_eq!(summary.top_titles.len(), DEFAULT_TOP_TITLES);
        assert!(summary.headcount_by_department.is_empty());
    }
}
