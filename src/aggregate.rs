//! Reduction of per-(queue, type) rows into a single summary.

use crate::model::{AggregateStat, Filter, JobStat};

/// Aggregates the rows that pass `filter`.
///
/// Counts are summed, `highest_error_count` is the maximum and
/// `oldest_run_at` is the earliest timestamp among rows that have one.
/// No matching rows yields `AggregateStat::default()`.
pub fn aggregate<'a, I>(rows: I, filter: &Filter) -> AggregateStat
where
    I: IntoIterator<Item = &'a JobStat>,
{
    let mut acc = AggregateStat::default();

    for stat in rows.into_iter().filter(|s| filter.matches(s)) {
        acc.count += stat.count;
        acc.count_working += stat.count_working;
        acc.count_errored += stat.count_errored;
        acc.highest_error_count = acc.highest_error_count.max(stat.highest_error_count);

        // Unset accumulator counts as later than any timestamp.
        if let Some(run_at) = stat.oldest_run_at {
            if acc.oldest_run_at.is_none_or(|oldest| run_at < oldest) {
                acc.oldest_run_at = Some(run_at);
            }
        }
    }

    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn row(queue: &str, job_type: &str, count: i64, highest_error_count: i64) -> JobStat {
        JobStat {
            queue: queue.to_string(),
            job_type: job_type.to_string(),
            count,
            highest_error_count,
            ..JobStat::default()
        }
    }

    #[test]
    fn empty_input_is_zero() {
        let rows: Vec<JobStat> = Vec::new();
        let filter = Filter::new(Some("Q".to_string()), Some("a".to_string()));
        assert_eq!(aggregate(&rows, &filter), AggregateStat::default());
        assert_eq!(aggregate(&rows, &Filter::default()), AggregateStat::default());
    }

    #[test]
    fn single_row_without_filter() {
        let rows = vec![JobStat {
            queue: "Q".to_string(),
            job_type: "a".to_string(),
            count: 3,
            count_working: 1,
            ..JobStat::default()
        }];

        let stat = aggregate(&rows, &Filter::default());
        assert_eq!(stat.count, 3);
        assert_eq!(stat.count_working, 1);
        assert_eq!(stat.count_errored, 0);
        assert_eq!(stat.highest_error_count, 0);
        assert_eq!(stat.oldest_run_at, None);
    }

    #[test]
    fn type_filter_excludes_other_rows() {
        let rows = vec![row("Q", "a", 3, 2), row("Q", "b", 5, 7)];

        let stat = aggregate(&rows, &Filter::new(None, Some("a".to_string())));
        assert_eq!(stat.count, 3);
        assert_eq!(stat.highest_error_count, 2);
    }

    #[test]
    fn filter_matching_nothing_is_zero() {
        let rows = vec![row("Q", "a", 3, 2)];
        let stat = aggregate(&rows, &Filter::new(Some("missing".to_string()), None));
        assert_eq!(stat, AggregateStat::default());
    }

    #[test]
    fn sums_and_max_across_rows() {
        let rows = vec![
            JobStat {
                count: 4,
                count_working: 2,
                count_errored: 1,
                highest_error_count: 3,
                ..row("Q", "a", 0, 0)
            },
            JobStat {
                count: 6,
                count_working: 1,
                count_errored: 2,
                highest_error_count: 1,
                ..row("R", "b", 0, 0)
            },
        ];

        let stat = aggregate(&rows, &Filter::default());
        assert_eq!(stat.count, 10);
        assert_eq!(stat.count_working, 3);
        assert_eq!(stat.count_errored, 3);
        assert_eq!(stat.highest_error_count, 3);
    }

    #[test]
    fn earliest_run_at_wins_regardless_of_order() {
        let later = JobStat {
            oldest_run_at: Some(ts(2_000)),
            ..row("Q", "a", 1, 0)
        };
        let earlier = JobStat {
            oldest_run_at: Some(ts(1_000)),
            ..row("Q", "b", 1, 0)
        };

        let forward = [later.clone(), earlier.clone()];
        let backward = [earlier, later];
        assert_eq!(
            aggregate(&forward, &Filter::default()).oldest_run_at,
            Some(ts(1_000))
        );
        assert_eq!(
            aggregate(&backward, &Filter::default()).oldest_run_at,
            Some(ts(1_000))
        );
    }

    #[test]
    fn unset_run_at_never_overrides() {
        let unset = row("Q", "a", 1, 0);
        let set = JobStat {
            oldest_run_at: Some(ts(1_000)),
            ..row("Q", "b", 1, 0)
        };

        for rows in [[unset.clone(), set.clone()], [set, unset]] {
            assert_eq!(
                aggregate(&rows, &Filter::default()).oldest_run_at,
                Some(ts(1_000))
            );
        }
    }

    fn arb_stat() -> impl Strategy<Value = JobStat> {
        (
            "[QR]",
            "[ab]",
            0i64..10_000,
            0i64..1_000,
            0i64..1_000,
            0i64..100,
            proptest::option::of(0i64..2_000_000_000),
        )
            .prop_map(
                |(queue, job_type, count, working, errored, highest, run_at)| JobStat {
                    queue,
                    job_type,
                    count,
                    count_working: working,
                    count_errored: errored,
                    highest_error_count: highest,
                    oldest_run_at: run_at.map(ts),
                },
            )
    }

    proptest! {
        #[test]
        fn count_is_sum_without_filter(rows in proptest::collection::vec(arb_stat(), 0..20)) {
            let stat = aggregate(&rows, &Filter::default());
            prop_assert_eq!(stat.count, rows.iter().map(|r| r.count).sum::<i64>());
            prop_assert_eq!(stat.count_working, rows.iter().map(|r| r.count_working).sum::<i64>());
            prop_assert_eq!(stat.count_errored, rows.iter().map(|r| r.count_errored).sum::<i64>());
        }

        #[test]
        fn highest_error_count_is_max(rows in proptest::collection::vec(arb_stat(), 0..20)) {
            let stat = aggregate(&rows, &Filter::default());
            let expected = rows.iter().map(|r| r.highest_error_count).max().unwrap_or(0);
            prop_assert_eq!(stat.highest_error_count, expected);
        }

        #[test]
        fn oldest_run_at_is_min_of_set(rows in proptest::collection::vec(arb_stat(), 0..20)) {
            let stat = aggregate(&rows, &Filter::default());
            prop_assert_eq!(stat.oldest_run_at, rows.iter().filter_map(|r| r.oldest_run_at).min());
        }

        #[test]
        fn queue_filter_is_restriction(rows in proptest::collection::vec(arb_stat(), 0..20)) {
            let filtered = aggregate(&rows, &Filter::new(Some("Q".to_string()), None));
            let restricted: Vec<JobStat> = rows.iter().filter(|r| r.queue == "Q").cloned().collect();
            prop_assert_eq!(filtered, aggregate(&restricted, &Filter::default()));
        }

        #[test]
        fn repeated_calls_agree(rows in proptest::collection::vec(arb_stat(), 0..20)) {
            let filter = Filter::new(None, Some("a".to_string()));
            prop_assert_eq!(aggregate(&rows, &filter), aggregate(&rows, &filter));
        }

        #[test]
        fn order_does_not_matter(rows in proptest::collection::vec(arb_stat(), 0..20)) {
            let mut reversed = rows.clone();
            reversed.reverse();
            prop_assert_eq!(
                aggregate(&rows, &Filter::default()),
                aggregate(&reversed, &Filter::default())
            );
        }
    }
}
