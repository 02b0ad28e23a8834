//! SQL queries against the `que_jobs` table.

/// Per-(queue, job class) statistics.
///
/// A job counts as working while a worker holds the advisory lock keyed by
/// its `job_id`. `oldest_run_at` is epoch seconds, 0 when no job is pending.
pub(super) const JOB_STATS_QUERY: &str = r#"
    SELECT
        queue,
        job_class,
        count(*)::bigint AS count,
        count(locks.job_id)::bigint AS count_working,
        COALESCE(sum((error_count > 0)::int), 0)::bigint AS count_errored,
        COALESCE(max(error_count), 0)::bigint AS highest_error_count,
        COALESCE(EXTRACT(EPOCH FROM min(run_at))::bigint, 0) AS oldest_run_at
    FROM que_jobs
    LEFT JOIN (
        SELECT (classid::bigint << 32) + objid::bigint AS job_id
        FROM pg_locks
        WHERE locktype = 'advisory'
    ) locks USING (job_id)
    GROUP BY queue, job_class
    ORDER BY count(*) DESC
"#;
