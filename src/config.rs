use std::time::Duration;

/// Business thresholds and retrieval limits for one engine run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum acceptable average ticket size for a day.
    pub benchmark: f64,
    /// Share of underperforming days above which an alert escalates to coaching.
    pub coaching_ratio: f64,
    /// Reps with fewer store tickets are left out of scheduling rankings.
    pub min_tickets: usize,
    pub leaderboard_size: usize,
    pub shifts_per_day: f64,
    pub top_reps_for_projection: usize,
    /// Rank share (from the top) a rep must fall outside of to be a relocation candidate.
    pub relocation_rank_percentile: f64,
    /// Fraction of the store average below which a rep is a relocation candidate.
    pub relocation_average_ratio: f64,
    pub fetch: FetchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            benchmark: 70.0,
            coaching_ratio: 0.5,
            min_tickets: 5,
            leaderboard_size: 5,
            shifts_per_day: 8.0,
            top_reps_for_projection: 3,
            relocation_rank_percentile: 0.8,
            relocation_average_ratio: 0.8,
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Rows requested per page; matches the storage row cap.
    pub page_size: usize,
    /// Exhaustive paging gives up past this many rows.
    pub safety_limit: usize,
    /// Row bound for the single fallback read.
    pub fallback_limit: usize,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 1_000,
            safety_limit: 250_000,
            fallback_limit: 1_000_000,
            timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_business_thresholds() {
        let config = EngineConfig::default();
        assert_eq!(config.benchmark, 70.0);
        assert_eq!(config.coaching_ratio, 0.5);
        assert_eq!(config.min_tickets, 5);
        assert_eq!(config.leaderboard_size, 5);
        assert_eq!(config.shifts_per_day, 8.0);
        assert!(config.fetch.fallback_limit > config.fetch.safety_limit);
    }
}
