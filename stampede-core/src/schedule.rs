use std::time::Duration;

use crate::config::Stage;

#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// An immutable ramp plan: the VU target as a continuous, piecewise-linear
/// function of elapsed time.
///
/// Stage `i` ramps linearly from the previous stage's target (or `start` for
/// the first stage) to its own target over its duration; after the last
/// stage the final target holds.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl RampSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn start_target(&self) -> u64 {
        self.start
    }

    /// Largest target the plan ever asks for.
    pub fn peak_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(self.start)
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    fn stage_index(&self, elapsed: Duration) -> usize {
        match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) => i,
            Err(i) => i,
        }
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if self.stages.is_empty() || elapsed == Duration::ZERO {
            return self.start;
        }

        let total = self.total_duration();
        if elapsed >= total {
            return self.stages.last().map(|s| s.target).unwrap_or(self.start);
        }

        let idx = self.stage_index(elapsed);

        let stage_end = self.cumulative_ends[idx];
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };

        let stage = &self.stages[idx];
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let start_target = if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        };
        let end_target = stage.target;

        if stage_duration.is_zero() {
            return end_target;
        }

        // Linear interpolation across the stage.
        let start_i = start_target as i128;
        let end_i = end_target as i128;
        let delta = end_i - start_i;

        let num = stage_elapsed.as_nanos() as i128;
        let den = stage_duration.as_nanos() as i128;

        let cur = start_i + (delta.saturating_mul(num) / den.max(1));
        cur.clamp(0, u64::MAX as i128) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let total = self.total_duration();
        let clamped = elapsed.min(total);

        let idx = if clamped >= total {
            self.stages.len().saturating_sub(1)
        } else {
            self.stage_index(clamped)
        };

        let stage_end = self.cumulative_ends[idx];
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };

        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start);
        let stage_remaining = stage_duration.saturating_sub(stage_elapsed);

        let start_target = if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        };
        let end_target = self.stages[idx].target;

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining,
            start_target,
            end_target,
            current_target: self.target_at(clamped),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(secs: u64, target: u64) -> Stage {
        Stage {
            duration: Duration::from_secs(secs),
            target,
        }
    }

    #[test]
    fn single_stage_interpolates_from_start() {
        let s = RampSchedule::new(0, vec![stage(10, 10)]);

        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(Duration::from_secs(5)), 5);
        assert_eq!(s.target_at(Duration::from_secs(10)), 10);
        assert_eq!(s.target_at(Duration::from_secs(60)), 10);
        assert!(s.is_done(Duration::from_secs(10)));
        assert!(!s.is_done(Duration::from_millis(9_999)));
    }

    #[test]
    fn stage_boundaries_hit_configured_targets_exactly() {
        let s = RampSchedule::new(10, vec![stage(10, 50), stage(15, 100), stage(10, 0)]);

        // A boundary time resolves to the ending stage, so the value is
        // exactly that stage's configured target.
        assert_eq!(s.target_at(Duration::from_secs(10)), 50);
        assert_eq!(s.target_at(Duration::from_secs(25)), 100);
        assert_eq!(s.target_at(Duration::from_secs(35)), 0);
        assert_eq!(s.total_duration(), Duration::from_secs(35));
    }

    #[test]
    fn ramp_down_interpolates_toward_zero() {
        let s = RampSchedule::new(100, vec![stage(10, 0)]);
        assert_eq!(s.target_at(Duration::from_secs(5)), 50);
        assert_eq!(s.target_at(Duration::from_secs(10)), 0);
    }

    #[test]
    fn target_is_monotone_within_a_ramp_up_stage() {
        let s = RampSchedule::new(0, vec![stage(10, 1000)]);
        let mut prev = 0;
        for ms in (0..=10_000).step_by(97) {
            let cur = s.target_at(Duration::from_millis(ms));
            assert!(cur >= prev, "target regressed at t={ms}ms");
            prev = cur;
        }
    }

    #[test]
    fn empty_schedule_holds_start() {
        let s = RampSchedule::new(7, Vec::new());
        assert_eq!(s.target_at(Duration::from_secs(3)), 7);
        assert_eq!(s.total_duration(), Duration::ZERO);
        assert!(s.stage_snapshot_at(Duration::ZERO).is_none());
    }

    #[test]
    fn peak_target_covers_start_and_stages() {
        let s = RampSchedule::new(10, vec![stage(10, 50), stage(10, 20)]);
        assert_eq!(s.peak_target(), 50);

        let s = RampSchedule::new(100, vec![stage(10, 50)]);
        assert_eq!(s.peak_target(), 100);
    }

    #[test]
    fn stage_snapshot_reports_position() {
        let s = RampSchedule::new(0, vec![stage(10, 50), stage(20, 100)]);
        let snap = match s.stage_snapshot_at(Duration::from_secs(15)) {
            Some(v) => v,
            None => panic!("expected snapshot"),
        };

        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 2);
        assert_eq!(snap.stage_elapsed, Duration::from_secs(5));
        assert_eq!(snap.stage_remaining, Duration::from_secs(15));
        assert_eq!(snap.start_target, 50);
        assert_eq!(snap.end_target, 100);
        assert_eq!(snap.current_target, s.target_at(Duration::from_secs(15)));
    }
}
