use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::runner::vu::{VuState, VuStateCell};
use crate::schedule::RampSchedule;

struct VuHandle {
    id: u64,
    cancel: CancellationToken,
    state: Arc<VuStateCell>,
    task: JoinHandle<()>,
}

impl VuHandle {
    /// A VU occupies population capacity until its loop reports `Stopped`.
    /// The join handle covers the case of a body that panicked before
    /// reporting.
    fn is_stopped(&self) -> bool {
        self.state.get() == VuState::Stopped || self.task.is_finished()
    }
}

/// Drives the VU population toward the ramp plan.
///
/// On every tick the scheduler compares the population against the plan's
/// current target and reconciles: spawns when below, cancels newest first
/// when above. Cancelled VUs move to a retiring list and are swept once they
/// reach `Stopped`; until then they still count toward the population, so a
/// ramp-down followed by a ramp-up never pushes actual concurrency past the
/// target while final iterations are draining. The sweep means one slow
/// in-flight request still never stalls reconciliation.
pub struct StageScheduler {
    schedule: RampSchedule,
    tick: Duration,
    max_vus: Option<u64>,
}

impl StageScheduler {
    pub fn new(schedule: RampSchedule, tick: Duration, max_vus: Option<u64>) -> Self {
        Self {
            schedule,
            tick,
            max_vus,
        }
    }

    /// Runs the plan to completion (or until `cancel` fires), then drains
    /// every remaining VU before returning.
    ///
    /// `spawn_vu` builds the future for one VU; it receives the VU id, a
    /// child token that is cancelled when that VU must wind down, and the
    /// state cell the VU loop reports its lifecycle through.
    pub async fn run<S, F>(&self, cancel: &CancellationToken, mut spawn_vu: S) -> Result<()>
    where
        S: FnMut(u64, CancellationToken, Arc<VuStateCell>) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let started = Instant::now();
        let mut active: Vec<VuHandle> = Vec::new();
        let mut retiring: Vec<VuHandle> = Vec::new();
        let mut next_id: u64 = 0;
        let mut last_stage: Option<usize> = None;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let elapsed = started.elapsed();
            retiring.retain(|h| !h.is_stopped());

            if let Some(snap) = self.schedule.stage_snapshot_at(elapsed)
                && last_stage != Some(snap.index)
            {
                last_stage = Some(snap.index);
                tracing::info!(
                    stage = snap.index + 1,
                    stages = snap.count,
                    from = snap.start_target,
                    to = snap.end_target,
                    "entering stage"
                );
            }

            let mut target = self.schedule.target_at(elapsed);
            if let Some(max) = self.max_vus {
                target = target.min(max);
            }

            // Retiring VUs hold capacity until they stop; spawning against
            // `active` alone would overshoot the target while a ramp-down is
            // still finishing its last iterations.
            let live = (active.len() + retiring.len()) as u64;
            if live < target {
                for _ in live..target {
                    next_id += 1;
                    let child = cancel.child_token();
                    let state = Arc::new(VuStateCell::default());
                    let task = tokio::spawn(spawn_vu(next_id, child.clone(), state.clone()));
                    tracing::debug!(vu_id = next_id, "spawned vu");
                    active.push(VuHandle {
                        id: next_id,
                        cancel: child,
                        state,
                        task,
                    });
                }
            } else if (active.len() as u64) > target {
                // Newest first, so long-lived VUs keep warm connections.
                for _ in target..(active.len() as u64) {
                    if let Some(handle) = active.pop() {
                        tracing::debug!(vu_id = handle.id, "retiring vu");
                        handle.cancel.cancel();
                        retiring.push(handle);
                    }
                }
            }

            if self.schedule.is_done(elapsed) {
                break;
            }
        }

        for handle in &active {
            handle.cancel.cancel();
        }
        for handle in active.into_iter().chain(retiring) {
            handle.task.await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::Stage;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn stage(ms: u64, target: u64) -> Stage {
        Stage {
            duration: Duration::from_millis(ms),
            target,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ramps_up_to_target_and_drains() {
        let schedule = RampSchedule::new(0, vec![stage(200, 4)]);
        let scheduler = StageScheduler::new(schedule, Duration::from_millis(25), None);

        let spawned = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicU64::new(0));

        let cancel = CancellationToken::new();
        scheduler
            .run(&cancel, |_id, vu_cancel, _state| {
                let spawned = spawned.clone();
                let finished = finished.clone();
                async move {
                    spawned.fetch_add(1, Ordering::SeqCst);
                    vu_cancel.cancelled().await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        assert_eq!(spawned.load(Ordering::SeqCst), 4);
        // run() only returns once every VU task has completed.
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ramp_down_cancels_newest_first() {
        let schedule = RampSchedule::new(4, vec![stage(400, 0)]);
        let scheduler = StageScheduler::new(schedule, Duration::from_millis(100), None);

        let order = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        scheduler
            .run(&cancel, |id, vu_cancel, _state| {
                let order = order.clone();
                async move {
                    vu_cancel.cancelled().await;
                    order.lock().unwrap().push(id);
                }
            })
            .await
            .unwrap();

        let order = order.lock().unwrap().clone();
        assert_eq!(order, vec![4, 3, 2, 1]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn max_vus_caps_the_population() {
        let schedule = RampSchedule::new(0, vec![stage(150, 10)]);
        let scheduler = StageScheduler::new(schedule, Duration::from_millis(20), Some(3));

        let spawned = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();
        scheduler
            .run(&cancel, |_id, vu_cancel, _state| {
                let spawned = spawned.clone();
                async move {
                    spawned.fetch_add(1, Ordering::SeqCst);
                    vu_cancel.cancelled().await;
                }
            })
            .await
            .unwrap();

        assert_eq!(spawned.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn draining_vus_hold_capacity_through_a_rebound() {
        // Dip to zero and climb straight back while every cancelled VU takes
        // a long time to finish its last iteration. The peak concurrent
        // population must never exceed the largest target.
        let schedule = RampSchedule::new(3, vec![stage(200, 0), stage(400, 3)]);
        let scheduler = StageScheduler::new(schedule, Duration::from_millis(50), None);

        let live = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU64::new(0));

        let cancel = CancellationToken::new();
        scheduler
            .run(&cancel, |_id, vu_cancel, state| {
                let live = live.clone();
                let peak = peak.clone();
                async move {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    vu_cancel.cancelled().await;
                    // The final iteration is still in flight well past the
                    // end of the plan.
                    tokio::time::sleep(Duration::from_millis(800)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                    state.set(VuState::Stopped);
                }
            })
            .await
            .unwrap();

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "population peaked at {peak}, target never exceeded 3");
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn external_cancel_stops_early_and_drains() {
        // A plan far longer than the test; only the external token ends it.
        let schedule = RampSchedule::new(2, vec![stage(60_000, 2)]);
        let scheduler = StageScheduler::new(schedule, Duration::from_millis(20), None);

        let finished = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        scheduler
            .run(&cancel, |_id, vu_cancel, _state| {
                let finished = finished.clone();
                async move {
                    vu_cancel.cancelled().await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }
}
