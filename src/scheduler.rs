//! Buffer-role alternation and fixed-interval pacing.
//!
//! [`Scheduler::tick`] is independent of any timer or device: it hands a
//! [`TickPlan`] to a [`TickTarget`] and advances the generation counter when
//! the target reports that the batch was submitted.

use std::time::{Duration, Instant};

use crate::error::LifeError;
use crate::grid::BufferId;

/// Buffer roles for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    /// Generation the compute pass reads.
    pub source: BufferId,
    /// Buffer the compute pass writes.
    pub destination: BufferId,
    /// Buffer the render pass draws. Always the destination of the same
    /// tick, so the frame shows the generation just computed.
    pub display: BufferId,
    /// Counter value once this tick has been submitted.
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Compute and render work went to the queue as one batch.
    Submitted,
    /// Nothing was encoded (e.g. the presentation target was briefly
    /// unavailable). Roles are not advanced.
    Skipped,
}

/// Executes the compute pass and then the render pass of a plan as one unit.
pub trait TickTarget {
    fn run_tick(&mut self, plan: &TickPlan) -> Result<TickOutcome, LifeError>;
}

/// Owns the generation counter that picks which buffer plays which role.
#[derive(Debug, Default)]
pub struct Scheduler {
    step: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn plan(&self) -> TickPlan {
        let source = BufferId::from_parity(self.step);
        let destination = BufferId::from_parity(self.step + 1);
        // The render pass runs after the counter moves on, and reads the
        // buffer that is current under the new parity.
        let generation = self.step + 1;
        TickPlan {
            source,
            destination,
            display: BufferId::from_parity(generation),
            generation,
        }
    }

    pub fn tick<T: TickTarget + ?Sized>(&mut self, target: &mut T) -> Result<TickOutcome, LifeError> {
        let plan = self.plan();
        let outcome = target.run_tick(&plan)?;
        if outcome == TickOutcome::Submitted {
            self.step = plan.generation;
            log::debug!(
                "generation {} submitted ({:?} -> {:?})",
                plan.generation,
                plan.source,
                plan.destination
            );
        }
        Ok(outcome)
    }
}

/// Fixed-interval timer. It never waits for the device to finish a frame.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    next_deadline: Instant,
    stopped: bool,
}

impl Ticker {
    /// The first tick is due at `start`.
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next_deadline: start,
            stopped: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true once per elapsed deadline and schedules the next one.
    /// After a stall the schedule restarts from `now` instead of bursting.
    pub fn due(&mut self, now: Instant) -> bool {
        if self.stopped || now < self.next_deadline {
            return false;
        }
        self.next_deadline += self.interval;
        if self.next_deadline <= now {
            self.next_deadline = now + self.interval;
        }
        true
    }

    /// `None` once stopped.
    pub fn next_deadline(&self) -> Option<Instant> {
        (!self.stopped).then_some(self.next_deadline)
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridDimensions;
    use crate::rules::{self, Pattern};

    #[derive(Default)]
    struct Recorder {
        plans: Vec<TickPlan>,
    }

    impl TickTarget for Recorder {
        fn run_tick(&mut self, plan: &TickPlan) -> Result<TickOutcome, LifeError> {
            self.plans.push(*plan);
            Ok(TickOutcome::Submitted)
        }
    }

    /// Runs the reference rule on two host buffers, mirroring the device passes.
    struct HostPipeline {
        dims: GridDimensions,
        buffers: [Vec<u32>; 2],
        frames: Vec<Vec<u32>>,
    }

    impl HostPipeline {
        fn new(dims: GridDimensions, seed: Vec<u32>) -> Self {
            let garbage = vec![7; dims.cell_count()];
            Self { dims, buffers: [seed, garbage], frames: Vec::new() }
        }
    }

    impl TickTarget for HostPipeline {
        fn run_tick(&mut self, plan: &TickPlan) -> Result<TickOutcome, LifeError> {
            let [a, b] = &mut self.buffers;
            let (source, destination) = match plan.source {
                BufferId::A => (&*a, b),
                BufferId::B => (&*b, a),
            };
            rules::step(source, destination, self.dims);
            self.frames.push(self.buffers[plan.display.index()].clone());
            Ok(TickOutcome::Submitted)
        }
    }

    #[test]
    fn roles_alternate_strictly() {
        let mut scheduler = Scheduler::new();
        let mut recorder = Recorder::default();
        for _ in 0..9 {
            scheduler.tick(&mut recorder).unwrap();
        }
        assert_eq!(scheduler.step(), 9);

        for (tick, plan) in recorder.plans.iter().enumerate() {
            let expected = if tick % 2 == 0 {
                (BufferId::A, BufferId::B)
            } else {
                (BufferId::B, BufferId::A)
            };
            assert_eq!((plan.source, plan.destination), expected, "tick {tick}");
            assert_eq!(plan.display, plan.destination);
            assert_eq!(plan.generation, tick as u64 + 1);
        }
        for pair in recorder.plans.windows(2) {
            assert_ne!(pair[0].source, pair[1].source);
        }
    }

    #[test]
    fn displayed_frame_is_the_generation_just_computed() {
        let dims = GridDimensions::new(6, 6).unwrap();
        let blinker = rules::grid_with_pattern(dims, Pattern::Blinker);
        let mut expected_first = vec![rules::DEAD; blinker.len()];
        rules::step(&blinker, &mut expected_first, dims);

        let mut pipeline = HostPipeline::new(dims, blinker.clone());
        let mut scheduler = Scheduler::new();
        for _ in 0..4 {
            scheduler.tick(&mut pipeline).unwrap();
        }

        assert_eq!(pipeline.frames[0], expected_first);
        assert_eq!(pipeline.frames[1], blinker);
        assert_eq!(pipeline.frames[2], expected_first);
        assert_eq!(pipeline.frames[3], blinker);
    }

    #[test]
    fn dead_grid_stays_dead_across_ticks() {
        let dims = GridDimensions::new(10, 10).unwrap();
        let mut pipeline = HostPipeline::new(dims, vec![rules::DEAD; dims.cell_count()]);
        let mut scheduler = Scheduler::new();
        for _ in 0..6 {
            scheduler.tick(&mut pipeline).unwrap();
        }
        assert!(pipeline.frames.iter().all(|frame| rules::population(frame) == 0));
    }

    struct Flaky {
        outcomes: Vec<TickOutcome>,
        seen: Vec<TickPlan>,
    }

    impl TickTarget for Flaky {
        fn run_tick(&mut self, plan: &TickPlan) -> Result<TickOutcome, LifeError> {
            self.seen.push(*plan);
            Ok(self.outcomes.remove(0))
        }
    }

    #[test]
    fn skipped_ticks_keep_the_roles() {
        let mut target = Flaky {
            outcomes: vec![TickOutcome::Submitted, TickOutcome::Skipped, TickOutcome::Submitted],
            seen: Vec::new(),
        };
        let mut scheduler = Scheduler::new();
        for _ in 0..3 {
            scheduler.tick(&mut target).unwrap();
        }
        assert_eq!(scheduler.step(), 2);
        assert_eq!(target.seen[1], target.seen[2]);
        assert_eq!(target.seen[1].source, BufferId::B);
    }

    struct Lost;

    impl TickTarget for Lost {
        fn run_tick(&mut self, _plan: &TickPlan) -> Result<TickOutcome, LifeError> {
            Err(LifeError::Submission("device lost".to_string()))
        }
    }

    #[test]
    fn submission_errors_propagate_without_advancing() {
        let mut scheduler = Scheduler::new();
        let err = scheduler.tick(&mut Lost).unwrap_err();
        assert!(matches!(err, LifeError::Submission(_)));
        assert_eq!(scheduler.step(), 0);
    }

    #[test]
    fn ticker_fires_once_per_interval() {
        let start = Instant::now();
        let interval = Duration::from_millis(33);
        let mut ticker = Ticker::new(interval, start);

        assert!(ticker.due(start));
        assert!(!ticker.due(start));
        assert!(!ticker.due(start + Duration::from_millis(20)));
        assert!(ticker.due(start + interval));
        assert_eq!(ticker.next_deadline(), Some(start + interval * 2));
    }

    #[test]
    fn ticker_does_not_burst_after_a_stall() {
        let start = Instant::now();
        let interval = Duration::from_millis(10);
        let mut ticker = Ticker::new(interval, start);
        assert!(ticker.due(start));

        let late = start + Duration::from_millis(95);
        assert!(ticker.due(late));
        assert!(!ticker.due(late));
        assert_eq!(ticker.next_deadline(), Some(late + interval));
    }

    #[test]
    fn stopped_ticker_never_fires() {
        let start = Instant::now();
        let mut ticker = Ticker::new(Duration::from_millis(5), start);
        assert!(!ticker.is_stopped());
        ticker.stop();
        assert!(ticker.is_stopped());
        assert!(!ticker.due(start + Duration::from_secs(1)));
        assert_eq!(ticker.next_deadline(), None);
    }
}
