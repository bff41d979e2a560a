//! Periodic dispatch of named read tasks.
//!
//! Replaces hardware-timer callbacks with a cooperative scheduler: the
//! caller owns the loop, passes the current instant into
//! [`Scheduler::run_pending`], and every due task runs on that thread
//! against a caller-supplied context. Tasks are named so they can be
//! retimed or cancelled cleanly.

use std::time::{Duration, Instant};

use crate::error::{Result, SensorError};

struct Task<Ctx> {
    name: String,
    period: Duration,
    next_due: Instant,
    action: Box<dyn FnMut(&mut Ctx)>,
}

/// Cooperative periodic scheduler.
pub struct Scheduler<Ctx> {
    tasks: Vec<Task<Ctx>>,
}

impl<Ctx> Scheduler<Ctx> {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Register a named task firing `frequency_hz` times per second.
    /// The first firing happens on the next dispatch.
    ///
    /// Fails on a non-positive frequency or a duplicate name.
    pub fn add<F>(&mut self, name: &str, frequency_hz: f64, action: F) -> Result<()>
    where
        F: FnMut(&mut Ctx) + 'static,
    {
        let period = Self::period_for(frequency_hz)?;
        if self.tasks.iter().any(|t| t.name == name) {
            return Err(SensorError::InvalidParameter(format!(
                "task {name:?} already registered"
            )));
        }
        self.tasks.push(Task {
            name: name.to_string(),
            period,
            next_due: Instant::now(),
            action: Box::new(action),
        });
        Ok(())
    }

    /// Stop a task. Returns whether it existed.
    pub fn cancel(&mut self, name: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.name != name);
        self.tasks.len() != before
    }

    /// Retime a task; its next firing is one full new period from now.
    pub fn set_frequency(&mut self, name: &str, frequency_hz: f64) -> Result<()> {
        let period = Self::period_for(frequency_hz)?;
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| SensorError::InvalidParameter(format!("no task named {name:?}")))?;
        task.period = period;
        task.next_due = Instant::now() + period;
        Ok(())
    }

    /// Run every task due at `now`. Returns how many fired.
    ///
    /// A fired task is next due one period after `now`; missed
    /// intervals are not replayed.
    pub fn run_pending(&mut self, now: Instant, ctx: &mut Ctx) -> usize {
        let mut fired = 0;
        for task in &mut self.tasks {
            if task.next_due <= now {
                (task.action)(ctx);
                task.next_due = now + task.period;
                fired += 1;
            }
        }
        fired
    }

    /// Earliest due instant across tasks, for callers that sleep
    /// between dispatches.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().map(|t| t.next_due).min()
    }

    /// Registered task names.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn period_for(frequency_hz: f64) -> Result<Duration> {
        if !(frequency_hz > 0.0 && frequency_hz.is_finite()) {
            return Err(SensorError::InvalidParameter(format!(
                "frequency must be positive, got {frequency_hz}"
            )));
        }
        Ok(Duration::from_secs_f64(1.0 / frequency_hz))
    }
}

impl<Ctx> Default for Scheduler<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_fires_when_due() {
        let mut scheduler: Scheduler<u32> = Scheduler::new();
        scheduler.add("count", 10.0, |count| *count += 1).unwrap();

        let mut count = 0;
        let now = Instant::now();
        assert_eq!(scheduler.run_pending(now, &mut count), 1);
        assert_eq!(count, 1);

        // Not due again at the same instant.
        assert_eq!(scheduler.run_pending(now, &mut count), 0);
        assert_eq!(count, 1);

        // Due again one period later.
        assert_eq!(
            scheduler.run_pending(now + Duration::from_millis(100), &mut count),
            1
        );
        assert_eq!(count, 2);
    }

    #[test]
    fn test_cancel_stops_task() {
        let mut scheduler: Scheduler<u32> = Scheduler::new();
        scheduler.add("count", 10.0, |count| *count += 1).unwrap();

        assert!(scheduler.cancel("count"));
        assert!(!scheduler.cancel("count"));
        assert!(scheduler.is_empty());

        let mut count = 0;
        scheduler.run_pending(Instant::now() + Duration::from_secs(1), &mut count);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_set_frequency_retimes_task() {
        let mut scheduler: Scheduler<u32> = Scheduler::new();
        scheduler.add("count", 1.0, |count| *count += 1).unwrap();
        scheduler.set_frequency("count", 10.0).unwrap();

        let mut count = 0;
        // Not due immediately after retiming.
        assert_eq!(scheduler.run_pending(Instant::now(), &mut count), 0);
        // Due well before the old 1 Hz period would have elapsed.
        assert_eq!(
            scheduler.run_pending(Instant::now() + Duration::from_millis(150), &mut count),
            1
        );
        assert_eq!(count, 1);
    }

    #[test]
    fn test_duplicate_and_invalid_registrations_rejected() {
        let mut scheduler: Scheduler<u32> = Scheduler::new();
        scheduler.add("count", 1.0, |_| {}).unwrap();
        assert!(matches!(
            scheduler.add("count", 1.0, |_| {}),
            Err(SensorError::InvalidParameter(_))
        ));
        assert!(matches!(
            scheduler.add("bad", 0.0, |_| {}),
            Err(SensorError::InvalidParameter(_))
        ));
        assert!(matches!(
            scheduler.set_frequency("missing", 1.0),
            Err(SensorError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_independent_frequencies() {
        let mut scheduler: Scheduler<(u32, u32)> = Scheduler::new();
        scheduler.add("fast", 100.0, |c| c.0 += 1).unwrap();
        scheduler.add("slow", 1.0, |c| c.1 += 1).unwrap();

        let mut counts = (0, 0);
        let start = Instant::now();
        scheduler.run_pending(start, &mut counts);
        scheduler.run_pending(start + Duration::from_millis(10), &mut counts);
        scheduler.run_pending(start + Duration::from_millis(20), &mut counts);
        assert_eq!(counts, (3, 1));

        assert_eq!(scheduler.task_names(), vec!["fast", "slow"]);
    }
}
