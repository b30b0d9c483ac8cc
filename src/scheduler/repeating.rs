use std::cell::Cell;
use std::rc::Rc;

use super::{Scheduler, Task, TaskId, Work};

/// What a repeating job wants after it has run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Repeat {
    Continue,
    Stop,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeriesEnd {
    /// Ran out of repeats, or the job asked to stop.
    Completed,
    Cancelled,
    /// The scheduler was stopped while the series was still live.
    NotPlanned,
}

/// A handle on a series of runs of the same job.
#[derive(Debug, Clone)]
pub struct RepeatingTask {
    id: TaskId,
    end: Rc<Cell<Option<SeriesEnd>>>,
    fired: Rc<Cell<u32>>,
}
impl RepeatingTask {
    pub fn id(&self) -> TaskId {
        self.id
    }
    pub fn ended(&self) -> Option<SeriesEnd> {
        self.end.get()
    }
    pub fn is_live(&self) -> bool {
        self.end.get().is_none()
    }
    pub fn fired(&self) -> u32 {
        self.fired.get()
    }
}

type SeriesJob<C> = Box<dyn FnMut(&mut C, &mut Scheduler<C>) -> Repeat>;

pub(super) struct Series<C> {
    interval: u64,
    remaining: Option<u32>,
    current: Option<Task>,
    // taken out while the job runs
    job: Option<SeriesJob<C>>,
    end: Rc<Cell<Option<SeriesEnd>>>,
    fired: Rc<Cell<u32>>,
    listeners: Vec<Box<dyn FnOnce(SeriesEnd)>>,
}

impl<C> Scheduler<C> {
    /// Runs `job` first at age `first` (the next tick if `None`), then every `interval`
    /// ticks after each run, `repeats` times in total or until it returns [`Repeat::Stop`].
    pub fn schedule_repeating(
        &mut self,
        first: Option<u64>,
        interval: u64,
        repeats: Option<u32>,
        job: impl FnMut(&mut C, &mut Scheduler<C>) -> Repeat + 'static,
    ) -> RepeatingTask {
        let handle = RepeatingTask {
            id: self.next_id(),
            end: Rc::new(Cell::new(None)),
            fired: Rc::new(Cell::new(0)),
        };
        if repeats == Some(0) {
            handle.end.set(Some(SeriesEnd::Completed));
            return handle;
        }
        let first = self.push(first.unwrap_or(self.age + 1), Work::Series(handle.id));
        self.series.insert(handle.id, Series {
            interval: interval.max(1),
            remaining: repeats,
            current: Some(first),
            job: Some(Box::new(job)),
            end: handle.end.clone(),
            fired: handle.fired.clone(),
            listeners: vec![],
        });
        handle
    }
    /// Ends a live series, dropping its next run if one is pending.
    pub fn cancel_repeating(&mut self, task: &RepeatingTask) -> bool {
        if !self.series.contains_key(&task.id) {
            return false;
        }
        self.end_series(task.id, SeriesEnd::Cancelled);
        true
    }
    pub fn on_series_end(&mut self, task: &RepeatingTask, listener: impl FnOnce(SeriesEnd) + 'static) -> bool {
        match self.series.get_mut(&task.id) {
            Some(series) => {
                series.listeners.push(Box::new(listener));
                true
            }
            None => false,
        }
    }

    pub(super) fn fire_series(&mut self, id: TaskId, ctx: &mut C) {
        let Some(series) = self.series.get_mut(&id) else { return };
        series.current = None;
        series.fired.set(series.fired.get() + 1);
        if let Some(remaining) = &mut series.remaining {
            *remaining -= 1;
        }
        let Some(mut job) = series.job.take() else { return };

        let verdict = job(ctx, self);

        // the job may have cancelled its own series, or stopped the scheduler
        let Some(series) = self.series.get_mut(&id) else { return };
        series.job = Some(job);
        if verdict == Repeat::Stop || series.remaining == Some(0) {
            self.end_series(id, SeriesEnd::Completed);
            return;
        }
        let next = self.age + series.interval;
        let task = self.push(next, Work::Series(id));
        if let Some(series) = self.series.get_mut(&id) {
            series.current = Some(task);
        }
    }
    pub(super) fn end_series(&mut self, id: TaskId, end: SeriesEnd) {
        let Some(series) = self.series.remove(&id) else { return };
        if let Some(current) = &series.current {
            if let Some(idx) = self.tasks.iter().position(|e| e.task.id == current.id) {
                let entry = self.tasks.remove(idx);
                entry.notify(match end {
                    SeriesEnd::NotPlanned => super::Notice::NotPlanned,
                    _ => super::Notice::Cancelled,
                });
            }
        }
        log::trace!("Series {id} ended: {end:?} after {} runs", series.fired.get());
        series.end.set(Some(end));
        for listener in series.listeners {
            listener(end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::{Duration, Instant};

    type Log = Vec<u64>;

    fn run_until(s: &mut Scheduler<Log>, t0: Instant, age: u64, log: &mut Log) {
        let now = t0 + Duration::from_secs(3600);
        while s.age() < age && s.running() {
            s.poll(now, log);
        }
    }

    #[test]
    fn runs_the_requested_number_of_times() {
        let mut s = Scheduler::new(20);
        let t0 = Instant::now();
        s.start_at(t0);
        let mut log = vec![];
        let ends = Rc::new(RefCell::new(vec![]));
        let series = s.schedule_repeating(None, 2, Some(3), |log: &mut Log, s| {
            log.push(s.age());
            Repeat::Continue
        });
        let seen = ends.clone();
        assert!(s.on_series_end(&series, move |end| seen.borrow_mut().push(end)));
        run_until(&mut s, t0, 20, &mut log);
        assert_eq!(log, [1, 3, 5]);
        assert_eq!(series.fired(), 3);
        assert_eq!(series.ended(), Some(SeriesEnd::Completed));
        assert_eq!(*ends.borrow(), [SeriesEnd::Completed]);
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn zero_repeats_never_runs() {
        let mut s = Scheduler::<Log>::new(20);
        let series = s.schedule_repeating(Some(0), 1, Some(0), |_, _| Repeat::Continue);
        assert_eq!(series.ended(), Some(SeriesEnd::Completed));
        assert_eq!(s.pending(), 0);
        assert!(!s.cancel_repeating(&series));
    }

    #[test]
    fn cancel_between_runs() {
        let mut s = Scheduler::new(20);
        let t0 = Instant::now();
        s.start_at(t0);
        let mut log = vec![];
        let series = s.schedule_repeating(Some(2), 3, None, |log: &mut Log, s| {
            log.push(s.age());
            Repeat::Continue
        });
        run_until(&mut s, t0, 6, &mut log);
        assert_eq!(log, [2, 5]);
        assert!(s.cancel_repeating(&series));
        assert!(!s.cancel_repeating(&series));
        run_until(&mut s, t0, 20, &mut log);
        assert_eq!(log, [2, 5]);
        assert_eq!(series.ended(), Some(SeriesEnd::Cancelled));
    }

    #[test]
    fn a_job_can_end_its_own_series() {
        let mut s = Scheduler::new(20);
        let t0 = Instant::now();
        s.start_at(t0);
        let mut log = vec![];
        let series = s.schedule_repeating(None, 1, None, |log: &mut Log, s| {
            log.push(s.age());
            if log.len() == 2 { Repeat::Stop } else { Repeat::Continue }
        });
        run_until(&mut s, t0, 10, &mut log);
        assert_eq!(log, [1, 2]);
        assert_eq!(series.ended(), Some(SeriesEnd::Completed));
    }

    #[test]
    fn stop_tells_live_series_not_planned() {
        let mut s = Scheduler::new(20);
        let t0 = Instant::now();
        s.start_at(t0);
        let mut log = vec![];
        let series = s.schedule_repeating(None, 5, None, |log: &mut Log, s| {
            log.push(s.age());
            Repeat::Continue
        });
        run_until(&mut s, t0, 2, &mut log);
        assert_eq!(log, [1]);
        assert!(s.stop());
        assert_eq!(series.ended(), Some(SeriesEnd::NotPlanned));
        assert_eq!(s.pending(), 0);
    }
}
