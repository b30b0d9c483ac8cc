//! A logical clock that ticks at a fixed frequency and runs deferred work on tick boundaries.
//!
//! The scheduler never reads the clock itself: callers hand it the current time through
//! [`Scheduler::poll`], and it advances its age by at most one tick per call. Late polls
//! don't lose ticks, since the tick reference only ever moves forward by one interval.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

mod repeating;
pub use repeating::{Repeat, RepeatingTask, SeriesEnd};
use repeating::Series;

pub type TaskId = u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Executed,
    Cancelled,
    NotPlanned,
}

/// Why a task will never run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Notice {
    Cancelled,
    NotPlanned,
}

/// A handle on scheduled work. Cloning it doesn't duplicate the work.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    target_age: u64,
    state: Rc<Cell<TaskState>>,
}
impl Task {
    pub fn id(&self) -> TaskId {
        self.id
    }
    pub fn target_age(&self) -> u64 {
        self.target_age
    }
    pub fn state(&self) -> TaskState {
        self.state.get()
    }
    pub fn executed(&self) -> bool {
        self.state.get() == TaskState::Executed
    }
    /// 0 if the task is due at `age`, positive if it's still ahead, negative once overdue.
    pub fn remaining_ticks(&self, age: u64) -> i64 {
        self.target_age as i64 - age as i64
    }
}

pub type Job<C> = Box<dyn FnOnce(&mut C, &mut Scheduler<C>)>;

enum Work<C> {
    Once(Job<C>),
    Series(TaskId),
}
struct Entry<C> {
    task: Task,
    work: Work<C>,
    listeners: Vec<Box<dyn FnOnce(Notice)>>,
}
impl<C> Entry<C> {
    fn notify(self, notice: Notice) -> Work<C> {
        self.task.state.set(match notice {
            Notice::Cancelled => TaskState::Cancelled,
            Notice::NotPlanned => TaskState::NotPlanned,
        });
        for listener in self.listeners {
            listener(notice);
        }
        self.work
    }
}

pub struct Scheduler<C> {
    frequency: u32,
    interval: Duration,
    age: u64,
    running: bool,
    last_tick: Instant,
    next_id: TaskId,
    tasks: Vec<Entry<C>>,
    series: HashMap<TaskId, Series<C>>,
}
impl<C> Scheduler<C> {
    pub fn new(frequency: u32) -> Self {
        assert!(frequency > 0, "a scheduler needs a positive frequency");
        Self {
            frequency,
            interval: Duration::from_secs(1) / frequency,
            age: 0,
            running: false,
            last_tick: Instant::now(),
            next_id: 0,
            tasks: vec![],
            series: HashMap::new(),
        }
    }

    pub fn age(&self) -> u64 {
        self.age
    }
    pub fn frequency(&self) -> u32 {
        self.frequency
    }
    pub fn interval(&self) -> Duration {
        self.interval
    }
    pub fn running(&self) -> bool {
        self.running
    }
    pub fn ticks_for(&self, duration: Duration) -> f64 {
        duration.as_secs_f64() * self.frequency as f64
    }
    pub fn duration_of(&self, ticks: u64) -> Duration {
        Duration::from_nanos((self.interval.as_nanos() as u64).saturating_mul(ticks))
    }
    /// The age the clock would show at `now`, including the fraction of the current tick.
    pub fn estimate_age(&self, now: Instant) -> f64 {
        if !self.running {
            return self.age as f64;
        }
        self.age as f64 + self.ticks_for(now.saturating_duration_since(self.last_tick))
    }
    /// When the next tick is due, if the clock is running.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.running.then(|| self.last_tick + self.interval)
    }

    pub fn start(&mut self) -> bool {
        self.start_at(Instant::now())
    }
    /// Starts (or resumes) the clock with its first tick due one interval after `now`.
    pub fn start_at(&mut self, now: Instant) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.last_tick = now;
        log::debug!("Scheduler started at {}Hz", self.frequency);
        true
    }
    /// Stops ticking but keeps everything scheduled for a later `start`.
    pub fn pause(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        log::debug!("Scheduler paused at age {}", self.age);
        true
    }
    /// Stops ticking and tells every pending task and series that it won't run.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        log::debug!("Scheduler terminating at age {}", self.age);
        for entry in core::mem::take(&mut self.tasks) {
            entry.notify(Notice::NotPlanned);
        }
        let series: Vec<TaskId> = self.series.keys().copied().collect();
        for id in series {
            self.end_series(id, SeriesEnd::NotPlanned);
        }
        true
    }

    /// Advances the clock by one tick if a whole interval has passed, running whatever
    /// became due. Returns whether a tick happened.
    pub fn poll(&mut self, now: Instant, ctx: &mut C) -> bool {
        if !self.running || now.saturating_duration_since(self.last_tick) < self.interval {
            return false;
        }
        self.last_tick += self.interval;
        self.age += 1;

        let mut due: Vec<(u64, TaskId)> = self.tasks.iter()
            .filter(|e| e.task.target_age <= self.age)
            .map(|e| (e.task.target_age, e.task.id))
            .collect();
        due.sort_by_key(|&(target, _)| target);
        for (_, id) in due {
            if !self.running {
                break;
            }
            // an earlier task may have cancelled this one
            let Some(idx) = self.tasks.iter().position(|e| e.task.id == id) else { continue };
            let entry = self.tasks.remove(idx);
            entry.task.state.set(TaskState::Executed);
            match entry.work {
                Work::Once(job) => job(ctx, self),
                Work::Series(series) => self.fire_series(series, ctx),
            }
        }
        true
    }
    /// Polls until the clock is paused or stopped, sleeping between ticks.
    pub fn run(&mut self, ctx: &mut C) {
        while let Some(deadline) = self.next_deadline() {
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
            self.poll(Instant::now(), ctx);
        }
    }

    fn next_id(&mut self) -> TaskId {
        self.next_id += 1;
        self.next_id
    }
    fn push(&mut self, target_age: u64, work: Work<C>) -> Task {
        let task = Task {
            id: self.next_id(),
            target_age,
            state: Rc::new(Cell::new(TaskState::Pending)),
        };
        self.tasks.push(Entry { task: task.clone(), work, listeners: vec![] });
        task
    }
    fn take_pending(&mut self, id: TaskId) -> Option<Entry<C>> {
        let idx = self.tasks.iter().position(|e| e.task.id == id)?;
        Some(self.tasks.remove(idx))
    }

    /// Runs `job` on the first tick whose age reaches `target_age`. A target that has
    /// already passed runs on the next tick.
    pub fn schedule_at(&mut self, target_age: u64, job: impl FnOnce(&mut C, &mut Scheduler<C>) + 'static) -> Task {
        self.push(target_age, Work::Once(Box::new(job)))
    }
    pub fn schedule_in(&mut self, ticks: u64, job: impl FnOnce(&mut C, &mut Scheduler<C>) + 'static) -> Task {
        self.schedule_at(self.age + ticks, job)
    }
    /// Runs `job` on the next tick.
    pub fn schedule(&mut self, job: impl FnOnce(&mut C, &mut Scheduler<C>) + 'static) -> Task {
        self.schedule_in(1, job)
    }
    /// Removes a pending task. Returns false if it already ran or was removed.
    pub fn cancel(&mut self, task: &Task) -> bool {
        let Some(entry) = self.take_pending(task.id) else { return false };
        if let Work::Series(series) = entry.notify(Notice::Cancelled) {
            self.end_series(series, SeriesEnd::Cancelled);
        }
        true
    }
    /// Calls `listener` if the task is cancelled or dropped by `stop`. Returns false if
    /// the task isn't pending anymore.
    pub fn on_notice(&mut self, task: &Task, listener: impl FnOnce(Notice) + 'static) -> bool {
        match self.tasks.iter_mut().find(|e| e.task.id == task.id) {
            Some(entry) => {
                entry.listeners.push(Box::new(listener));
                true
            }
            None => false,
        }
    }
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|e| e.task.id == id)
    }
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}
impl<C> std::fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("frequency", &self.frequency)
            .field("age", &self.age)
            .field("running", &self.running)
            .field("pending", &self.tasks.len())
            .field("series", &self.series.len())
            .finish()
    }
}
