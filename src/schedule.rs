use std::time::Duration;

/// Blocking pause, injected so that fixed waits can be observed without real time passing.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &mut S {
    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Runs a task, then sleeps for a fixed interval, repeatedly.
pub struct Scheduler<S: Sleeper> {
    interval: Duration,
    sleeper: S,
}

impl<S: Sleeper> Scheduler<S> {
    pub fn new(interval: Duration, sleeper: S) -> Self {
        Self { interval, sleeper }
    }

    /// Run `task` until it fails. Never returns `Ok`.
    pub fn run_forever<F>(&mut self, task: F) -> anyhow::Result<()>
    where
        F: FnMut(usize) -> anyhow::Result<()>,
    {
        self.run(task, None)
    }

    /// Run `task` at most `iterations` times (forever for `None`), sleeping between runs.
    ///
    /// The task receives the zero-based iteration number. An error from the task stops the loop and
    /// is returned; there is no retry.
    pub fn run<F>(&mut self, mut task: F, iterations: Option<usize>) -> anyhow::Result<()>
    where
        F: FnMut(usize) -> anyhow::Result<()>,
    {
        let mut iteration = 0;
        loop {
            task(iteration)?;
            iteration += 1;
            if iterations.map_or(false, |limit| iteration >= limit) {
                return Ok(());
            }
            log::info!("Sleeping for {:?} until the next run", self.interval);
            self.sleeper.sleep(self.interval);
        }
    }
}
