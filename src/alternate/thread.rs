use super::{merge_transcripts, AlternateConfig, AlternateError, StopSignal, Tick};
use log::{debug, trace};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;

enum Baton {
    Count(u64),
    Stop,
}

struct Worker<'a> {
    id: u32,
    sender: SyncSender<Baton>,
    receiver: &'a Mutex<Receiver<Baton>>,
    config: &'a AlternateConfig,
    stop: &'a StopSignal,
    observe: &'a (dyn Fn(&Tick) + Sync),
}

/// Tells the partner to stop if the worker unwinds, so it is not left
/// waiting on a channel its own sender keeps open.
struct StopOnUnwind<'a> {
    id: u32,
    sender: &'a SyncSender<Baton>,
}

impl Drop for StopOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            debug!("worker {} unwinding, stopping its partner", self.id);
            let _ = self.sender.send(Baton::Stop);
        }
    }
}

impl Worker<'_> {
    fn receive(&self) -> Result<Baton, AlternateError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        receiver
            .recv()
            .map_err(|_| AlternateError::Disconnected { worker: self.id })
    }

    fn send(&self, baton: Baton) -> Result<(), AlternateError> {
        self.sender
            .send(baton)
            .map_err(|_| AlternateError::Disconnected { worker: self.id })
    }

    fn run(self) -> Result<Vec<Tick>, AlternateError> {
        let _unwind = StopOnUnwind {
            id: self.id,
            sender: &self.sender,
        };
        let mut ticks = Vec::new();

        loop {
            let value = match self.receive()? {
                Baton::Count(value) => value,
                Baton::Stop => {
                    trace!("worker {} told to stop", self.id);
                    return Ok(ticks);
                }
            };

            if self.stop.is_triggered() || !self.config.admits(value) {
                debug!("worker {} ends the run at {}", self.id, value);
                self.send(Baton::Stop)?;
                return Ok(ticks);
            }

            let tick = Tick {
                worker: self.id,
                value,
            };
            (self.observe)(&tick);
            ticks.push(tick);

            match value.checked_add(1) {
                Some(next) => self.send(Baton::Count(next))?,
                None => {
                    debug!("worker {} stops at counter overflow", self.id);
                    self.send(Baton::Stop)?;
                    return Ok(ticks);
                }
            }
        }
    }
}

/// Runs the counter on two OS threads over one rendezvous channel.
///
/// `sync_channel(0)` has no buffer, so every send waits for the partner's
/// receive. Both workers share the receiving end behind a mutex; only the
/// worker that is not currently sending can be waiting on it.
pub fn run_threads(
    config: &AlternateConfig,
    stop: &StopSignal,
    observe: &(dyn Fn(&Tick) + Sync),
) -> Result<Vec<Tick>, AlternateError> {
    let [first_id, main_id] = config.workers;
    let (tx, rx) = mpsc::sync_channel(0);
    let rx = Mutex::new(rx);

    debug!("alternating on threads from {}", config.seed);

    std::thread::scope(|s| {
        let first = Worker {
            id: first_id,
            sender: tx.clone(),
            receiver: &rx,
            config,
            stop,
            observe,
        };
        let handle = s.spawn(move || first.run());

        tx.send(Baton::Count(config.seed))
            .map_err(|_| AlternateError::Disconnected { worker: main_id })?;

        let main_ticks = Worker {
            id: main_id,
            sender: tx,
            receiver: &rx,
            config,
            stop,
            observe,
        }
        .run()?;

        let first_ticks = handle
            .join()
            .map_err(|_| AlternateError::WorkerPanicked { worker: first_id })??;

        Ok(merge_transcripts(first_ticks, main_ticks))
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::assert_alternates;
    use super::*;

    fn collect(config: &AlternateConfig, stop: &StopSignal) -> (Vec<Tick>, Vec<Tick>) {
        let seen = Mutex::new(Vec::new());
        let ticks =
            run_threads(config, stop, &|tick: &Tick| seen.lock().unwrap().push(*tick)).unwrap();
        (ticks, seen.into_inner().unwrap())
    }

    #[test]
    fn bounded_run_alternates_from_zero() {
        let config = AlternateConfig::default();
        let (ticks, seen) = collect(&config, &StopSignal::new());

        assert_eq!(ticks.len(), 10);
        assert_alternates(&ticks, 0, [1, 2]);
        assert_eq!(seen, ticks);
        assert_eq!(ticks[0].to_string(), "worker 1: 0");
        assert_eq!(ticks[1].to_string(), "worker 2: 1");
    }

    #[test]
    fn odd_round_counts_end_on_the_spawned_worker() {
        let config = AlternateConfig {
            seed: 3,
            rounds: Some(5),
            workers: [7, 9],
        };
        let (ticks, _) = collect(&config, &StopSignal::new());

        assert_eq!(ticks.len(), 5);
        assert_alternates(&ticks, 3, [7, 9]);
        assert_eq!(ticks.last().unwrap().worker, 7);
    }

    #[test]
    fn zero_rounds_report_nothing() {
        let config = AlternateConfig {
            rounds: Some(0),
            ..AlternateConfig::default()
        };
        let (ticks, seen) = collect(&config, &StopSignal::new());

        assert!(ticks.is_empty());
        assert!(seen.is_empty());
    }

    #[test]
    fn stop_signal_ends_an_unbounded_run() {
        let config = AlternateConfig {
            rounds: None,
            ..AlternateConfig::default()
        };
        let stop = StopSignal::new();

        let ticks = run_threads(&config, &stop, &|tick: &Tick| {
            if tick.value == 25 {
                stop.trigger();
            }
        })
        .unwrap();

        assert_eq!(ticks.len(), 26);
        assert_alternates(&ticks, 0, [1, 2]);
    }

    #[test]
    fn pre_triggered_stop_reports_nothing() {
        let config = AlternateConfig {
            rounds: None,
            ..AlternateConfig::default()
        };
        let stop = StopSignal::new();
        stop.trigger();

        let (ticks, _) = collect(&config, &stop);
        assert!(ticks.is_empty());
    }

    #[test]
    fn observer_panic_is_reported() {
        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stop = StopSignal::new();
            let result = run_threads(&AlternateConfig::default(), &stop, &|tick: &Tick| {
                if tick.worker == 1 && tick.value == 2 {
                    panic!("observer failed at {}", tick);
                }
            });
            let _ = done_tx.send(result);
        });

        let result = done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("run_threads did not return after a worker panicked");
        assert!(matches!(
            result,
            Err(AlternateError::WorkerPanicked { worker: 1 })
        ));
    }

    #[test]
    fn stops_at_counter_overflow() {
        let config = AlternateConfig {
            seed: u64::MAX - 2,
            rounds: None,
            workers: [1, 2],
        };
        let (ticks, _) = collect(&config, &StopSignal::new());

        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks.last().unwrap().value, u64::MAX);
        assert_alternates(&ticks, u64::MAX - 2, [1, 2]);
    }
}
