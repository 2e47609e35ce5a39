use super::{merge_transcripts, AlternateConfig, AlternateError, StopSignal, Tick};
use log::{debug, trace};
use std::sync::Arc;
use tokio::sync::oneshot;

pub type Observer = Arc<dyn Fn(&Tick) + Send + Sync>;

/// The value in flight plus the sender the receiving worker answers on.
///
/// Each hand-off is a fresh oneshot, so at any moment exactly one worker can
/// make progress. Dropping a baton, or a receiver, ends the partner's run.
struct Baton {
    value: u64,
    reply: oneshot::Sender<Baton>,
}

async fn worker(
    id: u32,
    mut receiver: oneshot::Receiver<Baton>,
    config: AlternateConfig,
    stop: StopSignal,
    observe: Observer,
) -> Vec<Tick> {
    let mut ticks = Vec::new();

    loop {
        let baton = tokio::select! {
            biased;
            _ = stop.triggered() => {
                debug!("worker {} cancelled", id);
                return ticks;
            }
            received = &mut receiver => match received {
                Ok(baton) => baton,
                Err(_) => {
                    trace!("worker {} told to stop", id);
                    return ticks;
                }
            },
        };

        if !config.admits(baton.value) {
            debug!("worker {} ends the run at {}", id, baton.value);
            return ticks;
        }

        let tick = Tick {
            worker: id,
            value: baton.value,
        };
        observe(&tick);
        ticks.push(tick);

        let Some(next) = baton.value.checked_add(1) else {
            debug!("worker {} stops at counter overflow", id);
            return ticks;
        };

        let (reply, next_receiver) = oneshot::channel();
        if baton.reply.send(Baton { value: next, reply }).is_err() {
            trace!("worker {} partner is gone", id);
            return ticks;
        }
        receiver = next_receiver;
    }
}

/// Runs the counter as two tokio tasks: one spawned, one on the caller's task.
pub async fn run_tasks(
    config: &AlternateConfig,
    stop: &StopSignal,
    observe: Observer,
) -> Result<Vec<Tick>, AlternateError> {
    let [first_id, main_id] = config.workers;
    let (seed, first_receiver) = oneshot::channel();
    let (reply, main_receiver) = oneshot::channel();

    debug!("alternating on tasks from {}", config.seed);

    let first = tokio::spawn(worker(
        first_id,
        first_receiver,
        config.clone(),
        stop.clone(),
        Arc::clone(&observe),
    ));

    if seed
        .send(Baton {
            value: config.seed,
            reply,
        })
        .is_err()
    {
        return Err(AlternateError::Disconnected { worker: main_id });
    }

    let main_ticks = worker(main_id, main_receiver, config.clone(), stop.clone(), observe).await;
    let first_ticks = first
        .await
        .map_err(|_| AlternateError::WorkerPanicked { worker: first_id })?;

    Ok(merge_transcripts(first_ticks, main_ticks))
}
