//! Interruptible run loop
//!
//! Acquisition runs as its own task so an interrupt ("stop") can cancel the
//! plan in flight. Everything else goes through the single-slot queue and
//! is dispatched one utterance at a time.

use crate::runtime::acquisition::{Acquired, UtteranceSource};
use crate::runtime::assistant::Assistant;
use crate::runtime::feedback::{Feedback, FeedbackSink};
use crate::runtime::queue::command_queue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consecutive acquisition errors tolerated before giving up on the source
const MAX_ACQUISITION_FAILURES: usize = 3;

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub turns: usize,
    pub successful_turns: usize,
    pub interrupts: usize,
}

/// Cancellation token of the plan currently dispatching
#[derive(Debug, Default, Clone)]
struct InFlight(Arc<Mutex<Option<CancellationToken>>>);

impl InFlight {
    fn set(&self, token: Option<CancellationToken>) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = token;
    }

    /// Cancel the running plan; false when idle
    fn cancel(&self) -> bool {
        match self.0.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Read utterances from `source` and dispatch them until the source closes
/// or `shutdown` fires
pub async fn run<S>(
    assistant: Arc<Assistant>,
    source: S,
    sink: Arc<dyn FeedbackSink>,
    shutdown: CancellationToken,
) -> RunSummary
where
    S: UtteranceSource + 'static,
{
    let (tx, mut rx) = command_queue();
    let in_flight = InFlight::default();
    let interrupts = Arc::new(AtomicUsize::new(0));

    let acquisition = {
        let assistant = Arc::clone(&assistant);
        let sink = Arc::clone(&sink);
        let shutdown = shutdown.clone();
        let in_flight = in_flight.clone();
        let interrupts = Arc::clone(&interrupts);
        let mut source = source;

        tokio::spawn(async move {
            let mut failures = 0;
            loop {
                let acquired = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    acquired = source.next() => acquired,
                };

                match acquired {
                    Ok(Acquired::Utterance(utterance)) => {
                        failures = 0;
                        if assistant.is_interrupt(&utterance.text) && in_flight.cancel() {
                            interrupts.fetch_add(1, Ordering::SeqCst);
                            info!("interrupt delivered to running plan");
                            sink.deliver(Feedback::Notice("Stopping.".to_string()));
                            continue;
                        }
                        if tx.submit(utterance).await.is_err() {
                            break;
                        }
                    }
                    Ok(Acquired::NoUtterance) => debug!("no utterance"),
                    Ok(Acquired::Closed) => {
                        debug!("utterance source closed");
                        break;
                    }
                    Err(e) => {
                        failures += 1;
                        warn!(error = %e, failures, "acquisition failed");
                        sink.deliver(Feedback::Error(e.user_message()));
                        if failures >= MAX_ACQUISITION_FAILURES {
                            error!("giving up on utterance source");
                            break;
                        }
                    }
                }
            }
        })
    };

    let mut summary = RunSummary::default();
    while let Some(utterance) = rx.next().await {
        let token = shutdown.child_token();
        in_flight.set(Some(token.clone()));
        let plan = assistant.handle(&utterance.text, &token).await;
        in_flight.set(None);

        summary.turns += 1;
        if plan.overall_ok() {
            summary.successful_turns += 1;
        }
        sink.deliver(Feedback::Plan {
            utterance: utterance.text,
            plan,
        });

        if shutdown.is_cancelled() {
            break;
        }
    }

    drop(rx);
    if let Err(e) = acquisition.await {
        warn!(error = %e, "acquisition task ended abnormally");
    }

    summary.interrupts = interrupts.load(Ordering::SeqCst);
    info!(turns = summary.turns, ok = summary.successful_turns, interrupts = summary.interrupts, "run finished");
    summary
}
