//! Single-writer automaton
//!
//! All replicated state lives inside one task. Other tasks reach it only by
//! sending closures through an [`AutomatonInvoker`], so state is never
//! touched concurrently and needs no internal locking.
//!
//! ```text
//! sweeper ──┐
//!           ├──► invoke/call ──► channel ──► automaton task ──► &mut S
//! hydra   ──┤
//! rpc     ──┘
//! ```

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{HydraError, Result};

type Action<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Command<S> {
    Run(Action<S>),
    Stop,
}

/// Handle to the automaton task owning state `S`
pub struct AutomatonInvoker<S> {
    tx: mpsc::UnboundedSender<Command<S>>,
}

impl<S> Clone for AutomatonInvoker<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: Send + 'static> AutomatonInvoker<S> {
    /// Move `state` into a new automaton task
    ///
    /// The join handle yields the state back once the automaton is stopped
    /// or every invoker has been dropped.
    pub fn spawn(name: &'static str, state: S) -> (Self, JoinHandle<S>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command<S>>();

        let handle = tokio::spawn(async move {
            let mut state = state;
            info!(automaton = name, "Automaton started");

            while let Some(command) = rx.recv().await {
                match command {
                    Command::Run(action) => action(&mut state),
                    Command::Stop => break,
                }
            }

            info!(automaton = name, "Automaton stopped");
            state
        });

        (Self { tx }, handle)
    }

    /// Enqueue `action` without waiting for it to run
    pub fn invoke<F>(&self, action: F) -> Result<()>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx
            .send(Command::Run(Box::new(action)))
            .map_err(|_| HydraError::AutomatonStopped)
    }

    /// Run `action` on the automaton and wait for its result
    pub async fn call<F, R>(&self, action: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.invoke(move |state| {
            let _ = tx.send(action(state));
        })?;
        rx.await.map_err(|_| HydraError::AutomatonStopped)
    }

    /// Ask the automaton to exit after the actions already queued
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}
