//! Background workers that must live as long as the HTTP server.

use std::error::Error;
use std::future::Future;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

pub type BoxError = Box<dyn Error + Send + Sync>;

type Exit = (&'static str, Result<(), BoxError>);

/// Long-running tasks (relays, consumers) spawned next to the server.
///
/// Each worker is expected to run until shutdown is signalled. One that
/// stops earlier takes the whole process down with it.
#[derive(Default)]
pub struct Workers {
    set: JoinSet<Exit>,
}

impl Workers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F, E>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.set.spawn(async move { (name, task.await.map_err(Into::into)) });
    }

    /// Drives `server` to completion, then signals `shutdown` and waits for
    /// every worker to finish the work in hand.
    ///
    /// Fails if the server fails, if any worker fails, or if a worker stops
    /// before the server does.
    pub async fn serve<S, SE>(
        mut self,
        server: S,
        shutdown: &watch::Sender<bool>,
    ) -> Result<(), BoxError>
    where
        S: Future<Output = Result<(), SE>>,
        SE: Into<BoxError>,
    {
        let mut failure = tokio::select! {
            served = server => served.err().map(Into::into),
            Some(joined) = self.set.join_next() => Some(early_exit(joined)),
        };

        let _ = shutdown.send(true);
        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!(worker = name, "Worker stopped"),
                Ok((name, Err(e))) => {
                    error!(worker = name, error = %e, "Worker failed");
                    failure.get_or_insert_with(|| format!("{name} failed: {e}").into());
                }
                Err(e) => {
                    error!(error = %e, "Worker panicked");
                    failure.get_or_insert_with(|| e.into());
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn early_exit(joined: Result<Exit, JoinError>) -> BoxError {
    match joined {
        Ok((name, Ok(()))) => {
            error!(worker = name, "Worker stopped before the server");
            format!("{name} stopped before the server").into()
        }
        Ok((name, Err(e))) => {
            error!(worker = name, error = %e, "Worker failed before the server");
            format!("{name} failed: {e}").into()
        }
        Err(e) => {
            error!(error = %e, "Worker panicked");
            e.into()
        }
    }
}
