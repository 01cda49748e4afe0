//! Component runtime shared by the comms channels.
//!
//! A [`Component`] is an independently-runnable unit (the web server, the
//! console REPL) that captures its shared state at construction time.
//! [`spawn_components`] runs them concurrently and returns a
//! [`SubsystemHandle`]; the first component to fail cancels the shared
//! [`CancellationToken`] so its siblings shut down too.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::AppError;

/// A boxed, owned future returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

pub trait Component: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    /// Consume the component and return its run loop. The loop should end
    /// when `shutdown` is cancelled or its own work is done.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

/// Handle to a running set of components.
pub struct SubsystemHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl SubsystemHandle {
    /// Await all components and return the first error, if any.
    pub async fn join(self) -> Result<(), AppError> {
        match self.inner.await {
            Ok(r) => r,
            Err(e) => Err(AppError::Comms(format!("component set panicked: {e}"))),
        }
    }
}

/// Spawn each component as its own task.
///
/// An error or panic in any component cancels `shutdown`; the remaining
/// components are drained and the first error is returned.
pub fn spawn_components(
    components: Vec<Box<dyn Component>>,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let handle = tokio::spawn(async move {
        let mut set: JoinSet<Result<(), AppError>> = JoinSet::new();

        for component in components {
            debug!(component = %component.id(), "spawning component");
            set.spawn(component.run(shutdown.clone()));
        }

        let mut first_err: Option<AppError> = None;
        while let Some(res) = set.join_next().await {
            match res {
                Err(e) => {
                    error!("component panicked: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Comms(format!("component panicked: {e}")));
                }
                Ok(Err(e)) => {
                    error!("component error: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
                Ok(Ok(())) => {}
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    SubsystemHandle { inner: handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Waits;
    struct Fails;

    impl Component for Waits {
        fn id(&self) -> &str {
            "waits"
        }
        fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async move {
                shutdown.cancelled().await;
                Ok(())
            })
        }
    }

    impl Component for Fails {
        fn id(&self) -> &str {
            "fails"
        }
        fn run(self: Box<Self>, _shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async { Err(AppError::Comms("bind failed".into())) })
        }
    }

    #[tokio::test]
    async fn clean_shutdown_returns_ok() {
        let token = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Waits), Box::new(Waits)], token.clone());
        token.cancel();
        assert!(handle.join().await.is_ok());
    }

    #[tokio::test]
    async fn failure_cancels_siblings() {
        let token = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Waits), Box::new(Fails)], token.clone());
        let err = handle.join().await.unwrap_err();
        assert!(err.to_string().contains("bind failed"));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn empty_set_finishes() {
        let handle = spawn_components(Vec::new(), CancellationToken::new());
        assert!(handle.join().await.is_ok());
    }
}
