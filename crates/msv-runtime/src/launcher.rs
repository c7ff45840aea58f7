//! Process-level entry points.
//!
//! - `run_app`: start, serve until SIGINT/SIGTERM, stop.
//! - `scoped_app` / `shadow_app`: start, hand the application to a closure,
//!   always stop afterwards.

use std::future::Future;
use std::sync::Arc;

use crate::{Application, ApplicationError, ApplicationOptions};

/// Start an application and keep it running until the process is asked to
/// shut down.
///
/// A failed start is logged, whatever did start is torn down, and the start
/// error is returned.
pub async fn run_app(options: ApplicationOptions) -> Result<(), ApplicationError> {
    let app = Application::new(options)?;
    let logger = app.logger().clone();

    if let Err(e) = app.start().await {
        logger.error(format!("Failed to start application: {e}"));
        if let Err(stop_error) = app.stop().await {
            logger.error(format!("Failed to stop application: {stop_error}"));
        }
        return Err(e);
    }

    match shutdown_signal().await {
        Ok(signal) => logger.log(format!("Signal {signal} has been caught")),
        Err(e) => logger.error(format!("Failed to listen for shutdown signals: {e}")),
    }

    app.stop().await.map_err(|e| {
        logger.error(format!("Failed to stop application: {e}"));
        e
    })
}

/// Start an application, run `handler` against it, then stop it.
///
/// The handler's error (or the start error) is logged and returned. The
/// application is stopped whether or not the handler succeeded.
pub async fn scoped_app<F, Fut, T>(options: ApplicationOptions, handler: F) -> anyhow::Result<T>
where
    F: FnOnce(Arc<Application>) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let app = Arc::new(Application::new(options)?);
    let logger = app.logger().clone();

    let result = match app.start().await {
        Ok(()) => handler(app.clone()).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = &result {
        logger.error(format!("{e:#}"));
    }

    match app.stop().await {
        Ok(()) => result,
        Err(stop_error) => {
            logger.error(format!("Failed to stop application: {stop_error}"));
            match result {
                Ok(_) => Err(stop_error.into()),
                Err(e) => Err(e),
            }
        }
    }
}

/// `scoped_app` in shadow mode: services run, but register nothing with the
/// bridge. Used by clients that only call into a shared transport.
pub async fn shadow_app<F, Fut, T>(options: ApplicationOptions, handler: F) -> anyhow::Result<T>
where
    F: FnOnce(Arc<Application>) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    scoped_app(options.shadow_mode(true), handler).await
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok("SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExportsBuilder, Service, ServiceDescription};
    use anyhow::bail;
    use async_trait::async_trait;
    use msv_bridge::BridgeError;
    use msv_graph::{GraphError, GraphState};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        inits: AtomicUsize,
        deinits: AtomicUsize,
    }

    struct Pinger {
        counters: Arc<Counters>,
        fail: bool,
    }

    #[async_trait]
    impl Service for Pinger {
        async fn init(&self) -> anyhow::Result<()> {
            self.counters.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("pinger refused to start");
            }
            Ok(())
        }

        async fn deinit(&self) -> anyhow::Result<()> {
            self.counters.deinits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn exports(self: Arc<Self>, exports: ExportsBuilder) -> ExportsBuilder {
            exports.task("ping", |_, _| async move { anyhow::Ok(json!("pong")) })
        }
    }

    fn pinger(counters: &Arc<Counters>, fail: bool) -> ApplicationOptions {
        let counters = counters.clone();
        ApplicationOptions::new().service(
            "pinger",
            ServiceDescription::new(move |_| {
                anyhow::Ok(Pinger {
                    counters: counters.clone(),
                    fail,
                })
            }),
        )
    }

    #[tokio::test]
    async fn test_scoped_app_returns_handler_result_and_stops() {
        let counters = Arc::new(Counters::default());
        let seen = Mutex::new(None);

        let pong = scoped_app(pinger(&counters, false), |app| {
            *seen.lock() = Some(app.clone());
            async move { Ok(app.run("ping", json!({})).await?) }
        })
        .await
        .unwrap();

        assert_eq!(pong, json!("pong"));
        let app = seen.lock().take().unwrap();
        assert!(!app.is_shadow());
        assert_eq!(app.state(), GraphState::Stopped);
        assert_eq!(counters.deinits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scoped_app_stops_when_handler_fails() {
        let counters = Arc::new(Counters::default());
        let seen = Mutex::new(None);

        let err = scoped_app(pinger(&counters, false), |app| {
            *seen.lock() = Some(app.clone());
            async move { Err::<(), _>(anyhow::anyhow!("handler gave up")) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "handler gave up");
        assert_eq!(seen.lock().take().unwrap().state(), GraphState::Stopped);
        assert_eq!(counters.deinits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shadow_app_runs_services_without_exports() {
        let counters = Arc::new(Counters::default());

        let result = shadow_app(pinger(&counters, false), |app| async move {
            assert!(app.is_shadow());
            assert!(app.service_as::<Pinger>("pinger").is_ok());
            Ok(app.run("ping", json!({})).await)
        })
        .await
        .unwrap();

        assert_eq!(result, Err(BridgeError::UnknownTask("ping".to_string())));
        assert_eq!(counters.inits.load(Ordering::SeqCst), 1);
        assert_eq!(counters.deinits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scoped_app_failed_start_skips_handler() {
        let counters = Arc::new(Counters::default());
        let called = AtomicUsize::new(0);

        let err = scoped_app(pinger(&counters, true), |_| {
            called.fetch_add(1, Ordering::SeqCst);
            async move { Ok(()) }
        })
        .await
        .unwrap_err();

        assert!(format!("{err:#}").contains("pinger refused to start"), "{err:#}");
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(counters.deinits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_app_failed_start_returns_start_error() {
        let counters = Arc::new(Counters::default());

        let err = run_app(pinger(&counters, true)).await.unwrap_err();

        assert!(matches!(
            err,
            ApplicationError::Graph(GraphError::NodeInit { ref node, .. }) if node == "service:pinger"
        ));
        // The partially started service was torn down before returning.
        assert_eq!(counters.inits.load(Ordering::SeqCst), 1);
        assert_eq!(counters.deinits.load(Ordering::SeqCst), 1);
    }
}
