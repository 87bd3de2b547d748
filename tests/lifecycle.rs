//! End-to-end ordering of the controller's lifecycle.

use std::time::Duration;

use graceful_service::http::{worker, ServerError};
use graceful_service::lifecycle::{
    Controller, DrainOutcome, LifecycleError, Phase, TerminationSignal,
};
use graceful_service::net::{Listener, ListenerError};
use graceful_service::Database;
use tokio::sync::oneshot;

mod common;
use common::{RecordingResource, UNIT};

fn signal_on(rx: oneshot::Receiver<TerminationSignal>) -> impl std::future::Future<Output = TerminationSignal> {
    async move { rx.await.unwrap_or(TerminationSignal::Terminate) }
}

#[tokio::test]
async fn test_clean_shutdown_runs_phases_in_order() {
    let (app, mut started) = common::signalling_router(2 * UNIT);
    let resource = RecordingResource::new();
    let calls = resource.calls.clone();

    let controller = Controller::new(common::test_config(5 * UNIT), resource, app);
    let timeline = controller.timeline();
    let (signal_tx, signal_rx) = oneshot::channel();
    let run = tokio::spawn(controller.run_until(signal_on(signal_rx)));

    let addr = timeline.server_address().await;
    let request = tokio::spawn(common::client().get(format!("http://{addr}/")).send());
    started.recv().await.unwrap();
    signal_tx.send(TerminationSignal::Interrupt).unwrap();

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.signal, TerminationSignal::Interrupt);
    assert_eq!(report.drain, DrainOutcome::Drained);
    assert!(report.shutdown_duration < 5 * UNIT);

    assert_eq!(
        timeline.phases(),
        vec![
            Phase::ResourceOpened,
            Phase::ServerStarted { address: addr },
            Phase::SignalReceived(TerminationSignal::Interrupt),
            Phase::StopBegun { deadline: 5 * UNIT },
            Phase::StopCompleted,
            Phase::ResourceClosed,
            Phase::Exited,
        ]
    );
    assert_eq!(*calls.lock().unwrap(), vec!["open", "close"]);

    let res = request.await.unwrap().unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "done");
}

#[tokio::test]
async fn test_timeout_still_closes_resource_promptly() {
    let (app, mut started) = common::signalling_router(4 * UNIT);
    let resource = RecordingResource::new();
    let calls = resource.calls.clone();

    let controller = Controller::new(common::test_config(UNIT), resource, app);
    let timeline = controller.timeline();
    let (signal_tx, signal_rx) = oneshot::channel();
    let run = tokio::spawn(controller.run_until(signal_on(signal_rx)));

    let addr = timeline.server_address().await;
    let request = tokio::spawn(common::client().get(format!("http://{addr}/")).send());
    started.recv().await.unwrap();
    signal_tx.send(TerminationSignal::Terminate).unwrap();

    let report = run.await.unwrap().unwrap();
    assert!(report.timed_out());
    assert_eq!(report.drain, DrainOutcome::TimedOut { in_flight: 1 });
    assert!(report.shutdown_duration >= UNIT);
    assert!(
        report.shutdown_duration < 3 * UNIT,
        "close waited on the straggler: {:?}",
        report.shutdown_duration
    );

    let phases = timeline.phases();
    assert_eq!(
        &phases[3..],
        &[
            Phase::StopBegun { deadline: UNIT },
            Phase::StopTimedOut { in_flight: 1 },
            Phase::ResourceClosed,
            Phase::Exited,
        ]
    );
    assert_eq!(*calls.lock().unwrap(), vec!["open", "close"]);

    // The detached straggler is not cancelled.
    assert_eq!(request.await.unwrap().unwrap().status(), 200);
}

#[tokio::test]
async fn test_open_failure_never_starts_server() {
    let (app, _started) = common::signalling_router(UNIT);
    let resource = RecordingResource::failing();
    let calls = resource.calls.clone();

    let controller = Controller::new(common::test_config(UNIT), resource, app);
    let timeline = controller.timeline();
    let result = controller.run_until(std::future::pending()).await;

    assert!(matches!(result, Err(LifecycleError::Connection(_))));
    assert_eq!(timeline.phases(), vec![Phase::ResourceOpenFailed]);
    assert_eq!(*calls.lock().unwrap(), vec!["open"]);
}

#[tokio::test]
async fn test_shutdown_with_no_requests_is_fast() {
    let (app, _started) = common::signalling_router(UNIT);
    let controller = Controller::new(common::test_config(5 * UNIT), RecordingResource::new(), app);
    let timeline = controller.timeline();
    let (signal_tx, signal_rx) = oneshot::channel();
    let run = tokio::spawn(controller.run_until(signal_on(signal_rx)));

    timeline.server_address().await;
    signal_tx.send(TerminationSignal::Terminate).unwrap();

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.drain, DrainOutcome::Drained);
    assert!(report.shutdown_duration < UNIT, "took {:?}", report.shutdown_duration);
}

#[tokio::test]
async fn test_bind_failure_closes_resource() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = common::test_config(UNIT);
    config.listener.bind_address = occupied.local_addr().unwrap().to_string();

    let (app, _started) = common::signalling_router(UNIT);
    let resource = RecordingResource::new();
    let calls = resource.calls.clone();
    let controller = Controller::new(config, resource, app);
    let timeline = controller.timeline();

    let result = controller.run_until(std::future::pending()).await;

    assert!(
        matches!(
            result,
            Err(LifecycleError::Server(ServerError::Fatal(ListenerError::Bind(_))))
        ),
        "unexpected result: {result:?}"
    );
    assert_eq!(
        timeline.phases(),
        vec![
            Phase::ResourceOpened,
            Phase::ServerFailed,
            Phase::ResourceClosed,
            Phase::Exited,
        ]
    );
    assert_eq!(*calls.lock().unwrap(), vec!["open", "close"]);
}

/// A listener over a connected, non-listening socket. `accept` fails with
/// `EINVAL` once the peer's byte makes it readable.
#[cfg(unix)]
fn failing_listener() -> (Listener, std::net::TcpStream) {
    use std::io::Write;
    use std::os::fd::{FromRawFd, IntoRawFd};

    let acceptor = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut peer = std::net::TcpStream::connect(acceptor.local_addr().unwrap()).unwrap();
    let (connected, _) = acceptor.accept().unwrap();
    peer.write_all(b"x").unwrap();

    // SAFETY: the descriptor is owned by `connected` and moved, not shared.
    let socket = unsafe { std::net::TcpListener::from_raw_fd(connected.into_raw_fd()) };
    socket.set_nonblocking(true).unwrap();
    let listener = Listener::from_tcp(tokio::net::TcpListener::from_std(socket).unwrap(), 16).unwrap();
    (listener, peer)
}

#[cfg(unix)]
#[tokio::test]
async fn test_accept_failure_while_serving_stops_and_closes() {
    let (listener, _peer) = failing_listener();
    let (app, _started) = common::signalling_router(UNIT);
    let resource = RecordingResource::new();
    let calls = resource.calls.clone();

    let controller =
        Controller::new(common::test_config(5 * UNIT), resource, app).with_listener(listener);
    let timeline = controller.timeline();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        controller.run_until(std::future::pending()),
    )
    .await
    .expect("a failed accept loop should end the run");

    assert!(
        matches!(
            result,
            Err(LifecycleError::Server(ServerError::Fatal(ListenerError::Accept(_))))
        ),
        "unexpected result: {result:?}"
    );

    let phases = timeline.phases();
    assert!(matches!(phases[1], Phase::ServerStarted { .. }));
    assert_eq!(
        &phases[2..],
        &[
            Phase::ServerFailed,
            Phase::StopBegun { deadline: 5 * UNIT },
            Phase::StopCompleted,
            Phase::ResourceClosed,
            Phase::Exited,
        ]
    );
    assert_eq!(*calls.lock().unwrap(), vec!["open", "close"]);
}

#[tokio::test]
async fn test_database_service_end_to_end() {
    let config = common::test_config(5 * UNIT);
    let database = Database::new(config.database.clone());
    let app = worker::routes(config.worker.clone());

    let controller = Controller::new(config, database, app);
    let timeline = controller.timeline();
    let (signal_tx, signal_rx) = oneshot::channel();
    let run = tokio::spawn(controller.run_until(signal_on(signal_rx)));

    let addr = timeline.server_address().await;
    let res = common::client()
        .get(format!("http://{addr}/"))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.text().await.unwrap(),
        "Hello from the server! Request processed.\n"
    );

    signal_tx.send(TerminationSignal::Interrupt).unwrap();
    let report = run.await.unwrap().unwrap();
    assert_eq!(report.drain, DrainOutcome::Drained);
    assert_eq!(timeline.phases().last(), Some(&Phase::Exited));
}
