//! 异步调用路径：终态回调恰好一次、作用域跨线程传递与执行器选择。

use std::{
    error::Error as _,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use flare_client::{
    AsyncExecutors, Client, ClientConfig, ClientError, ClientRequest, ClientResponse, Connector,
    ConnectorCallback, ConnectorError, Providers, StatusCode, callback_fn, current_request,
    error::codes,
    priorities, request_filter_fn,
    test_stubs::{DroppingConnector, EchoConnector, FailingConnector, FnConnector},
};
use flare_core::{Executor, ExecutorRef, InlineExecutor, RequestScope, ScopeProbe, ThreadPoolExecutor};

const WAIT: Duration = Duration::from_secs(5);

/// 终态回调的观测结果。
#[derive(Debug)]
enum Terminal {
    Completed {
        status: StatusCode,
        body: String,
        thread: Option<String>,
        uri: Option<String>,
    },
    Failed(ClientError),
}

/// 返回回调与接收端；`completed` 与 `failed` 各自计数，便于断言“恰好一次”。
fn recording_callback(
    completions: &Arc<AtomicUsize>,
    failures: &Arc<AtomicUsize>,
) -> (impl flare_client::ResponseCallback, Receiver<Terminal>) {
    let (tx, rx) = unbounded();
    let failed_tx = tx.clone();
    let completions = Arc::clone(completions);
    let failures = Arc::clone(failures);
    let callback = callback_fn(
        move |mut response: ClientResponse, scope: &flare_core::ScopeInstance| {
            completions.fetch_add(1, Ordering::SeqCst);
            let body = response.read_entity_string().unwrap_or_default();
            let _ = tx.send(Terminal::Completed {
                status: response.status(),
                body,
                thread: thread::current().name().map(str::to_owned),
                uri: current_request(scope).map(|request| request.uri.clone()),
            });
        },
        move |error| {
            failures.fetch_add(1, Ordering::SeqCst);
            let _ = failed_tx.send(Terminal::Failed(error));
        },
    );
    (callback, rx)
}

fn wait_released(probe: &ScopeProbe) {
    let deadline = Instant::now() + WAIT;
    while !probe.is_released() {
        assert!(Instant::now() < deadline, "作用域实例应在回调后释放");
        thread::sleep(Duration::from_millis(5));
    }
}

fn pooled_config(prefix: &str) -> ClientConfig {
    ClientConfig::default()
        .with_requesting_threads(2)
        .with_responding_threads(1)
        .with_thread_name_prefix(prefix)
}

/// 池化执行器 + 回调线程上报的连接器：`completed` 恰好一次，运行在响应侧池线程上，作用域随后释放。
#[test]
fn threaded_submission_completes_once_and_releases_scope() {
    let scope = RequestScope::new();
    let connector = Arc::new(EchoConnector::threaded());
    let client = Client::builder()
        .config(pooled_config("async-it"))
        .shared_connector(connector.clone())
        .request_scope(scope.clone())
        .build()
        .unwrap();

    let completions = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let (callback, rx) = recording_callback(&completions, &failures);
    client
        .target("mem://async")
        .unwrap()
        .request()
        .unwrap()
        .entity("hello")
        .build(flare_client::Method::Post)
        .unwrap()
        .submit(callback)
        .unwrap();

    match rx.recv_timeout(WAIT).expect("应收到终态回调") {
        Terminal::Completed {
            status,
            body,
            thread,
            uri,
        } => {
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "hello");
            let thread = thread.expect("池线程应有名称");
            assert!(thread.starts_with("async-it-responding"), "实际线程：{thread}");
            assert_eq!(uri.as_deref(), Some("mem://async"));
        }
        Terminal::Failed(err) => panic!("不应失败：{err}"),
    }

    let deadline = Instant::now() + WAIT;
    while scope.active_instances() != 0 {
        assert!(Instant::now() < deadline, "作用域实例应被释放");
        thread::sleep(Duration::from_millis(5));
    }
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err(), "不应有第二次回调");
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
    assert_eq!(connector.calls(), 1);
    client.close();
}

/// 连接器传输失败：`failed` 收到调用失败，`completed` 从不触发。
#[test]
fn transport_failure_reaches_failed_only() {
    let client = Client::builder()
        .connector(FailingConnector::new())
        .executors(AsyncExecutors::inline())
        .build()
        .unwrap();
    let completions = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let (callback, rx) = recording_callback(&completions, &failures);

    client
        .target("mem://down")
        .unwrap()
        .request()
        .unwrap()
        .build(flare_client::Method::Get)
        .unwrap()
        .submit(callback)
        .unwrap();

    match rx.recv_timeout(WAIT).expect("应收到终态回调") {
        Terminal::Failed(err) => {
            assert_eq!(err.code(), codes::INVOCATION);
            let cause = err
                .source()
                .and_then(|source| source.downcast_ref::<ConnectorError>())
                .expect("原因应为连接器错误");
            assert_eq!(cause.code(), codes::CONNECTOR_TRANSPORT);
        }
        other => panic!("期望失败回调，实际：{other:?}"),
    }
    assert_eq!(completions.load(Ordering::SeqCst), 0);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

/// 连接器丢弃回调：仍然恰好收到一次失败。
#[test]
fn dropped_connector_callback_still_fails_once() {
    let scope = RequestScope::new();
    let connector = Arc::new(DroppingConnector::new());
    let client = Client::builder()
        .shared_connector(connector.clone())
        .executors(AsyncExecutors::inline())
        .request_scope(scope.clone())
        .build()
        .unwrap();
    let completions = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let (callback, rx) = recording_callback(&completions, &failures);

    client
        .target("mem://void")
        .unwrap()
        .request()
        .unwrap()
        .build(flare_client::Method::Get)
        .unwrap()
        .submit(callback)
        .unwrap();

    match rx.recv_timeout(WAIT).expect("应收到终态回调") {
        Terminal::Failed(err) => {
            let cause = err
                .source()
                .and_then(|source| source.downcast_ref::<ConnectorError>())
                .expect("原因应为连接器错误");
            assert_eq!(cause.code(), codes::CONNECTOR_CALLBACK_DROPPED);
        }
        other => panic!("期望失败回调，实际：{other:?}"),
    }
    assert_eq!(connector.calls(), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(completions.load(Ordering::SeqCst), 0);
    assert_eq!(scope.active_instances(), 0);
}

/// 异步路径上请求链 Abort：替代响应经响应链后交给 `completed`，连接器不被调用。
#[test]
fn request_chain_abort_completes_with_substitute() {
    let connector = Arc::new(EchoConnector::new());
    let client = Client::builder()
        .shared_connector(connector.clone())
        .executors(AsyncExecutors::inline())
        .request_filter(
            "circuit-breaker",
            priorities::USER,
            request_filter_fn(|context| {
                context.abort_with(ClientResponse::new(StatusCode::SERVICE_UNAVAILABLE).with_entity("open"));
                Ok(())
            }),
        )
        .unwrap()
        .build()
        .unwrap();
    let completions = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let (callback, rx) = recording_callback(&completions, &failures);

    client
        .target("mem://breaker")
        .unwrap()
        .request()
        .unwrap()
        .build(flare_client::Method::Get)
        .unwrap()
        .submit(callback)
        .unwrap();

    match rx.recv_timeout(WAIT).expect("应收到终态回调") {
        Terminal::Completed { status, body, .. } => {
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body, "open");
        }
        Terminal::Failed(err) => panic!("Abort 不是失败：{err}"),
    }
    assert_eq!(connector.calls(), 0);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
}

/// 连接器在异步路径上以 Abort 报告：按响应到达处理，只触发 `completed`。
#[test]
fn connector_abort_is_delivered_as_completion() {
    let connector = FnConnector::new("cache", |_| {
        Err(ConnectorError::abort(ClientResponse::new(StatusCode::ACCEPTED)))
    });
    let calls = connector.call_counter();
    let client = Client::builder()
        .connector(connector)
        .executors(AsyncExecutors::inline())
        .build()
        .unwrap();
    let completions = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let (callback, rx) = recording_callback(&completions, &failures);

    client
        .target("mem://cache")
        .unwrap()
        .request()
        .unwrap()
        .build(flare_client::Method::Get)
        .unwrap()
        .submit(callback)
        .unwrap();

    match rx.recv_timeout(WAIT).expect("应收到终态回调") {
        Terminal::Completed { status, .. } => assert_eq!(status, StatusCode::ACCEPTED),
        Terminal::Failed(err) => panic!("连接器 Abort 不应报告失败：{err}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
}

/// `submit_future` 可在任意执行器上等待结果。
#[test]
fn submit_future_resolves_with_response() {
    let client = Client::builder()
        .config(pooled_config("future-it"))
        .connector(EchoConnector::threaded())
        .build()
        .unwrap();

    let future = client
        .target("mem://future")
        .unwrap()
        .request()
        .unwrap()
        .entity("payload")
        .build(flare_client::Method::Put)
        .unwrap()
        .submit_future()
        .unwrap();
    let mut response = futures::executor::block_on(future).expect("应成功");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.read_entity_string().unwrap(), "payload");
    client.close();
}

/// 请求上的执行器属性覆盖默认池：内联响应执行器让 `completed` 运行在连接器的回调线程上。
#[test]
fn per_request_executor_overrides_defaults() {
    let client = Client::builder()
        .config(pooled_config("override-it"))
        .connector(EchoConnector::threaded())
        .build()
        .unwrap();
    let completions = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let (callback, rx) = recording_callback(&completions, &failures);
    let inline: ExecutorRef = Arc::new(InlineExecutor);

    client
        .target("mem://override")
        .unwrap()
        .request()
        .unwrap()
        .responding_executor(inline)
        .build(flare_client::Method::Get)
        .unwrap()
        .submit(callback)
        .unwrap();

    match rx.recv_timeout(WAIT).expect("应收到终态回调") {
        Terminal::Completed { thread, .. } => {
            assert_eq!(thread.as_deref(), Some("echo-connector"));
        }
        Terminal::Failed(err) => panic!("不应失败：{err}"),
    }
    client.close();
}

/// 请求侧执行器拒绝任务时，提交立即以执行器错误失败。
#[test]
fn rejected_submission_reports_executor_error() {
    let pool = Arc::new(ThreadPoolExecutor::new("rejecting", 1).unwrap());
    pool.shutdown();
    let connector = Arc::new(EchoConnector::new());
    let scope = RequestScope::new();
    let client = Client::builder()
        .shared_connector(connector.clone())
        .executors(AsyncExecutors::inline())
        .request_scope(scope.clone())
        .build()
        .unwrap();
    let (tx, rx) = bounded(1);
    let callback = callback_fn(
        |_, _| panic!("被拒绝的提交不应完成"),
        move |error: ClientError| {
            let _ = tx.send(error.code());
        },
    );

    client
        .target("mem://rejected")
        .unwrap()
        .request()
        .unwrap()
        .requesting_executor(pool)
        .build(flare_client::Method::Get)
        .unwrap()
        .submit(callback)
        .unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), codes::EXECUTOR);
    assert_eq!(connector.calls(), 0);
    assert_eq!(scope.active_instances(), 0);
}

/// 并发提交时每个调用各自拥有作用域实例，回调只看到本次请求的绑定。
#[test]
fn concurrent_submissions_keep_scopes_isolated() {
    let scope = RequestScope::new();
    let client = Client::builder()
        .config(pooled_config("isolation-it"))
        .connector(EchoConnector::threaded())
        .providers(Providers::new())
        .request_scope(scope.clone())
        .build()
        .unwrap();
    let (tx, rx) = unbounded();

    for index in 0..16 {
        let tx = tx.clone();
        let failed_tx = tx.clone();
        let uri = format!("mem://item/{index}");
        client
            .target(uri.clone())
            .unwrap()
            .request()
            .unwrap()
            .build(flare_client::Method::Get)
            .unwrap()
            .submit(callback_fn(
                move |_, scope: &flare_core::ScopeInstance| {
                    let seen = current_request(scope).map(|request| request.uri.clone());
                    let _ = tx.send((uri, seen));
                },
                move |error: ClientError| {
                    let _ = failed_tx.send((error.to_string(), None));
                },
            ))
            .unwrap();
    }
    drop(tx);

    for _ in 0..16 {
        let (expected, seen) = rx.recv_timeout(WAIT).expect("每次提交都应有回调");
        assert_eq!(seen.as_deref(), Some(expected.as_str()));
    }
    let deadline = Instant::now() + WAIT;
    while scope.active_instances() != 0 {
        assert!(Instant::now() < deadline, "全部作用域实例应被释放");
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(scope.created_instances(), 16);
    client.close();
}

/// 内联执行器下提交返回前回调已完成，调用方持有的探针可确认作用域已释放。
#[test]
fn inline_submission_releases_scope_before_returning() {
    let scope = RequestScope::new();
    let probes = Arc::new(parking_lot::Mutex::new(Vec::<ScopeProbe>::new()));
    let sink = Arc::clone(&probes);
    let client = Client::builder()
        .connector(EchoConnector::new())
        .executors(AsyncExecutors::inline())
        .request_scope(scope.clone())
        .build()
        .unwrap();
    let callback = callback_fn(
        move |_, scope: &flare_core::ScopeInstance| sink.lock().push(scope.probe()),
        |error: ClientError| panic!("不应失败：{error}"),
    );

    client
        .target("mem://inline")
        .unwrap()
        .request()
        .unwrap()
        .build(flare_client::Method::Get)
        .unwrap()
        .submit(callback)
        .unwrap();

    let probes = probes.lock();
    assert_eq!(probes.len(), 1);
    wait_released(&probes[0]);
    assert_eq!(scope.active_instances(), 0);
}

/// 报告响应后仍在 `apply_async` 中停留、直到测试放行才返回的连接器。
struct LingeringConnector {
    reported: Sender<()>,
    resume: Receiver<()>,
}

impl Connector for LingeringConnector {
    fn name(&self) -> &str {
        "lingering"
    }

    fn apply(&self, _request: ClientRequest) -> Result<ClientResponse, ConnectorError> {
        Ok(ClientResponse::new(StatusCode::OK))
    }

    fn apply_async(&self, request: ClientRequest, callback: ConnectorCallback) {
        callback.complete(self.apply(request));
        let _ = self.reported.send(());
        let _ = self.resume.recv_timeout(WAIT);
    }
}

/// 连接器报告结果后继续占用请求侧线程时，作用域仍在 `completed` 返回后立即释放。
#[test]
fn scope_is_released_while_connector_lingers_after_reporting() {
    let (reported_tx, reported_rx) = bounded(1);
    let (resume_tx, resume_rx) = bounded(1);
    let requesting = Arc::new(ThreadPoolExecutor::new("lingering-requesting", 1).unwrap());
    let scope = RequestScope::new();
    let client = Client::builder()
        .connector(LingeringConnector {
            reported: reported_tx,
            resume: resume_rx,
        })
        .executors(AsyncExecutors::new(requesting.clone(), Arc::new(InlineExecutor)))
        .request_scope(scope.clone())
        .build()
        .unwrap();
    let (probe_tx, probe_rx) = bounded(1);
    let callback = callback_fn(
        move |_, scope: &flare_core::ScopeInstance| {
            let _ = probe_tx.send(scope.probe());
        },
        |error: ClientError| panic!("不应失败：{error}"),
    );

    client
        .target("mem://lingering")
        .unwrap()
        .request()
        .unwrap()
        .build(flare_client::Method::Get)
        .unwrap()
        .submit(callback)
        .unwrap();

    let probe = probe_rx.recv_timeout(WAIT).expect("应收到 completed");
    reported_rx.recv_timeout(WAIT).expect("连接器应已报告结果");
    assert!(probe.is_released(), "连接器仍在运行时作用域应已释放");
    assert_eq!(probe.outstanding_references(), 0);
    assert_eq!(scope.active_instances(), 0);

    resume_tx.send(()).unwrap();
    requesting.shutdown();
    client.close();
}
