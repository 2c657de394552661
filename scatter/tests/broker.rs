//! End-to-end broker tests against wiremock downstreams.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use scatter::{Broker, Config, EndpointConfig, Stat};
use scatter_moka::MokaStorage;
use scatter_storage::config::GoCacheConfig;
use scatter_storage::{DiscardStorage, ResponseView, Storage, StorageError, StorageResult};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string, header, method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn seconds(s: u64) -> scatter::Duration {
    scatter::Duration(Duration::from_secs(s))
}

fn millis(ms: u64) -> scatter::Duration {
    scatter::Duration(Duration::from_millis(ms))
}

fn endpoint(url: impl Into<String>) -> EndpointConfig {
    EndpointConfig {
        url: url.into(),
        timeout: None,
    }
}

fn base_config(endpoints: BTreeMap<String, EndpointConfig>) -> Config {
    Config {
        addr: "127.0.0.1:0".to_owned(),
        shutdown_timeout: seconds(1),
        max_handlers: 0,
        worker_num: 0,
        http_client_timeout: seconds(5),
        endpoints,
        store_type: String::new(),
        redis: None,
        memcache: None,
        binmemcache: None,
        gocache: None,
    }
}

/// Serves the broker on an ephemeral port; returns its base URL.
async fn spawn_broker(
    broker: &Broker,
) -> (String, CancellationToken, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = CancellationToken::new();
    let handle = tokio::spawn({
        let broker = broker.clone();
        let token = token.clone();
        async move {
            broker.serve_on(listener, token).await.unwrap();
        }
    });
    (format!("http://{addr}"), token, handle)
}

fn accumulate(acc: &mut Stat, s: Stat) {
    acc.inquire += s.inquire;
    acc.inquire_fail += s.inquire_fail;
    acc.inquire_timeout += s.inquire_timeout;
    acc.store_timeout += s.store_timeout;
    acc.worker_fail += s.worker_fail;
}

/// Polls (and accumulates) stat snapshots until `pred` holds or the
/// deadline passes. Snapshots reset the live counters, so the accumulated
/// value is the total since the broker started.
async fn wait_for_stat(
    broker: &Broker,
    deadline: Duration,
    pred: impl Fn(&Stat) -> bool,
) -> Stat {
    let start = tokio::time::Instant::now();
    let mut acc = Stat::default();
    loop {
        accumulate(&mut acc, broker.stat());
        if pred(&acc) || start.elapsed() > deadline {
            return acc;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fan_out_reaches_every_endpoint() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok-a"))
        .expect(1)
        .mount(&server_a)
        .await;
    // Endpoint b carries a fixed base query; the inbound one is appended.
    Mock::given(method("GET"))
        .and(query_param("fixed", "1"))
        .and(query_param("q", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok-b"))
        .expect(1)
        .mount(&server_b)
        .await;

    let mut endpoints = BTreeMap::new();
    endpoints.insert("a".to_owned(), endpoint(format!("{}/", server_a.uri())));
    endpoints.insert("b".to_owned(), endpoint(format!("{}/?fixed=1", server_b.uri())));
    let broker = Broker::new(base_config(endpoints), Arc::new(DiscardStorage)).unwrap();
    let (base, token, handle) = spawn_broker(&broker).await;

    let response = reqwest::get(format!("{base}/x?q=1")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/json; charset=utf-8"
    );
    let ack: serde_json::Value = response.json().await.unwrap();
    uuid::Uuid::parse_str(ack["request_id"].as_str().unwrap()).unwrap();
    assert_eq!(ack["endpoints"], serde_json::json!(["a", "b"]));

    let stat = wait_for_stat(&broker, Duration::from_secs(3), |s| s.inquire == 2).await;
    assert_eq!(stat.inquire, 2);
    assert_eq!(stat.inquire_fail, 0);
    assert_eq!(stat.inquire_timeout, 0);
    assert_eq!(stat.store_timeout, 0);
    assert_eq!(stat.worker_fail, 0);

    // The mocks assert method and query on drop; wait for delivery first.
    for server in [&server_a, &server_b] {
        let start = tokio::time::Instant::now();
        while server.received_requests().await.unwrap().is_empty()
            && start.elapsed() < Duration::from_secs(3)
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        server.verify().await;
    }

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn post_body_and_content_type_are_replayed() {
    let mut servers = Vec::new();
    let mut endpoints = BTreeMap::new();
    for name in ["a", "b", "c"] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string("hello"))
            .and(header("content-type", "text/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("reply-{name}")))
            .expect(1)
            .mount(&server)
            .await;
        endpoints.insert(name.to_owned(), endpoint(format!("{}/", server.uri())));
        servers.push(server);
    }

    let names: Vec<String> = endpoints.keys().cloned().collect();
    let storage = Arc::new(MokaStorage::new(
        &GoCacheConfig {
            expire_in: seconds(60),
        },
        &names,
    ));
    let mut config = base_config(endpoints);
    config.store_type = "gocache".to_owned();
    let broker = Broker::new(config, storage.clone()).unwrap();
    let (base, token, handle) = spawn_broker(&broker).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/"))
        .header("content-type", "text/plain")
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let ack: serde_json::Value = response.json().await.unwrap();
    let reqid = ack["request_id"].as_str().unwrap().to_owned();

    // The acknowledgement races with fan-out; poll storage like a client
    // would.
    let start = tokio::time::Instant::now();
    let view = loop {
        let view = storage.get_response(&reqid).await.unwrap();
        if view.results.len() == 3 || start.elapsed() > Duration::from_secs(3) {
            break view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(view.method, "POST");
    assert_eq!(view.results.len(), 3);
    assert_eq!(view.results["a"], "reply-a");
    assert_eq!(view.results["b"], "reply-b");
    assert_eq!(view.results["c"], "reply-c");

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_endpoint_times_out_and_leaves_no_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut endpoints = BTreeMap::new();
    endpoints.insert(
        "slow".to_owned(),
        EndpointConfig {
            url: format!("{}/", server.uri()),
            timeout: Some(millis(50)),
        },
    );
    let names = vec!["slow".to_owned()];
    let storage = Arc::new(MokaStorage::new(
        &GoCacheConfig {
            expire_in: seconds(60),
        },
        &names,
    ));
    let broker = Broker::new(base_config(endpoints), storage.clone()).unwrap();
    let (base, token, handle) = spawn_broker(&broker).await;

    let started = tokio::time::Instant::now();
    let response = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(response.status(), 200);
    // The acknowledgement must not wait for the endpoint.
    assert!(started.elapsed() < Duration::from_millis(200));
    let ack: serde_json::Value = response.json().await.unwrap();
    let reqid = ack["request_id"].as_str().unwrap().to_owned();

    let stat = wait_for_stat(&broker, Duration::from_secs(3), |s| s.inquire_timeout == 1).await;
    assert_eq!(stat.inquire, 1);
    assert_eq!(stat.inquire_timeout, 1);
    assert_eq!(stat.inquire_fail, 0);

    let view = storage.get_response(&reqid).await.unwrap();
    assert!(view.results.is_empty());

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn saturated_worker_pool_drops_jobs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slow")
                .set_delay(Duration::from_secs(1)),
        )
        .mount(&server)
        .await;

    let mut endpoints = BTreeMap::new();
    for name in ["a", "b", "c", "d"] {
        endpoints.insert(name.to_owned(), endpoint(format!("{}/", server.uri())));
    }
    let mut config = base_config(endpoints);
    config.worker_num = 1;
    let broker = Broker::new(config, Arc::new(DiscardStorage)).unwrap();
    let (base, token, handle) = spawn_broker(&broker).await;

    let response = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(response.status(), 200);

    // One job lands on the single executor; the other three find no ready
    // receiver on the unbuffered channel.
    let stat = wait_for_stat(&broker, Duration::from_secs(4), |s| {
        s.inquire == 1 && s.worker_fail == 3
    })
    .await;
    assert_eq!(stat.inquire, 1);
    assert_eq!(stat.worker_fail, 3);

    token.cancel();
    handle.await.unwrap();
}

/// Storage whose record write always fails; counts every write attempt.
#[derive(Default)]
struct FailingStorage {
    writes: AtomicUsize,
}

#[async_trait]
impl Storage for FailingStorage {
    async fn store_request(&self, _reqid: &str, _method: &str, _url: &str) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::backend(std::io::Error::other(
            "injected failure",
        )))
    }

    async fn store_response(&self, _reqid: &str, _name: &str, _data: &[u8]) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_response(&self, reqid: &str) -> StorageResult<ResponseView> {
        Err(StorageError::NotFound(reqid.to_owned()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn record_write_failure_blocks_fan_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut endpoints = BTreeMap::new();
    endpoints.insert("a".to_owned(), endpoint(format!("{}/", server.uri())));
    let storage = Arc::new(FailingStorage::default());
    let broker = Broker::new(base_config(endpoints), storage.clone()).unwrap();
    let (base, token, handle) = spawn_broker(&broker).await;

    let response = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(response.status(), 500);
    let detail: serde_json::Value = response.json().await.unwrap();
    assert_eq!(detail["status"], 500);
    assert_eq!(detail["title"], "failed to prepare storage");
    assert!(!detail["request_id"].as_str().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(broker.stat(), Stat::default());
    assert_eq!(storage.writes.load(Ordering::SeqCst), 1);

    token.cancel();
    handle.await.unwrap();
}

/// Storage that only counts writes.
#[derive(Default)]
struct CountingStorage {
    writes: AtomicUsize,
}

#[async_trait]
impl Storage for CountingStorage {
    async fn store_request(&self, _reqid: &str, _method: &str, _url: &str) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn store_response(&self, _reqid: &str, _name: &str, _data: &[u8]) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_response(&self, reqid: &str) -> StorageResult<ResponseView> {
        Err(StorageError::NotFound(reqid.to_owned()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn other_methods_are_refused_without_side_effects() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut endpoints = BTreeMap::new();
    endpoints.insert("a".to_owned(), endpoint(format!("{}/", server.uri())));
    let storage = Arc::new(CountingStorage::default());
    let broker = Broker::new(base_config(endpoints), storage.clone()).unwrap();
    let (base, token, handle) = spawn_broker(&broker).await;

    let client = reqwest::Client::new();
    let response = client.put(format!("{base}/")).send().await.unwrap();
    assert_eq!(response.status(), 405);
    assert_eq!(response.headers()["allow"], "GET, POST");
    let detail: serde_json::Value = response.json().await.unwrap();
    assert_eq!(detail["status"], 405);
    // No identifier is minted for an unrouteable request.
    assert!(detail.get("request_id").is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(storage.writes.load(Ordering::SeqCst), 0);
    assert_eq!(broker.stat(), Stat::default());

    token.cancel();
    handle.await.unwrap();
}

/// Storage slow enough to hold a handler open.
struct SlowStorage;

#[async_trait]
impl Storage for SlowStorage {
    async fn store_request(&self, _reqid: &str, _method: &str, _url: &str) -> StorageResult<()> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(())
    }

    async fn store_response(&self, _reqid: &str, _name: &str, _data: &[u8]) -> StorageResult<()> {
        Ok(())
    }

    async fn get_response(&self, reqid: &str) -> StorageResult<ResponseView> {
        Err(StorageError::NotFound(reqid.to_owned()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handler_limit_sheds_excess_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut endpoints = BTreeMap::new();
    endpoints.insert("a".to_owned(), endpoint(format!("{}/", server.uri())));
    let mut config = base_config(endpoints);
    config.max_handlers = 1;
    let broker = Broker::new(config, Arc::new(SlowStorage)).unwrap();
    let (base, token, handle) = spawn_broker(&broker).await;

    let client = reqwest::Client::new();
    let first = client.get(format!("{base}/"));
    let second = client.get(format!("{base}/"));
    let (first, second) = tokio::join!(
        first.send(),
        async {
            // Let the first request occupy the only handler slot.
            tokio::time::sleep(Duration::from_millis(50)).await;
            second.send().await
        }
    );

    let mut statuses = vec![
        first.unwrap().status().as_u16(),
        second.unwrap().status().as_u16(),
    ];
    statuses.sort_unstable();
    assert_eq!(statuses, vec![200, 503]);

    token.cancel();
    handle.await.unwrap();
}
