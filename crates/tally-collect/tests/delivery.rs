//! End-to-end delivery tests against a local fake OpenTSDB endpoint.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use http::{HeaderMap, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use tally_collect::{CollectConfig, Collector};
use tally_core::{DataPoint, MetricValue, TagSet, epoch_secs};

/// One POST seen by the fake sink.
struct Received {
    path: String,
    headers: HeaderMap,
    points: Vec<DataPoint>,
    status: u16,
}

#[derive(Default)]
struct FakeTsdb {
    /// The first request carrying this metric is answered with 500.
    reject_once: Mutex<Option<String>>,
    received: Mutex<Vec<Received>>,
}

impl FakeTsdb {
    fn accepted(&self) -> Vec<DataPoint> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == 204)
            .flat_map(|r| r.points.clone())
            .collect()
    }

    /// Statuses of every request that carried `metric`.
    fn attempts(&self, metric: &str) -> Vec<u16> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.points.iter().any(|d| d.metric == metric))
            .map(|r| r.status)
            .collect()
    }
}

async fn start_fake_tsdb(reject_once: Option<&str>) -> (SocketAddr, Arc<FakeTsdb>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let tsdb = Arc::new(FakeTsdb::default());
    *tsdb.reject_once.lock().unwrap() = reject_once.map(str::to_string);

    let server = tsdb.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let tsdb = server.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req: Request<Incoming>| {
                    let tsdb = tsdb.clone();
                    async move {
                        let path = req.uri().path().to_string();
                        let headers = req.headers().clone();
                        let body = req.into_body().collect().await?.to_bytes();

                        let mut json = String::new();
                        GzDecoder::new(body.as_ref())
                            .read_to_string(&mut json)
                            .unwrap();
                        let points: Vec<DataPoint> = serde_json::from_str(&json).unwrap();

                        let status = {
                            let mut reject = tsdb.reject_once.lock().unwrap();
                            let hit = reject
                                .as_deref()
                                .is_some_and(|m| points.iter().any(|d| d.metric == m));
                            if hit {
                                *reject = None;
                                500
                            } else {
                                204
                            }
                        };
                        tsdb.received.lock().unwrap().push(Received {
                            path,
                            headers,
                            points,
                            status,
                        });
                        Ok::<_, hyper::Error>(
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::new()))
                                .unwrap(),
                        )
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    (addr, tsdb)
}

fn fast_config(addr: SocketAddr) -> CollectConfig {
    CollectConfig::new(addr.to_string(), "it")
        .with_host_tag("testhost")
        .with_interval(Duration::from_millis(50))
        .with_idle_wait(Duration::from_millis(10))
        .with_retry_wait(Duration::from_millis(50))
        .with_request_timeout(Duration::from_secs(5))
}

async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn counter_delivered_as_gzip_json() {
    let (addr, tsdb) = start_fake_tsdb(None).await;
    let collector = Collector::new(fast_config(addr));
    collector.init().unwrap();
    collector
        .add("requests", 7, TagSet::new().with("code", "200"))
        .unwrap();

    assert!(
        wait_until(|| tsdb.accepted().iter().any(|d| d.metric == "it.requests")).await,
        "counter never delivered"
    );
    collector.shutdown().await;

    let received = tsdb.received.lock().unwrap();
    let first = &received[0];
    assert_eq!(first.path, "/api/put");
    assert_eq!(first.headers["content-type"], "application/json");
    assert_eq!(first.headers["content-encoding"], "gzip");

    let dp = received
        .iter()
        .flat_map(|r| r.points.iter())
        .find(|d| d.metric == "it.requests")
        .unwrap();
    assert_eq!(dp.value, MetricValue::Int(7));
    assert_eq!(dp.tags.get("host"), Some("testhost"));
    assert_eq!(dp.tags.get("code"), Some("200"));
}

#[tokio::test]
async fn sent_counter_matches_accepted_points() {
    let (addr, tsdb) = start_fake_tsdb(None).await;
    let config = fast_config(addr)
        .with_interval(Duration::from_secs(3600))
        .with_batch_size(5);
    let collector = Collector::new(config);
    collector.init().unwrap();

    let now = epoch_secs();
    for i in 0..12i64 {
        collector
            .put(DataPoint::new("ext.points", now, i, TagSet::new()))
            .await
            .unwrap();
    }

    assert!(
        wait_until(|| {
            tsdb.accepted()
                .iter()
                .filter(|d| d.metric == "ext.points")
                .count()
                == 12
        })
        .await
    );
    assert!(wait_until(|| collector.stats().queued == 0).await);
    collector.shutdown().await;

    let stats = collector.stats();
    assert_eq!(stats.sent as usize, tsdb.accepted().len());
    assert_eq!(stats.dropped, 0);
    let largest = tsdb
        .received
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.points.len())
        .max()
        .unwrap();
    assert!(largest <= 5);
}

#[tokio::test]
async fn rejected_fresh_points_are_redelivered() {
    let (addr, tsdb) = start_fake_tsdb(Some("it.retry")).await;
    let collector = Collector::new(fast_config(addr).with_interval(Duration::from_secs(3600)));
    collector.init().unwrap();

    let tx = collector.sender().unwrap();
    tx.send(DataPoint::new("it.retry", epoch_secs(), 1i64, TagSet::new()))
        .await
        .unwrap();

    assert!(wait_until(|| tsdb.attempts("it.retry") == vec![500, 204]).await);
    collector.shutdown().await;

    let accepted = tsdb.accepted();
    assert_eq!(accepted.iter().filter(|d| d.metric == "it.retry").count(), 1);
    assert_eq!(collector.stats().sent as usize, accepted.len());
}

#[tokio::test]
async fn rejected_stale_points_are_discarded() {
    let (addr, tsdb) = start_fake_tsdb(Some("it.stale")).await;
    let config = fast_config(addr)
        .with_interval(Duration::from_secs(3600))
        .with_max_retry_age(Duration::from_secs(60));
    let collector = Collector::new(config);
    collector.init().unwrap();

    let now = epoch_secs();
    let tx = collector.sender().unwrap();
    tx.send(DataPoint::new("it.stale", now - 120, 1i64, TagSet::new()))
        .await
        .unwrap();
    tx.send(DataPoint::new("it.fresh", now, 1i64, TagSet::new()))
        .await
        .unwrap();

    assert!(wait_until(|| tsdb.accepted().iter().any(|d| d.metric == "it.fresh")).await);
    // Give a wrongly requeued stale point time to show up.
    tokio::time::sleep(Duration::from_millis(200)).await;
    collector.shutdown().await;

    assert_eq!(tsdb.attempts("it.stale"), vec![500]);
    assert_eq!(
        tsdb.accepted()
            .iter()
            .filter(|d| d.metric == "it.fresh")
            .count(),
        1
    );
}
