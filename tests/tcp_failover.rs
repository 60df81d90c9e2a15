//! End-to-end routing over real sockets against in-process RESP responders.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::BytesMut;
use parking_lot::Mutex;
use sockudo_ha::protocol::Parser;
use sockudo_ha::{
    Address, Command, RespValue, SentinelClientConfig, SentinelDirectory, TcpConnector,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Reply = Arc<dyn Fn(&Command) -> RespValue + Send + Sync>;

async fn spawn_node(reply: Reply) -> Address {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve(socket, reply.clone()));
        }
    });

    Address::new("127.0.0.1", port)
}

async fn serve(mut socket: TcpStream, reply: Reply) {
    let mut buf = BytesMut::new();
    loop {
        while let Ok(Some(value)) = Parser::parse(&mut buf) {
            let Ok(cmd) = Command::from_resp(value) else {
                return;
            };
            if socket.write_all(&reply(&cmd).serialize()).await.is_err() {
                return;
            }
        }
        match socket.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

fn bulk(s: &str) -> RespValue {
    RespValue::bulk_string(s)
}

fn record(pairs: &[(&str, String)]) -> RespValue {
    RespValue::array(
        pairs
            .iter()
            .flat_map(|(k, v)| [bulk(k), bulk(v)])
            .collect(),
    )
}

/// Sentinel answering from the shared primary cell and a fixed replica list
fn sentinel(primary: Arc<Mutex<Address>>, replicas: Vec<Address>) -> Reply {
    Arc::new(move |cmd| {
        let sub = cmd
            .args
            .first()
            .map(|s| String::from_utf8_lossy(s).to_uppercase())
            .unwrap_or_default();
        let current = primary.lock().clone();
        match sub.as_str() {
            "MASTERS" => RespValue::array(vec![record(&[
                ("name", "svcA".into()),
                ("ip", current.host.clone()),
                ("port", current.port.to_string()),
                ("flags", "master".into()),
                ("num-other-sentinels", "2".into()),
                ("quorum", "2".into()),
            ])]),
            "SLAVES" => RespValue::array(
                replicas
                    .iter()
                    .map(|r| {
                        record(&[
                            ("name", r.to_string()),
                            ("ip", r.host.clone()),
                            ("port", r.port.to_string()),
                            ("flags", "slave".into()),
                        ])
                    })
                    .collect(),
            ),
            "GET-MASTER-ADDR-BY-NAME" => {
                RespValue::array(vec![bulk(&current.host), bulk(&current.port.to_string())])
            }
            "CKQUORUM" => RespValue::SimpleString(bytes::Bytes::from_static(
                b"OK 3 usable Sentinels. Quorum and failover authorization can be reached",
            )),
            _ => RespValue::error("ERR Unknown sentinel subcommand"),
        }
    })
}

/// Data node replying with its own name to anything
fn named(name: &'static str) -> Reply {
    Arc::new(move |_| bulk(name))
}

async fn directory(sentinel_addr: Address) -> SentinelDirectory {
    let config = SentinelClientConfig {
        monitors: vec![sentinel_addr],
        ..Default::default()
    };
    SentinelDirectory::connect(&config, Arc::new(TcpConnector::new()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_failover_over_tcp() {
    let demoted = Arc::new(AtomicBool::new(false));
    let new_primary_writes = Arc::new(AtomicUsize::new(0));

    let p1 = {
        let demoted = demoted.clone();
        spawn_node(Arc::new(move |_| {
            if demoted.load(Ordering::SeqCst) {
                RespValue::error("READONLY You can't write against a read only replica.")
            } else {
                RespValue::ok()
            }
        }))
        .await
    };
    let p2 = {
        let writes = new_primary_writes.clone();
        spawn_node(Arc::new(move |_| {
            writes.fetch_add(1, Ordering::SeqCst);
            RespValue::ok()
        }))
        .await
    };

    let primary = Arc::new(Mutex::new(p1.clone()));
    let s = spawn_node(sentinel(primary.clone(), vec![])).await;
    let dir = directory(s).await;
    let client = dir.primary_for("svcA", None);
    let set = Command::new("SET").arg("k").arg("v");

    assert!(client.execute(&set).await.unwrap().is_ok());
    assert_eq!(client.acquire().await.unwrap().addr(), &p1);

    *primary.lock() = p2.clone();
    demoted.store(true, Ordering::SeqCst);

    assert!(client.execute(&set).await.unwrap().is_ok());
    assert_eq!(new_primary_writes.load(Ordering::SeqCst), 1);
    assert_eq!(client.acquire().await.unwrap().addr(), &p2);

    client.close();
    client.wait_closed().await.unwrap();
    dir.close();
    dir.wait_closed().await.unwrap();
}

#[tokio::test]
async fn test_replica_round_robin_over_tcp() {
    let p = spawn_node(named("primary")).await;
    let r1 = spawn_node(named("replica-1")).await;
    let r2 = spawn_node(named("replica-2")).await;

    let s = spawn_node(sentinel(Arc::new(Mutex::new(p)), vec![r1, r2])).await;
    let dir = directory(s).await;

    let mut seen = Vec::new();
    for _ in 0..4 {
        let client = dir.alternate_for("svcA", None);
        let reply = client.execute(&Command::new("GET").arg("k")).await.unwrap();
        seen.push(reply.as_str().unwrap_or_default().to_string());
        client.close();
        client.wait_closed().await.unwrap();
    }

    assert_eq!(seen, vec!["replica-1", "replica-2", "primary", "replica-1"]);
    dir.close();
    dir.wait_closed().await.unwrap();
}

#[tokio::test]
async fn test_admin_over_tcp() {
    let p = Address::new("10.1.2.3", 6380);
    let s = spawn_node(sentinel(Arc::new(Mutex::new(p.clone())), vec![])).await;
    let dir = directory(s).await;

    assert_eq!(dir.primary_address("svcA").await.unwrap(), Some(p.clone()));
    assert!(dir.check_quorum("svcA").await.unwrap());
    assert_eq!(dir.monitors().await.unwrap()["svcA"].address(), p);

    dir.close();
    dir.wait_closed().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_sentinel_fails_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = SentinelClientConfig {
        monitors: vec![Address::new("127.0.0.1", port)],
        ..Default::default()
    };
    let result = SentinelDirectory::connect(&config, Arc::new(TcpConnector::new())).await;
    assert!(result.is_err());
}
