use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use ums_edge::rpc::pool::Error as PoolError;
use ums_edge::{CallError, Error, Pool, PoolOptions, RpcClient, TcpConnector};

/// Echo server counting accepted connections
async fn echo_server() -> (String, tokio::sync::mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (accepted_tx, accepted_rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let _ = accepted_tx.send(());

            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, accepted_rx)
}

async fn ping(client: &RpcClient<TcpConnector>, uuid: &str, payload: &'static [u8]) -> Vec<u8> {
    client
        .call(uuid, |conn| {
            Box::pin(async move {
                let stream = conn.stream();
                stream.write_all(payload).await?;
                let mut reply = vec![0u8; payload.len()];
                stream.read_exact(&mut reply).await?;
                Ok::<_, CallError>(reply)
            })
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_calls_reuse_pooled_tcp_connection() {
    let (addr, mut accepted) = echo_server().await;
    let connector = TcpConnector::new(addr, Duration::from_secs(1));
    let pool = Pool::new(connector, PoolOptions::new(1, 2, Duration::from_secs(60)))
        .await
        .unwrap();
    let client = RpcClient::new(pool.clone(), Duration::from_millis(100));

    assert_eq!(ping(&client, "it-1", b"hello").await, b"hello");
    assert_eq!(ping(&client, "it-2", b"again").await, b"again");

    let status = pool.status();
    assert_eq!(status.created, 1);
    assert_eq!(status.total, 1);
    assert_eq!(status.idle, 1);
    assert_eq!(status.acquired, 2);

    accepted.recv().await.unwrap();
    assert!(accepted.try_recv().is_err());

    pool.close();
    assert!(pool.close_graceful(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_exhausted_pool_times_out_calls() {
    let (addr, _accepted) = echo_server().await;
    let connector = TcpConnector::new(addr, Duration::from_secs(1));
    let pool = Pool::new(connector, PoolOptions::new(0, 1, Duration::from_secs(60)))
        .await
        .unwrap();
    let client = RpcClient::new(pool.clone(), Duration::from_millis(20));

    let held = pool.get_timeout(Duration::from_secs(1)).await.unwrap();

    let result = client
        .call("it-3", |_conn| Box::pin(async { Ok::<_, CallError>(()) }))
        .await;
    assert!(matches!(result, Err(Error::Pool(PoolError::AcquireTimeout))));

    pool.put(held).unwrap();
    assert_eq!(ping(&client, "it-4", b"x").await, b"x");
    assert_eq!(pool.status().created, 1);
}

#[tokio::test]
async fn test_pool_fails_when_backend_is_down() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let connector = TcpConnector::new(addr, Duration::from_millis(200));

    let result = Pool::new(connector, PoolOptions::new(1, 2, Duration::from_secs(60))).await;
    assert!(matches!(result, Err(PoolError::DialFailed(_))));
}

#[tokio::test]
async fn test_get_after_close_fails() {
    let (addr, _accepted) = echo_server().await;
    let connector = TcpConnector::new(addr, Duration::from_secs(1));
    let pool = Pool::new(connector, PoolOptions::new(1, 2, Duration::from_secs(60)))
        .await
        .unwrap();

    pool.close();
    pool.close();

    let result = pool.get_timeout(Duration::from_millis(10)).await;
    assert!(matches!(result, Err(PoolError::PoolClosed)));
    assert_eq!(pool.status().destroyed, 1);
}
