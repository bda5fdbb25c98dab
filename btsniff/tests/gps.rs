use std::time::Duration;

use btsniff::{GpsdClient, LocationSource};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Accept one client, wait for its WATCH request, then send `lines`.
async fn fake_gpsd(lines: &'static [&'static str]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut request = String::new();
        BufReader::new(reader).read_line(&mut request).await.unwrap();
        assert!(request.starts_with("?WATCH="));

        for line in lines {
            writer.write_all(line.as_bytes()).await.unwrap();
            writer.write_all(b"\n").await.unwrap();
        }
        // Hold the connection open like a real daemon would.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    port
}

#[tokio::test]
async fn first_usable_report_wins() {
    let port = fake_gpsd(&[
        r#"{"class":"VERSION","release":"3.25","proto_major":3,"proto_minor":15}"#,
        r#"{"class":"DEVICES","devices":[]}"#,
        r#"{"class":"TPV","mode":1}"#,
        r#"{"class":"TPV","mode":3,"lat":51.5074,"lon":-0.1278,"altMSL":35.0,"epx":4.5}"#,
    ])
    .await;

    let client = GpsdClient::new("127.0.0.1", port, Duration::from_secs(2));
    let fix = client.current_fix().await.unwrap();

    assert_eq!(fix.latitude, 51.5074);
    assert_eq!(fix.longitude, -0.1278);
    assert_eq!(fix.altitude, Some(35.0));
    assert_eq!(fix.accuracy, Some(4.5));
}

#[tokio::test]
async fn silent_daemon_times_out() {
    let port = fake_gpsd(&[r#"{"class":"VERSION","release":"3.25"}"#]).await;

    let client = GpsdClient::new("127.0.0.1", port, Duration::from_millis(200));
    assert!(client.current_fix().await.is_none());
}

#[tokio::test]
async fn refused_connection_is_no_fix() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = GpsdClient::new("127.0.0.1", port, Duration::from_secs(2));
    assert!(client.current_fix().await.is_none());
}
