#![cfg(all(unix, feature = "session"))]

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

use nodelink::coap::{Code, Codec, MediaType, Message, MessageType, OptionId};
use nodelink::frame::{SerialConfig, SerialFrameReader, SerialFrameWriter};
use nodelink::session::{SerialLink, Session, SessionConfig, SessionError};
use nodelink::transport::PortStream;

fn serial_config() -> SerialConfig {
    SerialConfig {
        read_timeout: Some(Duration::from_millis(50)),
        burst_delay: Duration::ZERO,
        ..SerialConfig::default()
    }
}

/// Answers every request with `Content` echoing the request path, after
/// printing some console noise the way real firmware does.
fn spawn_device(port: UnixStream, requests: usize) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let codec = Codec::default();
        let write_half = port.try_clone().expect("device port should clone");
        let mut reader = SerialFrameReader::new(port);
        let mut writer = SerialFrameWriter::with_config(write_half, serial_config());

        for _ in 0..requests {
            let frame = reader.receive().expect("device should receive a frame");
            let request = codec.decode(&frame).expect("request should decode");

            let mut rsp = Message::new(
                MessageType::Acknowledgement,
                Code::CONTENT,
                request.message_id(),
            );
            rsp.set_token(request.token().clone()).expect("token fits");
            rsp.set_option(OptionId::CONTENT_FORMAT, MediaType::TEXT_PLAIN);
            rsp.set_payload(request.path_string().into_bytes());

            writer
                .get_mut()
                .write_all(b"[ts=1ms] handling request\n")
                .expect("console noise should write");
            writer
                .send(&codec.encode(&rsp).expect("response should encode"))
                .expect("device should send");
        }
    })
}

#[test]
fn request_response_over_serial() {
    let (host, device) = UnixStream::pair().expect("socket pair should open");
    let device = spawn_device(device, 2);

    let link = SerialLink::open(PortStream::from_unix(host), serial_config())
        .expect("serial link should start");
    let session = Session::new(link.clone(), SessionConfig::default())
        .expect("serial session should build");
    session.open().expect("session should open");

    let rsp = session
        .transmit(session.request(Code::GET, "/dev/info"))
        .expect("first response");
    assert_eq!(rsp.code(), Code::CONTENT);
    assert_eq!(rsp.content_format(), Some(MediaType::TEXT_PLAIN));
    assert_eq!(rsp.payload().as_ref(), b"dev/info");

    let big_path = format!("/{}", "p".repeat(200));
    let rsp = session
        .transmit(session.request(Code::GET, &big_path))
        .expect("second response");
    assert_eq!(rsp.payload().len(), 200);

    device.join().expect("device thread should finish");
    session.close().expect("session should close");
    assert!(matches!(session.close(), Err(SessionError::NotOpen)));
    link.shutdown().expect("link should shut down");
}

#[test]
fn silent_device_times_out() {
    let (host, _device) = UnixStream::pair().expect("socket pair should open");
    let link = SerialLink::open(PortStream::from_unix(host), serial_config())
        .expect("serial link should start");
    let config = SessionConfig {
        timeout: Duration::from_millis(30),
        retries: 1,
        ..SessionConfig::default()
    };
    let session = Session::new(link.clone(), config).expect("serial session should build");
    session.open().expect("session should open");

    let err = session
        .transmit(session.request(Code::GET, "/nothing"))
        .unwrap_err();
    assert!(matches!(err, SessionError::Timeout(_)));

    session.close().expect("session should close");
    link.shutdown().expect("link should shut down");
}
