#![cfg(feature = "session")]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use nodelink::coap::{Code, Codec, Message, MessageType};
use nodelink::frame::{crc16, FragmentHeader, RadioConfig};
use nodelink::session::{Link, RadioLink, Session, SessionConfig, SessionError};
use nodelink::transport::{Publisher, Result as TransportResult};

const DEVICE: &str = "00:11:22:33:44:55:66:77";

/// Parses a downlink command into (dashed address, segment bytes, ack).
fn parse_downlink(line: &str) -> (String, Vec<u8>, bool) {
    let rest = line.strip_prefix("lora/").expect("topic prefix");
    let (addr, rest) = rest.split_once("/down ").expect("down topic");
    let json: serde_json::Value =
        serde_json::from_str(rest.trim_end()).expect("downlink body is json");
    assert_eq!(json["port"], 0xBB);
    let data = STANDARD
        .decode(json["data"].as_str().expect("data is a string"))
        .expect("data is base64");
    (addr.to_string(), data, json["ack"].as_bool().expect("ack is bool"))
}

fn channel_publisher() -> (impl Publisher, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let publisher = move |data: &[u8]| -> TransportResult<()> {
        let line = String::from_utf8(data.to_vec()).expect("downlinks are text");
        let _ = tx.lock().expect("publisher lock").send(line);
        Ok(())
    };
    (publisher, rx)
}

/// Reassembles downlinks, and answers each request through `deliver`.
fn spawn_gateway<P: Publisher + 'static>(
    link: Arc<RadioLink<P>>,
    downlinks: mpsc::Receiver<String>,
    responses: usize,
) -> thread::JoinHandle<Vec<usize>> {
    thread::spawn(move || {
        let codec = Codec::default();
        let mut segment_counts = Vec::new();
        for _ in 0..responses {
            let mut payload = Vec::new();
            let mut checksum = None;
            let mut count = 0;
            loop {
                let line = downlinks
                    .recv_timeout(Duration::from_secs(5))
                    .expect("gateway should see a downlink");
                let (addr, segment, ack) = parse_downlink(&line);
                assert_eq!(addr, "00-11-22-33-44-55-66-77");
                assert!(ack);

                let (header, data) = FragmentHeader::parse(&segment).expect("valid fragment");
                assert_eq!(usize::from(header.number), count);
                checksum = checksum.or(header.checksum);
                payload.extend_from_slice(data);
                count += 1;
                if header.last {
                    break;
                }
            }
            assert_eq!(checksum, Some(crc16(&payload)));
            segment_counts.push(count);

            let request = codec.decode(&payload).expect("request should decode");
            let mut rsp = Message::new(
                MessageType::Acknowledgement,
                Code::CHANGED,
                request.message_id(),
            );
            rsp.set_token(request.token().clone()).expect("token fits");
            rsp.set_payload(request.payload().clone());
            let encoded = codec.encode(&rsp).expect("response should encode");
            assert!(link.deliver(DEVICE, &encoded).expect("deliver should succeed"));
        }
        segment_counts
    })
}

#[test]
fn fragmented_request_gets_response() {
    let (publisher, downlinks) = channel_publisher();
    let config = RadioConfig {
        confirmed_tx: true,
        ..RadioConfig::default()
    };
    let link = Arc::new(RadioLink::new(publisher, config));
    let session = Session::new(Arc::clone(&link), SessionConfig::for_addr(DEVICE))
        .expect("radio session should build");
    session.open().expect("session should open");
    assert_eq!(session.mtu(), 33);

    let gateway = spawn_gateway(Arc::clone(&link), downlinks, 2);

    let mut request = session.request(Code::PUT, "/img/upload");
    request.set_payload(vec![0x5Au8; 100]);
    let rsp = session.transmit(request).expect("response should arrive");
    assert_eq!(rsp.code(), Code::CHANGED);
    assert_eq!(rsp.payload().len(), 100);

    assert!(link
        .deliver_mtu("0011223344556677", 242)
        .expect("mtu report should route"));
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while session.mtu() != 242 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(session.mtu(), 242);

    let mut request = session.request(Code::PUT, "/img/upload");
    request.set_payload(vec![0x5Au8; 100]);
    session.transmit(request).expect("response should arrive");

    let counts = gateway.join().expect("gateway should finish");
    assert!(counts[0] > 1, "small mtu should fragment");
    assert_eq!(counts[1], 1, "large mtu fits one segment");

    session.close().expect("session should close");
    assert!(link.listeners().is_empty());
}

#[test]
fn malformed_address_is_rejected() {
    let (publisher, _downlinks) = channel_publisher();
    let link = Arc::new(RadioLink::new(publisher, RadioConfig::default()));
    let result = Session::new(link, SessionConfig::for_addr("not-an-eui"));
    assert!(matches!(result, Err(SessionError::InvalidAddress(_))));
}

#[test]
fn sessions_on_one_gateway_are_isolated() {
    let (publisher, _downlinks) = channel_publisher();
    let link = Arc::new(RadioLink::new(publisher, RadioConfig::default()));
    let first = Session::new(Arc::clone(&link), SessionConfig::for_addr(DEVICE))
        .expect("first session should build");
    let other = Session::new(
        Arc::clone(&link),
        SessionConfig {
            addr: "ff-ff-ff-ff-ff-ff-ff-01".into(),
            timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        },
    )
    .expect("second session should build");
    first.open().expect("first should open");
    other.open().expect("second should open");

    // Nobody answers the second device; an unrelated uplink for the first
    // must not complete its request.
    let stray = Codec::default()
        .encode(&Message::new(MessageType::Acknowledgement, Code::CONTENT, 1))
        .expect("stray should encode");
    assert!(link.deliver(DEVICE, &stray).expect("stray delivered"));

    let err = other
        .transmit(other.request(Code::GET, "/x"))
        .unwrap_err();
    assert!(matches!(err, SessionError::Timeout(_)));
    assert!(first.is_open());
}
