//! In-test MQTT broker
//!
//! The library only speaks the client half of MQTT 3.1.1, so the broker
//! half needed by the integration tests lives here: decoding CONNECT and
//! SUBSCRIBE, encoding CONNACK, SUBACK and PUBLISH. Everything else goes
//! through the crate's own codec.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use docbridge::codec::{
    read_binary, read_string, read_u16, read_variable_int, write_string, write_variable_int,
    Decoder, Encoder,
};
use docbridge::protocol::{
    ConnAck, Connect, ConnectReturnCode, DecodeError, Packet, PacketType, Publish, QoS, SubAck,
    Subscribe, SubscribeReturnCode, Subscription,
};

/// Decode a client-to-broker packet
fn decode(decoder: &Decoder, buf: &[u8]) -> Option<(Packet, usize)> {
    if buf.len() < 2 {
        return None;
    }
    let (remaining, len_bytes) = match read_variable_int(&buf[1..]) {
        Ok(r) => r,
        Err(DecodeError::InsufficientData) => return None,
        Err(e) => panic!("Bad remaining length: {}", e),
    };
    let total = 1 + len_bytes + remaining as usize;
    if buf.len() < total {
        return None;
    }
    let body = &buf[1 + len_bytes..total];

    let packet = match PacketType::from_u8(buf[0] >> 4) {
        Some(PacketType::Connect) => decode_connect(body),
        Some(PacketType::Subscribe) => decode_subscribe(body),
        _ => {
            let (packet, consumed) = decoder
                .decode(buf)
                .expect("Bad packet")
                .expect("Incomplete packet");
            assert_eq!(consumed, total);
            packet
        }
    };
    Some((packet, total))
}

fn decode_connect(body: &[u8]) -> Packet {
    let (_protocol, mut pos) = read_string(body).expect("Bad protocol name");
    let flags = body[pos + 1];
    let keep_alive = u16::from_be_bytes([body[pos + 2], body[pos + 3]]);
    pos += 4;

    let (client_id, len) = read_string(&body[pos..]).expect("Bad client id");
    pos += len;

    let username = if flags & 0x80 != 0 {
        let (username, len) = read_string(&body[pos..]).expect("Bad username");
        pos += len;
        Some(username.to_string())
    } else {
        None
    };
    let password = if flags & 0x40 != 0 {
        let (password, _) = read_binary(&body[pos..]).expect("Bad password");
        Some(Bytes::copy_from_slice(password))
    } else {
        None
    };

    Packet::Connect(Box::new(Connect {
        client_id: client_id.to_string(),
        clean_session: flags & 0x02 != 0,
        keep_alive,
        username,
        password,
    }))
}

fn decode_subscribe(body: &[u8]) -> Packet {
    let packet_id = read_u16(body).expect("Bad packet id");
    let mut pos = 2;
    let mut subscriptions = Vec::new();
    while pos < body.len() {
        let (filter, len) = read_string(&body[pos..]).expect("Bad filter");
        pos += len;
        let qos = QoS::from_u8(body[pos]).expect("Bad QoS");
        pos += 1;
        subscriptions.push(Subscription {
            filter: filter.to_string(),
            qos,
        });
    }
    Packet::Subscribe(Subscribe {
        packet_id,
        subscriptions,
    })
}

/// Encode a broker-to-client packet
fn encode(encoder: &Encoder, packet: &Packet, buf: &mut BytesMut) {
    match packet {
        Packet::ConnAck(connack) => {
            buf.put_u8(0x20);
            buf.put_u8(0x02);
            buf.put_u8(connack.session_present as u8);
            buf.put_u8(connack.return_code as u8);
        }
        Packet::SubAck(suback) => {
            buf.put_u8(0x90);
            write_variable_int(buf, 2 + suback.return_codes.len() as u32).unwrap();
            buf.put_u16(suback.packet_id);
            for code in &suback.return_codes {
                buf.put_u8(code.to_u8());
            }
        }
        Packet::Publish(publish) => {
            let mut remaining = 2 + publish.topic.len() + publish.payload.len();
            if publish.packet_id.is_some() {
                remaining += 2;
            }
            buf.put_u8(0x30 | ((publish.qos as u8) << 1));
            write_variable_int(buf, remaining as u32).unwrap();
            write_string(buf, &publish.topic).unwrap();
            if let Some(packet_id) = publish.packet_id {
                buf.put_u16(packet_id);
            }
            buf.put_slice(&publish.payload);
        }
        other => encoder.encode(other, buf).expect("Failed to encode"),
    }
}

/// Listening side of the test broker
pub struct TestBroker {
    listener: TcpListener,
}

impl TestBroker {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub async fn accept(&self) -> BrokerConnection {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept())
            .await
            .expect("No connection from forwarder")
            .expect("Failed to accept");
        BrokerConnection {
            stream,
            buf: BytesMut::new(),
            decoder: Decoder::new(),
            encoder: Encoder::new(),
        }
    }
}

/// One accepted forwarder connection
pub struct BrokerConnection {
    stream: TcpStream,
    buf: BytesMut,
    decoder: Decoder,
    encoder: Encoder,
}

impl BrokerConnection {
    pub async fn recv(&mut self) -> Option<Packet> {
        loop {
            if let Some((packet, consumed)) = decode(&self.decoder, &self.buf) {
                self.buf.advance(consumed);
                return Some(packet);
            }
            match timeout(Duration::from_secs(5), self.stream.read_buf(&mut self.buf)).await {
                Ok(Ok(n)) if n > 0 => {}
                _ => return None,
            }
        }
    }

    pub async fn send(&mut self, packet: Packet) {
        let mut out = BytesMut::new();
        encode(&self.encoder, &packet, &mut out);
        self.stream.write_all(&out).await.expect("Failed to write");
    }

    /// Answer CONNECT and SUBSCRIBE; returns the requested filter
    pub async fn accept_session(&mut self, granted: QoS) -> String {
        match self.recv().await {
            Some(Packet::Connect(_)) => {}
            other => panic!("Expected CONNECT, got {:?}", other),
        }
        self.send(Packet::ConnAck(ConnAck {
            session_present: false,
            return_code: ConnectReturnCode::Accepted,
        }))
        .await;

        let subscribe = match self.recv().await {
            Some(Packet::Subscribe(subscribe)) => subscribe,
            other => panic!("Expected SUBSCRIBE, got {:?}", other),
        };
        self.send(Packet::SubAck(SubAck {
            packet_id: subscribe.packet_id,
            return_codes: vec![SubscribeReturnCode::Granted(granted)],
        }))
        .await;

        subscribe.subscriptions[0].filter.clone()
    }

    pub async fn publish(&mut self, topic: &str, payload: impl Into<Bytes>) {
        self.send(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: topic.to_string(),
            packet_id: None,
            payload: payload.into(),
        }))
        .await;
    }
}
