//! Broker session: handshake and receive loop.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::ClientError;
use crate::codec::{read_variable_int, Decoder, Encoder};
use crate::config::BrokerConfig;
use crate::dispatch::Dispatcher;
use crate::message::Message;
use crate::protocol::{
    Connect, DecodeError, Packet, PacketType, PubAck, Publish, QoS, SubAck, Subscribe,
    SubscribeReturnCode, Subscription,
};

/// Packet id of the single SUBSCRIBE sent per session
const SUBSCRIBE_PACKET_ID: u16 = 1;

/// An established, subscribed broker connection
pub struct Session<S> {
    stream: S,
    decoder: Decoder,
    encoder: Encoder,
    read_buf: BytesMut,
    write_buf: BytesMut,
    keep_alive: Option<Duration>,
    connect_timeout: Duration,
    /// PUBLISH packets that arrived before the SUBACK
    pending: VecDeque<Publish>,
    granted_qos: QoS,
    /// Bytes of an oversized PUBLISH still to be skipped
    discard: usize,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: &BrokerConfig) -> Self {
        Self {
            stream,
            decoder: Decoder::new().with_max_packet_size(config.max_packet_size),
            encoder: Encoder::new(),
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(1024),
            keep_alive: config.keep_alive_duration(),
            connect_timeout: config.connect_timeout,
            pending: VecDeque::new(),
            granted_qos: QoS::AtMostOnce,
            discard: 0,
        }
    }

    /// QoS granted by the broker for the subscription
    pub fn granted_qos(&self) -> QoS {
        self.granted_qos
    }

    async fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        self.write_buf.clear();
        self.encoder.encode(packet, &mut self.write_buf)?;
        self.stream.write_all(&self.write_buf).await?;
        Ok(())
    }

    /// Next complete packet already in the read buffer.
    ///
    /// A PUBLISH above `max_packet_size` is skipped as it streams in; any
    /// other oversized packet is an error.
    fn next_buffered(&mut self) -> Result<Option<Packet>, ClientError> {
        loop {
            if self.discard > 0 {
                let n = self.discard.min(self.read_buf.len());
                self.read_buf.advance(n);
                self.discard -= n;
                if self.discard > 0 {
                    return Ok(None);
                }
            }

            match self.decoder.decode(&self.read_buf) {
                Ok(Some((packet, consumed))) => {
                    self.read_buf.advance(consumed);
                    return Ok(Some(packet));
                }
                Ok(None) => return Ok(None),
                Err(DecodeError::PacketTooLarge)
                    if self.read_buf[0] >> 4 == PacketType::Publish as u8 =>
                {
                    let (remaining, len_bytes) = read_variable_int(&self.read_buf[1..])?;
                    self.discard = 1 + len_bytes + remaining as usize;
                    warn!(
                        "Skipping PUBLISH of {} bytes (max_packet_size {})",
                        remaining,
                        self.decoder.max_packet_size()
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Next packet from the stream, reading as much as needed
    async fn read_packet(&mut self) -> Result<Packet, ClientError> {
        loop {
            if let Some(packet) = self.next_buffered()? {
                return Ok(packet);
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(ClientError::ConnectionLost(
                    "connection closed by broker".to_string(),
                ));
            }
        }
    }

    async fn read_packet_timeout(&mut self, step: &'static str) -> Result<Packet, ClientError> {
        let limit = self.connect_timeout;
        timeout(limit, self.read_packet())
            .await
            .map_err(|_| ClientError::Timeout(step))?
    }

    /// CONNECT, wait for CONNACK, SUBSCRIBE, wait for SUBACK
    pub async fn handshake(&mut self, config: &BrokerConfig) -> Result<(), ClientError> {
        let connect = Packet::Connect(Box::new(Connect {
            client_id: config.client_id.clone(),
            clean_session: config.clean_session,
            keep_alive: config.keep_alive,
            username: config.username.clone(),
            password: config.password.as_ref().map(|p| Bytes::from(p.clone())),
        }));
        self.send(&connect).await?;
        debug!("CONNECT sent as '{}'", config.client_id);

        match self.read_packet_timeout("CONNACK").await? {
            Packet::ConnAck(connack) => {
                if !connack.return_code.is_accepted() {
                    return Err(ClientError::Rejected(connack.return_code));
                }
                info!(
                    "Connected to {} with result code {} (session_present={})",
                    config.address(),
                    connack.return_code as u8,
                    connack.session_present
                );
            }
            other => {
                return Err(ClientError::Protocol(format!(
                    "expected CONNACK, got packet type {}",
                    other.packet_type()
                )))
            }
        }

        let subscribe = Packet::Subscribe(Subscribe {
            packet_id: SUBSCRIBE_PACKET_ID,
            subscriptions: vec![Subscription {
                filter: config.topic_filter.clone(),
                qos: config.subscription_qos(),
            }],
        });
        self.send(&subscribe).await?;

        loop {
            match self.read_packet_timeout("SUBACK").await? {
                Packet::SubAck(suback) => {
                    self.granted_qos = Self::check_suback(&suback, &config.topic_filter)?;
                    info!(
                        "Subscribed to '{}' (granted QoS {})",
                        config.topic_filter, self.granted_qos
                    );
                    return Ok(());
                }
                // A resumed session may deliver queued messages first
                Packet::Publish(publish) => self.pending.push_back(publish),
                other => {
                    return Err(ClientError::Protocol(format!(
                        "expected SUBACK, got packet type {}",
                        other.packet_type()
                    )))
                }
            }
        }
    }

    fn check_suback(suback: &SubAck, filter: &str) -> Result<QoS, ClientError> {
        if suback.packet_id != SUBSCRIBE_PACKET_ID {
            return Err(ClientError::Protocol(format!(
                "SUBACK for unknown packet id {}",
                suback.packet_id
            )));
        }
        match suback.return_codes.first() {
            Some(SubscribeReturnCode::Granted(qos)) => Ok(*qos),
            _ => Err(ClientError::SubscribeFailed(filter.to_string())),
        }
    }

    /// Receive loop.
    ///
    /// Returns `Ok` after a requested shutdown (DISCONNECT sent), or the
    /// error that ended the connection.
    pub async fn run(
        mut self,
        dispatcher: &Dispatcher,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ClientError> {
        let mut ping_timer = self.keep_alive.map(|keep_alive| {
            let mut timer = interval_at(Instant::now() + keep_alive, keep_alive);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
        let idle_limit = self.keep_alive.map(|keep_alive| keep_alive * 3 / 2);
        let mut last_inbound = Instant::now();

        while let Some(publish) = self.pending.pop_front() {
            self.handle_publish(publish, dispatcher).await?;
        }

        loop {
            while let Some(packet) = self.next_buffered()? {
                self.handle_packet(packet, dispatcher).await?;
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Shutdown requested, sending DISCONNECT");
                    if let Err(e) = self.send(&Packet::Disconnect).await {
                        warn!("Failed to send DISCONNECT: {}", e);
                    }
                    let _ = self.stream.shutdown().await;
                    return Ok(());
                }

                result = self.stream.read_buf(&mut self.read_buf) => {
                    if result? == 0 {
                        return Err(ClientError::ConnectionLost(
                            "connection closed by broker".to_string(),
                        ));
                    }
                    last_inbound = Instant::now();
                }

                _ = next_tick(&mut ping_timer) => {
                    if let Some(limit) = idle_limit {
                        if last_inbound.elapsed() > limit {
                            return Err(ClientError::KeepAliveTimeout);
                        }
                    }
                    trace!("Sending PINGREQ");
                    self.send(&Packet::PingReq).await?;
                }
            }
        }
    }

    async fn handle_packet(
        &mut self,
        packet: Packet,
        dispatcher: &Dispatcher,
    ) -> Result<(), ClientError> {
        match packet {
            Packet::Publish(publish) => self.handle_publish(publish, dispatcher).await,
            Packet::PingResp => {
                trace!("PINGRESP received");
                Ok(())
            }
            Packet::SubAck(_) | Packet::PubAck(_) | Packet::ConnAck(_) => {
                debug!("Ignoring unexpected packet type {}", packet.packet_type());
                Ok(())
            }
            Packet::Disconnect => Err(ClientError::ConnectionLost(
                "broker sent DISCONNECT".to_string(),
            )),
            other => Err(ClientError::Protocol(format!(
                "broker sent client packet type {}",
                other.packet_type()
            ))),
        }
    }

    async fn handle_publish(
        &mut self,
        publish: Publish,
        dispatcher: &Dispatcher,
    ) -> Result<(), ClientError> {
        if publish.qos == QoS::ExactlyOnce {
            return Err(ClientError::Protocol(format!(
                "QoS 2 delivery on '{}' exceeds the granted QoS",
                publish.topic
            )));
        }

        let message = Message::new(publish.topic, publish.payload);
        if let Err(e) = dispatcher.dispatch(message).await {
            debug!("Message not forwarded: {}", e);
        }

        // At-most-once past this point: acknowledged whether or not it was stored
        if let (QoS::AtLeastOnce, Some(packet_id)) = (publish.qos, publish.packet_id) {
            self.send(&Packet::PubAck(PubAck { packet_id })).await?;
        }

        Ok(())
    }
}

/// Next keep-alive tick, or never when keep-alive is disabled
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
