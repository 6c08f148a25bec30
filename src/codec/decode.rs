//! MQTT Packet Decoder
//!
//! Decodes MQTT v3.1.1 packets from a byte buffer. CONNECT and SUBSCRIBE
//! are only decoded in unit tests, where the crate plays the broker.

use bytes::Bytes;

use super::{read_string, read_u16, read_variable_int, MAX_REMAINING_LENGTH};
use crate::protocol::{
    ConnAck, ConnectReturnCode, DecodeError, Packet, PacketType, PubAck, Publish, QoS, SubAck,
    SubscribeReturnCode,
};
#[cfg(test)]
use {
    super::read_binary,
    crate::protocol::{Connect, Subscribe, Subscription, PROTOCOL_LEVEL, PROTOCOL_NAME},
};

/// MQTT Packet Decoder
#[derive(Debug, Clone)]
pub struct Decoder {
    /// Maximum packet size
    max_packet_size: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_REMAINING_LENGTH,
        }
    }

    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.min(MAX_REMAINING_LENGTH);
        self
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Decode a packet from the buffer
    /// Returns (packet, bytes_consumed), or None if the buffer does not yet
    /// hold a complete packet
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(Packet, usize)>, DecodeError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let first_byte = buf[0];
        let packet_type = first_byte >> 4;
        let flags = first_byte & 0x0F;

        let (remaining_length, len_bytes) = match read_variable_int(&buf[1..]) {
            Ok(r) => r,
            Err(DecodeError::InsufficientData) => return Ok(None),
            Err(e) => return Err(e),
        };

        if remaining_length as usize > self.max_packet_size {
            return Err(DecodeError::PacketTooLarge);
        }

        let total_len = 1 + len_bytes + remaining_length as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        let payload = &buf[1 + len_bytes..total_len];

        let packet = match PacketType::from_u8(packet_type) {
            #[cfg(test)]
            Some(PacketType::Connect) => self.decode_connect(flags, payload)?,
            Some(PacketType::ConnAck) => self.decode_connack(flags, payload)?,
            Some(PacketType::Publish) => self.decode_publish(flags, payload)?,
            Some(PacketType::PubAck) => self.decode_puback(flags, payload)?,
            #[cfg(test)]
            Some(PacketType::Subscribe) => self.decode_subscribe(flags, payload)?,
            Some(PacketType::SubAck) => self.decode_suback(flags, payload)?,
            Some(PacketType::PingReq) => {
                Self::expect_empty(flags, payload)?;
                Packet::PingReq
            }
            Some(PacketType::PingResp) => {
                Self::expect_empty(flags, payload)?;
                Packet::PingResp
            }
            Some(PacketType::Disconnect) => {
                Self::expect_empty(flags, payload)?;
                Packet::Disconnect
            }
            Some(_) => return Err(DecodeError::UnsupportedPacketType(packet_type)),
            None => return Err(DecodeError::InvalidPacketType(packet_type)),
        };

        Ok(Some((packet, total_len)))
    }

    fn expect_empty(flags: u8, payload: &[u8]) -> Result<(), DecodeError> {
        if flags != 0 {
            return Err(DecodeError::InvalidFlags);
        }
        if !payload.is_empty() {
            return Err(DecodeError::MalformedPacket("unexpected payload"));
        }
        Ok(())
    }

    #[cfg(test)]
    fn decode_connect(&self, flags: u8, payload: &[u8]) -> Result<Packet, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::InvalidFlags);
        }

        let mut pos = 0;

        let (protocol_name, len) = read_string(payload)?;
        pos += len;
        if protocol_name != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }

        if pos + 4 > payload.len() {
            return Err(DecodeError::InsufficientData);
        }
        let level = payload[pos];
        if level != PROTOCOL_LEVEL {
            return Err(DecodeError::InvalidProtocolLevel(level));
        }
        let connect_flags = payload[pos + 1];
        let keep_alive = u16::from_be_bytes([payload[pos + 2], payload[pos + 3]]);
        pos += 4;

        if (connect_flags & 0x01) != 0 {
            return Err(DecodeError::InvalidFlags);
        }
        // Will messages are never sent by the forwarder
        if (connect_flags & 0x04) != 0 {
            return Err(DecodeError::MalformedPacket("will message not supported"));
        }
        let clean_session = (connect_flags & 0x02) != 0;
        let password_flag = (connect_flags & 0x40) != 0;
        let username_flag = (connect_flags & 0x80) != 0;

        let (client_id, len) = read_string(&payload[pos..])?;
        pos += len;

        let username = if username_flag {
            let (username, len) = read_string(&payload[pos..])?;
            pos += len;
            Some(username.to_string())
        } else {
            None
        };

        let password = if password_flag {
            let (password, _) = read_binary(&payload[pos..])?;
            Some(Bytes::copy_from_slice(password))
        } else {
            None
        };

        Ok(Packet::Connect(Box::new(Connect {
            client_id: client_id.to_string(),
            clean_session,
            keep_alive,
            username,
            password,
        })))
    }

    fn decode_connack(&self, flags: u8, payload: &[u8]) -> Result<Packet, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::InvalidFlags);
        }
        if payload.len() != 2 {
            return Err(DecodeError::MalformedPacket("CONNACK must be 2 bytes"));
        }

        let acknowledge_flags = payload[0];
        // Only bit 0 is valid (session present)
        if (acknowledge_flags & 0xFE) != 0 {
            return Err(DecodeError::InvalidFlags);
        }

        let return_code = ConnectReturnCode::from_u8(payload[1])
            .ok_or(DecodeError::InvalidReturnCode(payload[1]))?;

        Ok(Packet::ConnAck(ConnAck {
            session_present: (acknowledge_flags & 0x01) != 0,
            return_code,
        }))
    }

    fn decode_publish(&self, flags: u8, payload: &[u8]) -> Result<Packet, DecodeError> {
        let dup = (flags & 0x08) != 0;
        let qos_bits = (flags >> 1) & 0x03;
        let retain = (flags & 0x01) != 0;

        let qos = QoS::from_u8(qos_bits).ok_or(DecodeError::InvalidQoS(qos_bits))?;

        if qos == QoS::AtMostOnce && dup {
            return Err(DecodeError::MalformedPacket("DUP must be 0 for QoS 0"));
        }

        let (topic, mut pos) = read_string(payload)?;

        if topic.contains('+') || topic.contains('#') {
            return Err(DecodeError::MalformedPacket("topic contains wildcard"));
        }

        let packet_id = if qos != QoS::AtMostOnce {
            let id = read_u16(&payload[pos..])?;
            if id == 0 {
                return Err(DecodeError::MalformedPacket("packet id cannot be 0"));
            }
            pos += 2;
            Some(id)
        } else {
            None
        };

        Ok(Packet::Publish(Publish {
            dup,
            qos,
            retain,
            topic: topic.to_string(),
            packet_id,
            payload: Bytes::copy_from_slice(&payload[pos..]),
        }))
    }

    fn decode_puback(&self, flags: u8, payload: &[u8]) -> Result<Packet, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::InvalidFlags);
        }
        if payload.len() != 2 {
            return Err(DecodeError::MalformedPacket("PUBACK must be 2 bytes"));
        }
        Ok(Packet::PubAck(PubAck {
            packet_id: read_u16(payload)?,
        }))
    }

    #[cfg(test)]
    fn decode_subscribe(&self, flags: u8, payload: &[u8]) -> Result<Packet, DecodeError> {
        // SUBSCRIBE must have flags 0010
        if flags != 0x02 {
            return Err(DecodeError::InvalidFlags);
        }

        let packet_id = read_u16(payload)?;
        let mut pos = 2;

        let mut subscriptions = Vec::new();
        while pos < payload.len() {
            let (filter, len) = read_string(&payload[pos..])?;
            pos += len;

            let options = *payload.get(pos).ok_or(DecodeError::InsufficientData)?;
            pos += 1;
            if (options & 0xFC) != 0 {
                return Err(DecodeError::MalformedPacket("reserved subscription bits set"));
            }
            let qos = QoS::from_u8(options).ok_or(DecodeError::InvalidQoS(options))?;

            subscriptions.push(Subscription {
                filter: filter.to_string(),
                qos,
            });
        }

        if subscriptions.is_empty() {
            return Err(DecodeError::MalformedPacket("SUBSCRIBE without filters"));
        }

        Ok(Packet::Subscribe(Subscribe {
            packet_id,
            subscriptions,
        }))
    }

    fn decode_suback(&self, flags: u8, payload: &[u8]) -> Result<Packet, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::InvalidFlags);
        }
        if payload.len() < 3 {
            return Err(DecodeError::InsufficientData);
        }

        let packet_id = read_u16(payload)?;
        let return_codes = payload[2..]
            .iter()
            .map(|&code| SubscribeReturnCode::from_u8(code).ok_or(DecodeError::InvalidReturnCode(code)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Packet::SubAck(SubAck {
            packet_id,
            return_codes,
        }))
    }
}
