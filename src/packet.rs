use chrono::DateTime;
use tracing::debug;

use crate::armor::{self, ArmorKind};
use crate::error::DecodeError;
use crate::types::KeyInfo;

/// OpenPGP packet tags (RFC 4880, section 4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Signature,
    SecretKey,
    PublicKey,
    SecretSubkey,
    Trust,
    UserId,
    PublicSubkey,
    UserAttribute,
    Other(u8),
}

impl From<u8> for Tag {
    fn from(tag: u8) -> Self {
        match tag {
            2 => Self::Signature,
            5 => Self::SecretKey,
            6 => Self::PublicKey,
            7 => Self::SecretSubkey,
            12 => Self::Trust,
            13 => Self::UserId,
            14 => Self::PublicSubkey,
            17 => Self::UserAttribute,
            n => Self::Other(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub tag: Tag,
    pub body: Vec<u8>,
}

/// Packets in the order they appear in the key block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketList {
    packets: Vec<Packet>,
}

impl PacketList {
    pub fn iter(&self) -> std::slice::Iter<'_, Packet> {
        self.packets.iter()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// The payload of every User ID packet, in order.
    ///
    /// User IDs are UTF-8 by convention only; invalid sequences are replaced
    /// rather than rejected.
    pub fn user_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.packets
            .iter()
            .filter(|p| p.tag == Tag::UserId)
            .map(|p| String::from_utf8_lossy(&p.body).into_owned())
    }

    /// Version, creation time and algorithm of the first (primary) key packet.
    pub fn primary_key(&self) -> Option<KeyInfo> {
        self.packets
            .iter()
            .find(|p| matches!(p.tag, Tag::PublicKey | Tag::SecretKey))
            .and_then(|p| key_info(&p.body))
    }
}

impl<'a> IntoIterator for &'a PacketList {
    type Item = &'a Packet;
    type IntoIter = std::slice::Iter<'a, Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.packets.iter()
    }
}

/// Decodes an armored public key block into its packets.
pub fn decode(armored: &str) -> Result<PacketList, DecodeError> {
    let block = armor::decode(armored)?;
    if block.kind != ArmorKind::PublicKeyBlock {
        return Err(DecodeError::UnexpectedArmorType(block.kind.to_string()));
    }
    parse_packets(&block.data)
}

/// Splits a binary key block into packets.
///
/// Both old-format and new-format headers are accepted, including old-format
/// indeterminate lengths and new-format partial body lengths.
pub fn parse_packets(data: &[u8]) -> Result<PacketList, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::EmptyKeyBlock);
    }

    let mut packets = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (packet, next) = read_packet(data, offset)?;
        packets.push(packet);
        offset = next;
    }

    debug!(count = packets.len(), "decoded key block");
    Ok(PacketList { packets })
}

enum BodyLength {
    Fixed(usize),
    Partial(usize),
}

fn read_packet(data: &[u8], offset: usize) -> Result<(Packet, usize), DecodeError> {
    let mut pos = offset;
    let ctb = take(data, &mut pos, 1, offset)?[0];
    if ctb & 0x80 == 0 {
        return Err(DecodeError::InvalidPacketHeader(offset));
    }

    let (tag, body) = if ctb & 0x40 != 0 {
        let tag = ctb & 0x3f;
        let mut body = Vec::new();
        loop {
            match read_new_length(data, &mut pos, offset)? {
                BodyLength::Fixed(len) => {
                    body.extend_from_slice(take(data, &mut pos, len, offset)?);
                    break;
                }
                BodyLength::Partial(len) => {
                    body.extend_from_slice(take(data, &mut pos, len, offset)?);
                }
            }
        }
        (tag, body)
    } else {
        let tag = (ctb >> 2) & 0x0f;
        let len = match ctb & 0x03 {
            0 => take(data, &mut pos, 1, offset)?[0] as usize,
            1 => {
                let b = take(data, &mut pos, 2, offset)?;
                u16::from_be_bytes([b[0], b[1]]) as usize
            }
            2 => {
                let b = take(data, &mut pos, 4, offset)?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
            }
            // indeterminate: the packet runs to the end of the data
            _ => data.len() - pos,
        };
        (tag, take(data, &mut pos, len, offset)?.to_vec())
    };

    if tag == 0 {
        return Err(DecodeError::InvalidPacketHeader(offset));
    }

    Ok((
        Packet {
            tag: Tag::from(tag),
            body,
        },
        pos,
    ))
}

fn read_new_length(data: &[u8], pos: &mut usize, offset: usize) -> Result<BodyLength, DecodeError> {
    let first = take(data, pos, 1, offset)?[0];
    let length = match first {
        0..=191 => BodyLength::Fixed(first as usize),
        192..=223 => {
            let second = take(data, pos, 1, offset)?[0];
            BodyLength::Fixed((((first as usize) - 192) << 8) + second as usize + 192)
        }
        224..=254 => BodyLength::Partial(1 << (first & 0x1f)),
        255 => {
            let b = take(data, pos, 4, offset)?;
            BodyLength::Fixed(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
        }
    };
    Ok(length)
}

fn take<'a>(
    data: &'a [u8],
    pos: &mut usize,
    len: usize,
    offset: usize,
) -> Result<&'a [u8], DecodeError> {
    let available = data.len().saturating_sub(*pos);
    if len > available {
        return Err(DecodeError::Truncated {
            offset,
            needed: len,
            available,
        });
    }
    let slice = &data[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

fn key_info(body: &[u8]) -> Option<KeyInfo> {
    let (&version, rest) = body.split_first()?;
    let (created, algorithm) = match version {
        // v2/v3 carry a two-octet validity period before the algorithm
        2 | 3 => (rest.get(0..4)?, *rest.get(6)?),
        4..=6 => (rest.get(0..4)?, *rest.get(4)?),
        _ => return None,
    };
    let timestamp = u32::from_be_bytes([created[0], created[1], created[2], created[3]]);

    Some(KeyInfo {
        version,
        created: DateTime::from_timestamp(timestamp as i64, 0),
        algorithm: algorithm_name(algorithm),
    })
}

fn algorithm_name(code: u8) -> String {
    match code {
        1..=3 => "RSA".to_string(),
        16 | 20 => "Elgamal".to_string(),
        17 => "DSA".to_string(),
        18 => "ECDH".to_string(),
        19 => "ECDSA".to_string(),
        22 => "EdDSA".to_string(),
        25 => "X25519".to_string(),
        26 => "X448".to_string(),
        27 => "Ed25519".to_string(),
        28 => "Ed448".to_string(),
        _ => format!("ALG{}", code),
    }
}
