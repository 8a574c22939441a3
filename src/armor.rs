use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::DecodeError;

const LINE_WIDTH: usize = 64;

/// The armor block types defined by RFC 4880, section 6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmorKind {
    PublicKeyBlock,
    PrivateKeyBlock,
    Message,
    Signature,
}

impl ArmorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::PublicKeyBlock => "PGP PUBLIC KEY BLOCK",
            Self::PrivateKeyBlock => "PGP PRIVATE KEY BLOCK",
            Self::Message => "PGP MESSAGE",
            Self::Signature => "PGP SIGNATURE",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "PGP PUBLIC KEY BLOCK" => Some(Self::PublicKeyBlock),
            "PGP PRIVATE KEY BLOCK" => Some(Self::PrivateKeyBlock),
            "PGP MESSAGE" => Some(Self::Message),
            "PGP SIGNATURE" => Some(Self::Signature),
            _ => None,
        }
    }
}

impl fmt::Display for ArmorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The contents of one armored block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Armored {
    pub kind: ArmorKind,
    pub headers: Vec<(String, String)>,
    pub data: Vec<u8>,
}

/// Removes the ASCII armor from the first block found in `text`.
///
/// Anything before the BEGIN line is ignored, so keyserver responses that
/// wrap the block in HTML still decode. The CRC-24 line is optional, but
/// when present it must match the decoded data.
pub fn decode(text: &str) -> Result<Armored, DecodeError> {
    let mut lines = text
        .lines()
        .map(|line| line.trim_start_matches('\u{FEFF}').trim());

    let label = loop {
        let line = lines.next().ok_or(DecodeError::MissingArmorHeader)?;
        if let Some(label) = line
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
        {
            break label;
        }
    };
    let kind =
        ArmorKind::from_label(label).ok_or_else(|| DecodeError::UnknownArmorType(label.to_string()))?;
    let footer = format!("-----END {label}-----");

    let mut headers = Vec::new();
    let mut body = String::new();
    let mut checksum: Option<&str> = None;
    let mut in_headers = true;
    let mut closed = false;

    for line in lines {
        if line == footer {
            closed = true;
            break;
        }
        if line.starts_with("-----") {
            return Err(DecodeError::MissingArmorFooter(footer));
        }

        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            // base64 never contains ':', so this cannot swallow body data
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_string(), value.trim().to_string()));
                continue;
            }
            in_headers = false;
        }

        if line.is_empty() {
            continue;
        }
        if let Some(sum) = line.strip_prefix('=') {
            checksum = Some(sum);
            continue;
        }
        if checksum.is_some() {
            return Err(DecodeError::InvalidBase64(
                "data after checksum line".to_string(),
            ));
        }
        body.push_str(line);
    }

    if !closed {
        return Err(DecodeError::MissingArmorFooter(footer));
    }

    let data = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;

    if let Some(sum) = checksum {
        let expected = decode_checksum(sum)?;
        let actual = checksum_crc24(&data);
        if expected != actual {
            return Err(DecodeError::ChecksumMismatch { expected, actual });
        }
    }

    Ok(Armored {
        kind,
        headers,
        data,
    })
}

/// Armors `data` with 64-column base64 and a CRC-24 checksum line.
pub fn encode(kind: ArmorKind, data: &[u8]) -> String {
    let label = kind.label();
    let encoded = STANDARD.encode(data);

    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH + 80);
    out.push_str("-----BEGIN ");
    out.push_str(label);
    out.push_str("-----\n\n");

    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }

    let cksum = checksum_crc24(data).to_be_bytes();
    out.push('=');
    out.push_str(&STANDARD.encode(&cksum[1..]));

    out.push_str("\n-----END ");
    out.push_str(label);
    out.push_str("-----\n");
    out
}

fn decode_checksum(sum: &str) -> Result<u32, DecodeError> {
    let bytes = STANDARD
        .decode(sum.as_bytes())
        .map_err(|e| DecodeError::InvalidBase64(format!("checksum: {e}")))?;
    match bytes.as_slice() {
        [a, b, c] => Ok(u32::from_be_bytes([0, *a, *b, *c])),
        _ => Err(DecodeError::InvalidBase64(format!(
            "checksum must be 3 bytes (got {})",
            bytes.len()
        ))),
    }
}

// CRC-24 from RFC 4880, section 6.1.
fn checksum_crc24(data: &[u8]) -> u32 {
    const CRC24_INIT: u32 = 0x00B7_04CE;
    const CRC24_POLY: u32 = 0x0186_4CFB;

    let mut crc = CRC24_INIT;
    for &byte in data {
        crc ^= (byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }

    crc & 0x00FF_FFFF
}
