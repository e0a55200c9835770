//! COMPAS message encoding.
//!
//! Every message travels behind the suite switch `0x80 0x08` as one TLV
//! element whose type is the message type:
//!
//! * PAM `0xC0`: rank (u16, big endian), flags, the DODAG prefix as an NDN
//!   Name element
//! * NAM `0xC1`: one NDN Name element per advertised name
//! * SOL `0xC2`: flags (bit `0x80` asks listeners to reset their trickle)
//!
//! Names travel in their TLV form so components stay opaque bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::debug;
use rust_compas_common::{
    ndn::Name,
    tlv::{TlvElement, TLV_NAME},
    Error, Result,
};

use super::dodag::DodagFlags;
use crate::suite::{ENC_COMPAS, SUITE_SWITCH};

pub const COMPAS_PAM: u8 = 0xC0;
pub const COMPAS_NAM: u8 = 0xC1;
pub const COMPAS_SOL: u8 = 0xC2;

/// SOL flag: broadcast solicitation, reset trickle.
pub const SOL_FLAG_TRICKLE: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pam {
    pub rank: u16,
    pub flags: DodagFlags,
    pub prefix: Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nam {
    pub names: Vec<Name>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sol {
    pub flags: u8,
}

impl Sol {
    pub fn unicast() -> Self {
        Self { flags: 0 }
    }

    pub fn trickle() -> Self {
        Self {
            flags: SOL_FLAG_TRICKLE,
        }
    }

    pub fn resets_trickle(&self) -> bool {
        self.flags & SOL_FLAG_TRICKLE != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompasMessage {
    Pam(Pam),
    Nam(Nam),
    Sol(Sol),
}

impl CompasMessage {
    /// Encode with the leading suite switch.
    pub fn encode(&self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        let msg_type = match self {
            CompasMessage::Pam(pam) => {
                body.put_u16(pam.rank);
                body.put_u8(pam.flags.bits());
                pam.prefix.to_tlv().encode(&mut body);
                COMPAS_PAM
            }
            CompasMessage::Nam(nam) => {
                for name in &nam.names {
                    name.to_tlv().encode(&mut body);
                }
                COMPAS_NAM
            }
            CompasMessage::Sol(sol) => {
                body.put_u8(sol.flags);
                COMPAS_SOL
            }
        };

        let mut buf = BytesMut::with_capacity(body.len() + 5);
        buf.put_u8(SUITE_SWITCH);
        buf.put_u8(ENC_COMPAS);
        TlvElement::new(msg_type, body.freeze()).encode(&mut buf);
        Ok(buf.freeze())
    }

    /// Decode one message from the front of `buf` (switch marker already
    /// stripped). Unknown message types are consumed and yield `None`.
    pub fn decode(buf: &mut Bytes) -> Result<Option<Self>> {
        let mut probe = buf.clone();
        let element = TlvElement::decode(&mut probe)?;
        let mut body = element.value;

        let msg = match element.tlv_type {
            COMPAS_PAM => Some(CompasMessage::Pam(decode_pam(&mut body)?)),
            COMPAS_NAM => Some(CompasMessage::Nam(decode_nam(&mut body)?)),
            COMPAS_SOL => {
                if !body.has_remaining() {
                    return Err(Error::Compas("empty SOL".into()));
                }
                Some(CompasMessage::Sol(Sol { flags: body.get_u8() }))
            }
            other => {
                debug!("[COMPAS] skipping unknown message type 0x{:02x}", other);
                None
            }
        };

        *buf = probe;
        Ok(msg)
    }
}

fn decode_pam(body: &mut Bytes) -> Result<Pam> {
    if body.remaining() < 3 {
        return Err(Error::Compas("truncated PAM".into()));
    }
    let rank = body.get_u16();
    let flags = DodagFlags::from_bits(body.get_u8());
    if !body.has_remaining() {
        return Err(Error::Compas("PAM without prefix".into()));
    }
    let prefix = Name::from_tlv(&TlvElement::decode(body)?)?;
    Ok(Pam { rank, flags, prefix })
}

fn decode_nam(body: &mut Bytes) -> Result<Nam> {
    let mut names = Vec::new();
    while body.has_remaining() {
        let element = TlvElement::decode(body)?;
        if element.tlv_type == TLV_NAME {
            names.push(Name::from_tlv(&element)?);
        } else {
            debug!("[COMPAS] skipping NAM element 0x{:02x}", element.tlv_type);
        }
    }
    Ok(Nam { names })
}
