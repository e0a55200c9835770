//! NDN packet types and structures.
//!
//! Names, Interest and Data packets and their NDN-TLV wire encoding as
//! carried by the forwarding node.

use crate::error::Error;
use crate::tlv::{self, TlvElement};
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;


/// Maximum length of an NDN name component.
pub const MAX_NAME_COMPONENT_LENGTH: usize = 255;

/// Maximum number of components in an NDN name.
pub const MAX_NAME_COMPONENTS: usize = 16;

/// Maximum size of an NDN packet.
pub const MAX_NDN_PACKET_SIZE: usize = 8800;

/// Default Interest lifetime in milliseconds.
pub const DEFAULT_INTEREST_LIFETIME_MS: u32 = 4000;

/// Represents an NDN name component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameComponent(pub Bytes);

impl NameComponent {
    /// Creates a new name component from a byte slice.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the component as bytes.
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Encodes this name component as a TLV element.
    pub fn to_tlv(&self) -> TlvElement {
        TlvElement::new(tlv::TLV_COMPONENT, self.0.clone())
    }

    /// Decodes a name component from a TLV element.
    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_COMPONENT {
            return Err(Error::NdnPacket(format!(
                "Expected name component TLV type {}, got {}",
                tlv::TLV_COMPONENT, element.tlv_type
            )));
        }
        if element.value.len() > MAX_NAME_COMPONENT_LENGTH {
            return Err(Error::NdnPacket(format!(
                "name component of {} bytes exceeds {}",
                element.value.len(),
                MAX_NAME_COMPONENT_LENGTH
            )));
        }
        Ok(Self(element.value.clone()))
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Print printable ASCII characters directly, otherwise use hex
        let printable = self.0.iter().all(|&b| b.is_ascii_graphic() && b != b'/');

        if printable {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "0x")?;
            for &b in self.0.iter() {
                write!(f, "{:02x}", b)?;
            }
            Ok(())
        }
    }
}

/// Represents an NDN name, which is a sequence of name components.
///
/// Names are ordered component-wise, so `/a` sorts before `/a/b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    /// Creates a new empty NDN name.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Creates a name from a string representation with '/' as component separator.
    pub fn from_string(s: &str) -> Self {
        let components = s
            .split('/')
            .filter(|comp| !comp.is_empty())
            .map(|comp| NameComponent::new(comp.as_bytes().to_vec()))
            .collect();

        Self { components }
    }

    /// Adds a component to the name.
    pub fn push(&mut self, component: NameComponent) -> &mut Self {
        self.components.push(component);
        self
    }

    /// Returns a copy of this name with one more component appended.
    pub fn child(&self, component: impl Into<Bytes>) -> Self {
        let mut name = self.clone();
        name.push(NameComponent::new(component));
        name
    }

    /// Returns the number of components in the name.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if the name has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns an iterator over the name components.
    pub fn components(&self) -> impl Iterator<Item = &NameComponent> {
        self.components.iter()
    }

    /// Gets a component at the specified index.
    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    /// Returns a prefix of this name with the specified length.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            components: self.components.iter().take(len).cloned().collect(),
        }
    }

    /// Checks if this name is a prefix of another name.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.longest_common_prefix(other) == self.len()
    }

    /// Number of leading components shared with `other`.
    pub fn longest_common_prefix(&self, other: &Self) -> usize {
        self.components
            .iter()
            .zip(other.components.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Encodes this name as a TLV element.
    pub fn to_tlv(&self) -> TlvElement {
        let mut buf = BytesMut::new();

        for component in &self.components {
            component.to_tlv().encode(&mut buf);
        }

        TlvElement::new(tlv::TLV_NAME, buf.freeze())
    }

    /// Decodes a name from a TLV element.
    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_NAME {
            return Err(Error::NdnPacket(format!(
                "Expected name TLV type {}, got {}",
                tlv::TLV_NAME, element.tlv_type
            )));
        }

        let mut components = Vec::new();
        let mut buf = element.value.clone();

        while buf.has_remaining() {
            let element = TlvElement::decode(&mut buf)?;
            components.push(NameComponent::from_tlv(&element)?);
        }

        if components.len() > MAX_NAME_COMPONENTS {
            return Err(Error::NdnPacket(format!(
                "name has {} components, limit is {}",
                components.len(),
                MAX_NAME_COMPONENTS
            )));
        }

        Ok(Self { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }

        for component in &self.components {
            write!(f, "/{}", component)?;
        }

        Ok(())
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.starts_with('/') {
            return Err(Error::NdnPacket(format!("name URI must start with '/': {}", s)));
        }
        Ok(Self::from_string(s))
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::new()
    }
}

/// Options a local requester attaches to an Interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestOptions {
    /// Zero asks for a random nonce.
    pub nonce: u32,
    pub lifetime_ms: u32,
    pub must_be_fresh: bool,
    pub can_be_prefix: bool,
}

impl Default for InterestOptions {
    fn default() -> Self {
        Self {
            nonce: 0,
            lifetime_ms: DEFAULT_INTEREST_LIFETIME_MS,
            must_be_fresh: false,
            can_be_prefix: false,
        }
    }
}

/// Represents an NDN Interest packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    /// The name requested in the Interest.
    pub name: Name,

    /// A nonce value to prevent looping.
    pub nonce: u32,

    /// Interest lifetime in milliseconds.
    pub lifetime_ms: u32,

    /// Whether any Data under `name` satisfies this Interest.
    pub can_be_prefix: bool,

    /// Whether stale cached Data must be ignored.
    pub must_be_fresh: bool,
}

impl Interest {
    /// Creates a new Interest packet with a random nonce.
    pub fn new(name: Name) -> Self {
        Self::with_options(name, &InterestOptions::default())
    }

    /// Creates an Interest from requester options.
    pub fn with_options(name: Name, opts: &InterestOptions) -> Self {
        let nonce = if opts.nonce == 0 {
            random_nonce()
        } else {
            opts.nonce
        };

        Self {
            name,
            nonce,
            lifetime_ms: opts.lifetime_ms,
            can_be_prefix: opts.can_be_prefix,
            must_be_fresh: opts.must_be_fresh,
        }
    }

    /// Sets the Interest lifetime.
    pub fn with_lifetime(mut self, lifetime_ms: u32) -> Self {
        self.lifetime_ms = lifetime_ms;
        self
    }

    /// Sets the nonce value.
    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }

    /// Sets the can_be_prefix flag.
    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    /// Sets the must_be_fresh flag.
    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    /// Does `data_name` answer this Interest?
    pub fn matches(&self, data_name: &Name) -> bool {
        if self.can_be_prefix {
            self.name.is_prefix_of(data_name)
        } else {
            &self.name == data_name
        }
    }

    /// Encodes the Interest in NDN-TLV.
    pub fn encode(&self) -> Bytes {
        let mut inner = BytesMut::new();
        self.name.to_tlv().encode(&mut inner);
        if self.can_be_prefix {
            TlvElement::new(tlv::TLV_CAN_BE_PREFIX, Bytes::new()).encode(&mut inner);
        }
        if self.must_be_fresh {
            TlvElement::new(tlv::TLV_MUST_BE_FRESH, Bytes::new()).encode(&mut inner);
        }
        TlvElement::new(tlv::TLV_NONCE, self.nonce.to_be_bytes().to_vec()).encode(&mut inner);
        tlv::encode_nonneg_element(tlv::TLV_INTEREST_LIFETIME, self.lifetime_ms as u64, &mut inner);

        let mut buf = BytesMut::with_capacity(inner.len() + 5);
        TlvElement::new(tlv::TLV_INTEREST, inner.freeze()).encode(&mut buf);
        buf.freeze()
    }

    /// Decodes one Interest from the front of `buf`.
    ///
    /// `buf` is advanced past the packet only on success.
    pub fn decode(buf: &mut Bytes) -> Result<Self, Error> {
        let mut probe = buf.clone();
        let outer = TlvElement::decode(&mut probe)?;
        if outer.tlv_type != tlv::TLV_INTEREST {
            return Err(Error::NdnPacket(format!(
                "Expected Interest TLV type {}, got {}",
                tlv::TLV_INTEREST, outer.tlv_type
            )));
        }

        let mut name = None;
        let mut nonce = None;
        let mut lifetime_ms = DEFAULT_INTEREST_LIFETIME_MS;
        let mut can_be_prefix = false;
        let mut must_be_fresh = false;

        let mut inner = outer.value;
        while inner.has_remaining() {
            let element = TlvElement::decode(&mut inner)?;
            match element.tlv_type {
                tlv::TLV_NAME => name = Some(Name::from_tlv(&element)?),
                tlv::TLV_NONCE => {
                    if element.value.len() != 4 {
                        return Err(Error::NdnPacket(format!(
                            "nonce must be 4 bytes, got {}",
                            element.value.len()
                        )));
                    }
                    nonce = Some(element.value.clone().get_u32());
                }
                tlv::TLV_INTEREST_LIFETIME => {
                    let value = tlv::decode_nonneg_integer(&element.value)?;
                    lifetime_ms = u32::try_from(value).unwrap_or(u32::MAX);
                }
                tlv::TLV_CAN_BE_PREFIX => can_be_prefix = true,
                tlv::TLV_MUST_BE_FRESH => must_be_fresh = true,
                // Unknown elements are ignored
                _ => {}
            }
        }

        let name = name.ok_or_else(|| Error::NdnPacket("Interest without a name".into()))?;

        *buf = probe;
        Ok(Self {
            name,
            nonce: nonce.unwrap_or_else(random_nonce),
            lifetime_ms,
            can_be_prefix,
            must_be_fresh,
        })
    }
}

/// Represents an NDN Data packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    /// The name of the Data packet.
    pub name: Name,

    /// The content of the Data packet.
    pub content: Bytes,

    /// How long the Data stays fresh after arrival.
    pub freshness_ms: Option<u32>,
}

impl Data {
    /// Creates a new Data packet.
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            content: content.into(),
            freshness_ms: None,
        }
    }

    /// Sets the freshness period.
    pub fn with_freshness(mut self, freshness_ms: u32) -> Self {
        self.freshness_ms = Some(freshness_ms);
        self
    }

    /// Encodes the Data in NDN-TLV.
    pub fn encode(&self) -> Bytes {
        let mut inner = BytesMut::new();
        self.name.to_tlv().encode(&mut inner);
        if let Some(freshness) = self.freshness_ms {
            let mut meta = BytesMut::new();
            tlv::encode_nonneg_element(tlv::TLV_FRESHNESS_PERIOD, freshness as u64, &mut meta);
            TlvElement::new(tlv::TLV_META_INFO, meta.freeze()).encode(&mut inner);
        }
        TlvElement::new(tlv::TLV_CONTENT, self.content.clone()).encode(&mut inner);

        let mut buf = BytesMut::with_capacity(inner.len() + 5);
        TlvElement::new(tlv::TLV_DATA, inner.freeze()).encode(&mut buf);
        buf.freeze()
    }

    /// Decodes one Data packet from the front of `buf`.
    ///
    /// `buf` is advanced past the packet only on success.
    pub fn decode(buf: &mut Bytes) -> Result<Self, Error> {
        let mut probe = buf.clone();
        let outer = TlvElement::decode(&mut probe)?;
        if outer.tlv_type != tlv::TLV_DATA {
            return Err(Error::NdnPacket(format!(
                "Expected Data TLV type {}, got {}",
                tlv::TLV_DATA, outer.tlv_type
            )));
        }

        let mut name = None;
        let mut content = Bytes::new();
        let mut freshness_ms = None;

        let mut inner = outer.value;
        while inner.has_remaining() {
            let element = TlvElement::decode(&mut inner)?;
            match element.tlv_type {
                tlv::TLV_NAME => name = Some(Name::from_tlv(&element)?),
                tlv::TLV_META_INFO => {
                    let mut meta = element.value;
                    while meta.has_remaining() {
                        let field = TlvElement::decode(&mut meta)?;
                        if field.tlv_type == tlv::TLV_FRESHNESS_PERIOD {
                            let value = tlv::decode_nonneg_integer(&field.value)?;
                            freshness_ms = Some(u32::try_from(value).unwrap_or(u32::MAX));
                        }
                    }
                }
                tlv::TLV_CONTENT => content = element.value,
                _ => {}
            }
        }

        let name = name.ok_or_else(|| Error::NdnPacket("Data without a name".into()))?;

        *buf = probe;
        Ok(Self {
            name,
            content,
            freshness_ms,
        })
    }
}

/// A decoded NDN-TLV packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdnPacket {
    Interest(Interest),
    Data(Data),
}

impl NdnPacket {
    /// Decodes whichever packet type leads `buf`.
    pub fn decode(buf: &mut Bytes) -> Result<Self, Error> {
        match buf.first() {
            Some(&tlv::TLV_INTEREST) => Interest::decode(buf).map(NdnPacket::Interest),
            Some(&tlv::TLV_DATA) => Data::decode(buf).map(NdnPacket::Data),
            Some(&other) => Err(Error::NdnPacket(format!(
                "unexpected packet type 0x{:02x}",
                other
            ))),
            None => Err(Error::Tlv("empty buffer".into())),
        }
    }

    pub fn name(&self) -> &Name {
        match self {
            NdnPacket::Interest(i) => &i.name,
            NdnPacket::Data(d) => &d.name,
        }
    }
}

/// The result of processing an Interest packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterestResult {
    /// The Interest was forwarded to this many faces.
    Forwarded(usize),

    /// The Interest was satisfied by the content store.
    SatisfiedByCs,

    /// The Interest was aggregated (merged with a pending Interest).
    Aggregated,

    /// A pending entry exists but no next hop was found.
    NoRoute,

    /// The Interest was dropped.
    Dropped(String), // Reason
}

fn random_nonce() -> u32 {
    // zero is reserved for "pick one for me"
    fastrand::u32(1..)
}
