//! Classic CAN frame representation used by the sequence engine.

use embedded_can::{ExtendedId, Frame, Id, StandardId};

/// Maximum payload length of a classic CAN frame.
pub const MAX_DLC: usize = 8;

/// Valid bits of an 11-bit standard identifier.
pub const SFF_MASK: u32 = 0x0000_07FF;

/// Valid bits of a 29-bit extended identifier.
pub const EFF_MASK: u32 = 0x1FFF_FFFF;

/// A CAN identifier already masked to the width of its addressing mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CanId {
    raw: u32,
    extended: bool,
}

impl CanId {
    /// Build an identifier, discarding bits outside the 11-bit or 29-bit range.
    pub const fn new(raw: u32, extended: bool) -> Self {
        let mask = if extended { EFF_MASK } else { SFF_MASK };
        Self {
            raw: raw & mask,
            extended,
        }
    }

    /// Standard (11-bit) identifier.
    pub const fn standard(raw: u32) -> Self {
        Self::new(raw, false)
    }

    /// Extended (29-bit) identifier.
    pub const fn extended(raw: u32) -> Self {
        Self::new(raw, true)
    }

    /// Masked identifier value.
    pub const fn raw(&self) -> u32 {
        self.raw
    }

    /// True for 29-bit addressing.
    pub const fn is_extended(&self) -> bool {
        self.extended
    }

    /// All-ones mask for this identifier's width.
    pub const fn full_mask(&self) -> u32 {
        if self.extended {
            EFF_MASK
        } else {
            SFF_MASK
        }
    }
}

impl From<CanId> for Id {
    fn from(id: CanId) -> Self {
        // `CanId::new` masks, so both constructors always succeed.
        if id.extended {
            Id::Extended(ExtendedId::new(id.raw).unwrap_or(ExtendedId::ZERO))
        } else {
            Id::Standard(StandardId::new(id.raw as u16).unwrap_or(StandardId::ZERO))
        }
    }
}

impl From<Id> for CanId {
    fn from(id: Id) -> Self {
        match id {
            Id::Standard(id) => CanId::standard(u32::from(id.as_raw())),
            Id::Extended(id) => CanId::extended(id.as_raw()),
        }
    }
}

/// Receive acceptance filter admitting a single identifier.
///
/// A frame passes when `frame_id & mask == id & mask` and its addressing mode equals the
/// filter's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdFilter {
    /// Identifier to accept.
    pub id: CanId,
    /// Mask applied to both sides before comparing.
    pub mask: u32,
}

impl IdFilter {
    /// Filter matching exactly `id` (mask width follows the addressing mode).
    pub const fn exact(id: CanId) -> Self {
        Self {
            id,
            mask: id.full_mask(),
        }
    }

    /// Whether a frame with identifier `id` would be admitted.
    pub fn matches(&self, id: CanId) -> bool {
        id.is_extended() == self.id.is_extended()
            && (id.raw() & self.mask) == (self.id.raw() & self.mask)
    }
}

/// One classic CAN frame.
///
/// The payload buffer is always eight bytes wide; only the first [`Frame::dlc`] bytes are
/// transmitted. Byte 0 of the buffer is the sequence byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeqFrame {
    id: Id,
    data: [u8; MAX_DLC],
    len: u8,
    remote: bool,
}

impl SeqFrame {
    /// Frame carrying `seq` in payload byte 0. `len` is clamped to [`MAX_DLC`].
    pub fn sequence(id: CanId, len: usize, seq: u8) -> Self {
        let mut data = [0u8; MAX_DLC];
        data[0] = seq;
        Self {
            id: id.into(),
            data,
            len: len.min(MAX_DLC) as u8,
            remote: false,
        }
    }

    /// Rebuild a frame from raw parts, e.g. as read from a socket.
    pub fn from_parts(id: CanId, len: u8, data: [u8; MAX_DLC], remote: bool) -> Self {
        Self {
            id: id.into(),
            data,
            len: len.min(MAX_DLC as u8),
            remote,
        }
    }

    /// Sequence byte (payload byte 0).
    ///
    /// Read from the buffer even when the frame length is zero, so zero-length frames read as 0.
    pub fn sequence_byte(&self) -> u8 {
        self.data[0]
    }

    /// Overwrite the sequence byte in place.
    pub fn set_sequence_byte(&mut self, seq: u8) {
        self.data[0] = seq;
    }

    /// Identifier as a masked [`CanId`].
    pub fn can_id(&self) -> CanId {
        self.id.into()
    }
}

impl Frame for SeqFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DLC {
            return None;
        }
        let mut buf = [0u8; MAX_DLC];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id: id.into(),
            data: buf,
            len: data.len() as u8,
            remote: false,
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > MAX_DLC {
            return None;
        }
        Some(Self {
            id: id.into(),
            data: [0u8; MAX_DLC],
            len: dlc as u8,
            remote: true,
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.len as usize
    }

    fn data(&self) -> &[u8] {
        if self.remote {
            &[]
        } else {
            &self.data[..self.len as usize]
        }
    }
}
