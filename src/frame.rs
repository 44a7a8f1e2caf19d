//! smartMAC strobe / data frame header codec
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use byteorder::{ByteOrder, LittleEndian};

use ieee802154::mac::{PanId, ShortAddress};

/// Short address denoting all nodes
pub const BROADCAST_ADDR: ShortAddress = ShortAddress(0xffff);

/// Space reserved ahead of the MAC header for the PHY header
pub const PHY_HEADER_LEN: usize = 2;

/// Encoded header length (frame control, counter, PAN ID, destination, source)
pub const HEADER_LEN: usize = 9;

/// Buffer size used when building strobes (PHY header, MAC header, FCS space)
pub const STROBE_BUF_LEN: usize = 15;

const COUNTER_IX: usize = 2;
const PAN_ID_IX: usize = 3;
const DEST_IX: usize = 5;
const SRC_IX: usize = 7;

/// Frame type field mask (IEEE 802.15.4 frame control bits 0..2)
const FRAME_TYPE_MASK: u16 = 0b0000_0000_0000_0111;

bitflags::bitflags!{
    /// Frame control flags
    /// (IEEE 802.15.4-2006 section 7.2.1.1, type bits excluded)
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct FrameControl: u16 {
        const SECURITY      = 0b0000_0000_0000_1000;
        const FRAME_PENDING = 0b0000_0000_0001_0000;
        const ACK_REQUEST   = 0b0000_0000_0010_0000;
        const PAN_ID_COMPRESS = 0b0000_0000_0100_0000;

        /// Destination addressing mode, short (16-bit) address
        const DEST_SHORT    = 0b0000_1000_0000_0000;
        /// Frame version 802.15.4-2006
        const VERSION_2006  = 0b0001_0000_0000_0000;
        /// Source addressing mode, short (16-bit) address
        const SRC_SHORT     = 0b1000_0000_0000_0000;
    }
}

/// smartMAC frame types
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    /// Wake-up strobe, uses the reserved 802.15.4 frame type `0b100`
    Strobe,
    /// Ordinary 802.15.4 data frame
    Data,
    /// Anything else, including frames too short to parse
    Other,
}

impl FrameType {
    fn bits(&self) -> u16 {
        match self {
            FrameType::Strobe => 0b100,
            FrameType::Data => 0b001,
            FrameType::Other => 0b111,
        }
    }

    fn from_bits(v: u16) -> Self {
        match v & FRAME_TYPE_MASK {
            0b100 => FrameType::Strobe,
            0b001 => FrameType::Data,
            _ => FrameType::Other,
        }
    }
}

/// Decoded smartMAC frame header
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub frame_type: FrameType,
    /// Countdown position in a strobe burst, 0 is the last strobe
    pub counter: u8,
    pub ack_required: bool,
    pub pan_id: PanId,
    pub src_addr: ShortAddress,
    pub dest_addr: ShortAddress,
}

impl Frame {
    /// Build a strobe frame
    pub fn strobe(counter: u8, ack_required: bool, pan_id: PanId, src_addr: ShortAddress, dest_addr: ShortAddress) -> Self {
        Self {
            frame_type: FrameType::Strobe,
            counter,
            ack_required,
            pan_id,
            src_addr,
            dest_addr,
        }
    }

    pub fn is_strobe(&self) -> bool {
        self.frame_type == FrameType::Strobe
    }

    pub fn is_broadcast(&self) -> bool {
        self.dest_addr == BROADCAST_ADDR
    }

    /// Encode the frame header into the provided buffer, returning the
    /// encoded length.
    ///
    /// Panics if `buff` is shorter than [`HEADER_LEN`].
    pub fn encode(&self, buff: &mut [u8]) -> usize {
        let mut fc = FrameControl::DEST_SHORT | FrameControl::VERSION_2006 | FrameControl::SRC_SHORT;
        if self.ack_required {
            fc |= FrameControl::ACK_REQUEST;
        }

        LittleEndian::write_u16(&mut buff[0..], fc.bits() | self.frame_type.bits());
        buff[COUNTER_IX] = self.counter;
        LittleEndian::write_u16(&mut buff[PAN_ID_IX..], self.pan_id.0);
        LittleEndian::write_u16(&mut buff[DEST_IX..], self.dest_addr.0);
        LittleEndian::write_u16(&mut buff[SRC_IX..], self.src_addr.0);

        HEADER_LEN
    }

    /// Decode a frame header.
    ///
    /// Never fails, anything shorter than a full header decodes as
    /// [`FrameType::Other`] with zeroed fields.
    pub fn decode(buff: &[u8]) -> Self {
        if buff.len() < HEADER_LEN {
            return Self {
                frame_type: FrameType::Other,
                counter: 0,
                ack_required: false,
                pan_id: PanId(0),
                src_addr: ShortAddress(0),
                dest_addr: ShortAddress(0),
            }
        }

        let fc = LittleEndian::read_u16(&buff[0..]);
        let flags = FrameControl::from_bits_truncate(fc);

        Self {
            frame_type: FrameType::from_bits(fc),
            counter: buff[COUNTER_IX],
            ack_required: flags.contains(FrameControl::ACK_REQUEST),
            pan_id: PanId(LittleEndian::read_u16(&buff[PAN_ID_IX..])),
            dest_addr: ShortAddress(LittleEndian::read_u16(&buff[DEST_IX..])),
            src_addr: ShortAddress(LittleEndian::read_u16(&buff[SRC_IX..])),
        }
    }
}

/// Fetch the sequence number of an outgoing 802.15.4 frame if it requests
/// an acknowledgement
pub fn ack_request_seq(buff: &[u8]) -> Option<u8> {
    if buff.len() < 3 {
        return None;
    }

    let fc = FrameControl::from_bits_truncate(LittleEndian::read_u16(buff));
    match fc.contains(FrameControl::ACK_REQUEST) {
        true => Some(buff[2]),
        false => None,
    }
}
