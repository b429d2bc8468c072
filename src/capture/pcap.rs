//! Minimal reader for legacy pcap captures.
//!
//! Handles both file endiannesses and both timestamp resolutions, plus the
//! link-layer walk down to the TCP payload for the link types the capture
//! tooling actually produces (Ethernet, BSD loopback, raw IP). No pcapng,
//! no live capture.

use crate::config::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, Result};
use std::io::Read;

/// Ethernet (IEEE 802.3).
pub const LINKTYPE_ETHERNET: u32 = 1;
/// BSD loopback: 4-byte address-family header.
pub const LINKTYPE_NULL: u32 = 0;
/// Raw IP, no link-layer header.
pub const LINKTYPE_RAW: u32 = 101;

const MAGIC_MICROS: u32 = 0xA1B2_C3D4;
const MAGIC_NANOS: u32 = 0xA1B2_3C4D;

/// One captured packet.
#[derive(Debug, Clone)]
pub struct Record {
    /// Capture timestamp, seconds part.
    pub ts_sec: u32,
    /// Capture timestamp, fractional part in nanoseconds.
    pub ts_nsec: u32,
    /// Captured link-layer bytes.
    pub data: Vec<u8>,
}

/// Streaming reader over a legacy pcap file.
#[derive(Debug)]
pub struct PcapReader<R> {
    inner: R,
    swapped: bool,
    nanos: bool,
    linktype: u32,
}

impl<R: Read> PcapReader<R> {
    /// Parse the 24-byte global header and position at the first record.
    pub fn new(mut inner: R) -> Result<Self> {
        let mut header = [0u8; 24];
        inner
            .read_exact(&mut header)
            .map_err(|e| ProtocolError::Capture(format!("short pcap header: {e}")))?;

        let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let (swapped, nanos) = match magic {
            MAGIC_MICROS => (false, false),
            MAGIC_NANOS => (false, true),
            m if m.swap_bytes() == MAGIC_MICROS => (true, false),
            m if m.swap_bytes() == MAGIC_NANOS => (true, true),
            m => {
                return Err(ProtocolError::Capture(format!(
                    "not a pcap file (magic {m:#010x})"
                )))
            }
        };

        let read_u32 = |bytes: [u8; 4]| {
            if swapped {
                u32::from_le_bytes(bytes)
            } else {
                u32::from_be_bytes(bytes)
            }
        };
        let linktype = read_u32([header[20], header[21], header[22], header[23]]);

        Ok(Self {
            inner,
            swapped,
            nanos,
            linktype,
        })
    }

    /// Link type of the capture, shared by every record.
    pub fn linktype(&self) -> u32 {
        self.linktype
    }

    fn u32_at(&self, header: &[u8; 16], offset: usize) -> u32 {
        let bytes = [
            header[offset],
            header[offset + 1],
            header[offset + 2],
            header[offset + 3],
        ];
        if self.swapped {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        }
    }

    /// Read the next record; `Ok(None)` at a clean end of file.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let mut header = [0u8; 16];
        match read_exact_or_eof(&mut self.inner, &mut header) {
            Ok(false) => return Ok(None),
            Ok(true) => {}
            Err(e) => {
                return Err(ProtocolError::Capture(format!(
                    "truncated record header: {e}"
                )))
            }
        }

        let ts_sec = self.u32_at(&header, 0);
        let ts_frac = self.u32_at(&header, 4);
        let incl_len = self.u32_at(&header, 8) as usize;

        if incl_len > MAX_FRAME_SIZE {
            return Err(ProtocolError::Capture(format!(
                "record claims {incl_len} bytes"
            )));
        }

        let mut data = vec![0u8; incl_len];
        self.inner
            .read_exact(&mut data)
            .map_err(|e| ProtocolError::Capture(format!("truncated record body: {e}")))?;

        Ok(Some(Record {
            ts_sec,
            ts_nsec: if self.nanos { ts_frac } else { ts_frac.saturating_mul(1000) },
            data,
        }))
    }
}

impl<R: Read> Iterator for PcapReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// `read_exact`, except a clean EOF before the first byte returns Ok(false).
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "unexpected end of file",
            ));
        }
        filled += n;
    }
    Ok(true)
}

/// Extract the TCP payload of one captured packet, if it has one.
///
/// Returns `None` for anything that is not a TCP segment with a non-empty
/// payload; the capture is untrusted mixed traffic, so malformed packets
/// are simply not this protocol's business.
pub fn tcp_payload(linktype: u32, data: &[u8]) -> Option<&[u8]> {
    let ip = match linktype {
        LINKTYPE_ETHERNET => ethernet_payload(data)?,
        LINKTYPE_NULL => {
            // 4-byte address family in capture-host byte order; 2 is
            // AF_INET everywhere, IPv6 varies (24/28/30) so the IP version
            // nibble decides below either way.
            data.get(4..)?
        }
        LINKTYPE_RAW => data,
        _ => return None,
    };

    let payload = match ip.first()? >> 4 {
        4 => ipv4_tcp_payload(ip)?,
        6 => ipv6_tcp_payload(ip)?,
        _ => return None,
    };

    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

fn ethernet_payload(data: &[u8]) -> Option<&[u8]> {
    let mut ethertype = u16::from_be_bytes([*data.get(12)?, *data.get(13)?]);
    let mut offset = 14;

    // Single 802.1Q / 802.1ad tag.
    if ethertype == 0x8100 || ethertype == 0x88A8 {
        ethertype = u16::from_be_bytes([*data.get(16)?, *data.get(17)?]);
        offset = 18;
    }

    match ethertype {
        0x0800 | 0x86DD => data.get(offset..),
        _ => None,
    }
}

fn ipv4_tcp_payload(ip: &[u8]) -> Option<&[u8]> {
    if ip.len() < 20 || ip[0] >> 4 != 4 {
        return None;
    }
    let ihl = usize::from(ip[0] & 0x0F) * 4;
    if ihl < 20 {
        return None;
    }
    // Total length bounds the payload; Ethernet pads short frames.
    let total_len = usize::from(u16::from_be_bytes([ip[2], ip[3]]));
    if total_len < ihl || total_len > ip.len() {
        return None;
    }
    if ip[9] != 6 {
        return None;
    }
    tcp_segment_payload(&ip[ihl..total_len])
}

fn ipv6_tcp_payload(ip: &[u8]) -> Option<&[u8]> {
    if ip.len() < 40 || ip[0] >> 4 != 6 {
        return None;
    }
    // Extension headers are not walked; plain TCP only.
    if ip[6] != 6 {
        return None;
    }
    let payload_len = usize::from(u16::from_be_bytes([ip[4], ip[5]]));
    let end = 40usize.checked_add(payload_len)?;
    tcp_segment_payload(ip.get(40..end.min(ip.len()))?)
}

fn tcp_segment_payload(segment: &[u8]) -> Option<&[u8]> {
    if segment.len() < 20 {
        return None;
    }
    let data_offset = usize::from(segment[12] >> 4) * 4;
    if data_offset < 20 {
        return None;
    }
    segment.get(data_offset..)
}
