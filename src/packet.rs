//! Layered view of an intercepted IPv4 packet, decoded from and encoded back
//! to raw bytes with `pnet`.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use pnet::packet::{
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::{self, Ipv4Flags, Ipv4Packet, MutableIpv4Packet},
    tcp::{self, MutableTcpPacket, TcpFlags, TcpOptionNumbers::*, TcpPacket},
    MutablePacket,
};

use crate::errors::{Error, Layer, Result};
use crate::tcp::{IpVersion, PayloadSize, Quirk, Signature, TcpOption, WindowSize};

pub const IPV4_HEADER_LEN: usize = 20;
pub const TCP_HEADER_LEN: usize = 20;
/// Both IPv4 and TCP cap their options at 40 bytes.
pub const MAX_OPTIONS_LEN: usize = 40;

/// Congestion encountered
const IP_TOS_CE: u8 = 0x01;
/// ECN supported
const IP_TOS_ECT: u8 = 0x02;
/// Must be zero
const IP4_MBZ: u8 = 0b0100;

#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub ip: Option<Ipv4>,
    pub tcp: Option<Tcp>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ipv4 {
    pub dscp: u8,
    pub ecn: u8,
    pub identification: u16,
    /// reserved, DF and MF bits.
    pub flags: u8,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: IpNextHeaderProtocol,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    /// raw option bytes, without the padding needed to align the header.
    pub options: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tcp {
    pub source: u16,
    pub destination: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub reserved: u8,
    pub flags: u8,
    pub window: u16,
    pub urgent_ptr: u16,
    pub options: Vec<WireOption>,
    pub payload: Vec<u8>,
}

/// A TCP option as laid out on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum WireOption {
    /// end of option list
    End,
    /// no-operation
    Nop,
    /// one byte after the end of option list
    Padding(u8),
    /// kind, length and value
    Tlv { kind: u8, data: Vec<u8> },
}

impl WireOption {
    pub fn len(&self) -> usize {
        match self {
            WireOption::End | WireOption::Nop | WireOption::Padding(_) => 1,
            WireOption::Tlv { data, .. } => 2 + data.len(),
        }
    }

    pub fn kind(&self) -> Option<u8> {
        match self {
            WireOption::End => Some(EOL.0),
            WireOption::Nop => Some(NOP.0),
            WireOption::Padding(_) => None,
            WireOption::Tlv { kind, .. } => Some(*kind),
        }
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            WireOption::End => buf.push(EOL.0),
            WireOption::Nop => buf.push(NOP.0),
            WireOption::Padding(b) => buf.push(*b),
            WireOption::Tlv { kind, data } => {
                buf.push(*kind);
                buf.push((2 + data.len()) as u8);
                buf.extend_from_slice(data);
            }
        }
    }
}

impl Packet {
    /// Decode a raw IPv4 packet as handed over by the interception queue.
    ///
    /// Only a broken IPv4 header or TCP header is an error. Non-TCP payloads
    /// and fragments decode without a TCP layer.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let packet = Ipv4Packet::new(data).ok_or(Error::Malformed("IPv4 packet too short"))?;

        if packet.get_version() != 4 {
            return Err(Error::Malformed("not an IPv4 packet"));
        }

        let header_len = packet.get_header_length() as usize * 4;
        let total_len = packet.get_total_length() as usize;

        if header_len < IPV4_HEADER_LEN || total_len < header_len || total_len > data.len() {
            return Err(Error::Malformed("inconsistent IPv4 header or total length"));
        }

        let ip = Ipv4 {
            dscp: packet.get_dscp(),
            ecn: packet.get_ecn(),
            identification: packet.get_identification(),
            flags: packet.get_flags(),
            fragment_offset: packet.get_fragment_offset(),
            ttl: packet.get_ttl(),
            protocol: packet.get_next_level_protocol(),
            source: packet.get_source(),
            destination: packet.get_destination(),
            options: data[IPV4_HEADER_LEN..header_len].to_vec(),
        };

        let fragmented = ip.fragment_offset > 0 || (ip.flags & Ipv4Flags::MoreFragments) != 0;

        let tcp = if ip.protocol == IpNextHeaderProtocols::Tcp && !fragmented {
            Some(Tcp::parse(&data[header_len..total_len])?)
        } else {
            None
        };

        Ok(Packet { ip: Some(ip), tcp })
    }

    /// Encode the packet, fixing up lengths, data offset and both checksums.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let ip = self.ip.as_ref().ok_or(Error::MissingLayer(Layer::Ipv4))?;
        let tcp = self.tcp.as_ref().ok_or(Error::MissingLayer(Layer::Tcp))?;

        let ip_options = aligned("IPv4", ip.options.clone())?;
        let tcp_options = aligned(
            "TCP",
            tcp.options.iter().fold(vec![], |mut buf, opt| {
                opt.write_to(&mut buf);
                buf
            }),
        )?;

        let ip_header_len = IPV4_HEADER_LEN + ip_options.len();
        let tcp_header_len = TCP_HEADER_LEN + tcp_options.len();
        let total_len = ip_header_len + tcp_header_len + tcp.payload.len();

        if total_len > usize::from(u16::MAX) {
            return Err(Error::Serialization(format!(
                "packet too long: {} bytes",
                total_len
            )));
        }

        let mut buf = vec![0u8; total_len];

        {
            let mut packet = MutableTcpPacket::new(&mut buf[ip_header_len..])
                .ok_or_else(|| Error::Serialization("TCP buffer too short".to_owned()))?;

            packet.set_source(tcp.source);
            packet.set_destination(tcp.destination);
            packet.set_sequence(tcp.sequence);
            packet.set_acknowledgement(tcp.acknowledgement);
            packet.set_data_offset((tcp_header_len / 4) as u8);
            packet.set_reserved(tcp.reserved);
            packet.set_flags(tcp.flags);
            packet.set_window(tcp.window);
            packet.set_urgent_ptr(tcp.urgent_ptr);
            packet.packet_mut()[TCP_HEADER_LEN..tcp_header_len].copy_from_slice(&tcp_options);
            packet.packet_mut()[tcp_header_len..].copy_from_slice(&tcp.payload);

            // the pseudo header needs the final IPv4 addresses
            let checksum = tcp::ipv4_checksum(&packet.to_immutable(), &ip.source, &ip.destination);
            packet.set_checksum(checksum);
        }

        {
            let mut packet = MutableIpv4Packet::new(&mut buf)
                .ok_or_else(|| Error::Serialization("IPv4 buffer too short".to_owned()))?;

            packet.set_version(4);
            packet.set_header_length((ip_header_len / 4) as u8);
            packet.set_dscp(ip.dscp);
            packet.set_ecn(ip.ecn);
            packet.set_total_length(total_len as u16);
            packet.set_identification(ip.identification);
            packet.set_flags(ip.flags);
            packet.set_fragment_offset(ip.fragment_offset);
            packet.set_ttl(ip.ttl);
            packet.set_next_level_protocol(ip.protocol);
            packet.set_source(ip.source);
            packet.set_destination(ip.destination);
            packet.packet_mut()[IPV4_HEADER_LEN..ip_header_len].copy_from_slice(&ip_options);

            let checksum = ipv4::checksum(&packet.to_immutable());
            packet.set_checksum(checksum);
        }

        Ok(buf)
    }

    pub fn ipv4_mut(&mut self) -> Result<&mut Ipv4> {
        self.ip.as_mut().ok_or(Error::MissingLayer(Layer::Ipv4))
    }

    pub fn tcp_mut(&mut self) -> Result<&mut Tcp> {
        self.tcp.as_mut().ok_or(Error::MissingLayer(Layer::Tcp))
    }

    /// SYN set, and none of FIN, RST, PSH or ACK.
    pub fn is_initial_syn(&self) -> bool {
        self.tcp.as_ref().map_or(false, |tcp| {
            tcp.flags & TcpFlags::SYN != 0
                && tcp.flags & (TcpFlags::FIN | TcpFlags::RST | TcpFlags::PSH | TcpFlags::ACK) == 0
        })
    }

    /// Observe the `raw_sig` this packet would be classified by.
    pub fn signature(&self) -> Result<Signature> {
        let ip = self.ip.as_ref().ok_or(Error::MissingLayer(Layer::Ipv4))?;
        let tcp = self.tcp.as_ref().ok_or(Error::MissingLayer(Layer::Tcp))?;
        let mut quirks = BTreeSet::new();

        if (ip.ecn & (IP_TOS_CE | IP_TOS_ECT)) != 0 {
            quirks.insert(Quirk::ECN);
        }
        if (ip.flags & IP4_MBZ) != 0 {
            quirks.insert(Quirk::MustBeZero);
        }
        if (ip.flags & Ipv4Flags::DontFragment) != 0 {
            quirks.insert(Quirk::DF);

            if ip.identification != 0 {
                quirks.insert(Quirk::NonZeroID);
            }
        } else if ip.identification == 0 {
            quirks.insert(Quirk::ZeroID);
        }

        let flags = tcp.flags;

        if (flags & (TcpFlags::ECE | TcpFlags::CWR)) != 0 {
            quirks.insert(Quirk::ECN);
        }
        if tcp.sequence == 0 {
            quirks.insert(Quirk::SeqNumZero);
        }
        if flags & TcpFlags::ACK != 0 {
            if tcp.acknowledgement == 0 {
                quirks.insert(Quirk::AckNumZero);
            }
        } else if tcp.acknowledgement != 0 && flags & TcpFlags::RST == 0 {
            quirks.insert(Quirk::AckNumNonZero);
        }
        if flags & TcpFlags::URG != 0 {
            quirks.insert(Quirk::URG);
        } else if tcp.urgent_ptr != 0 {
            quirks.insert(Quirk::NonZeroURG);
        }
        if flags & TcpFlags::PSH != 0 {
            quirks.insert(Quirk::PUSH);
        }

        let mut mss = None;
        let mut wscale = None;
        let mut olayout = vec![];

        for opt in &tcp.options {
            match opt {
                WireOption::End => olayout.push(TcpOption::EOL),
                WireOption::Nop => olayout.push(TcpOption::NOP),
                WireOption::Padding(b) => {
                    olayout.push(TcpOption::Padding);

                    if *b != 0 {
                        quirks.insert(Quirk::TrailingNonZero);
                    }
                }
                WireOption::Tlv { kind, data } => {
                    let opt = TcpOption::from_kind(*kind);

                    olayout.push(opt);

                    match opt {
                        TcpOption::MSS if data.len() == 2 => {
                            mss = Some(u16::from_be_bytes([data[0], data[1]]));
                        }
                        TcpOption::WS if data.len() == 1 => {
                            wscale = Some(data[0]);

                            if data[0] > 14 {
                                quirks.insert(Quirk::ExcessiveWindowScaling);
                            }
                        }
                        TcpOption::SOK if data.is_empty() => {}
                        TcpOption::SACK if [8, 16, 24, 32].contains(&data.len()) => {}
                        TcpOption::TS if data.len() == 8 => {
                            if data[..4].iter().all(|&b| b == 0) {
                                quirks.insert(Quirk::OwnTimestampZero);
                            }
                            if self.is_initial_syn() && data[4..].iter().any(|&b| b != 0) {
                                quirks.insert(Quirk::PeerTimestampNonZero);
                            }
                        }
                        TcpOption::MSS
                        | TcpOption::WS
                        | TcpOption::SOK
                        | TcpOption::SACK
                        | TcpOption::TS => {
                            quirks.insert(Quirk::OptBad);
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(Signature {
            version: IpVersion::V4,
            ittl: ip.ttl,
            olen: ip.options.len() as u8,
            mss,
            wsize: WindowSize::Value(tcp.window),
            wscale,
            olayout,
            quirks,
            pclass: if tcp.payload.is_empty() {
                PayloadSize::Zero
            } else {
                PayloadSize::NonZero
            },
        })
    }
}

impl Signature {
    pub fn extract(packet: &[u8]) -> Result<Self> {
        Packet::parse(packet).and_then(|packet| packet.signature())
    }
}

impl Tcp {
    fn parse(segment: &[u8]) -> Result<Self> {
        let packet = TcpPacket::new(segment).ok_or(Error::Malformed("TCP segment too short"))?;
        let header_len = packet.get_data_offset() as usize * 4;

        if header_len < TCP_HEADER_LEN || header_len > segment.len() {
            return Err(Error::Malformed("inconsistent TCP data offset"));
        }

        Ok(Tcp {
            source: packet.get_source(),
            destination: packet.get_destination(),
            sequence: packet.get_sequence(),
            acknowledgement: packet.get_acknowledgement(),
            reserved: packet.get_reserved(),
            flags: packet.get_flags(),
            window: packet.get_window(),
            urgent_ptr: packet.get_urgent_ptr(),
            options: parse_options(&segment[TCP_HEADER_LEN..header_len])?,
            payload: segment[header_len..].to_vec(),
        })
    }
}

fn parse_options(mut buf: &[u8]) -> Result<Vec<WireOption>> {
    let mut options = vec![];

    while let Some((&kind, rest)) = buf.split_first() {
        if kind == EOL.0 {
            options.push(WireOption::End);
            options.extend(rest.iter().map(|&b| WireOption::Padding(b)));
            break;
        } else if kind == NOP.0 {
            options.push(WireOption::Nop);
            buf = rest;
        } else {
            let len = *rest
                .first()
                .ok_or(Error::Malformed("truncated TCP option"))? as usize;

            if len < 2 || len > buf.len() {
                return Err(Error::Malformed("bad TCP option length"));
            }

            options.push(WireOption::Tlv {
                kind,
                data: buf[2..len].to_vec(),
            });
            buf = &buf[len..];
        }
    }

    Ok(options)
}

/// Zero-pad option bytes to a 32-bit boundary.
fn aligned(layer: &str, mut options: Vec<u8>) -> Result<Vec<u8>> {
    while options.len() % 4 != 0 {
        options.push(0);
    }

    if options.len() > MAX_OPTIONS_LEN {
        Err(Error::Serialization(format!(
            "{} options too long: {} bytes",
            layer,
            options.len()
        )))
    } else {
        Ok(options)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pnet::packet::Packet as _;

    use super::*;

    pub fn syn_packet() -> Packet {
        Packet {
            ip: Some(Ipv4 {
                dscp: 0,
                ecn: 0,
                identification: 0x1c46,
                flags: Ipv4Flags::DontFragment,
                fragment_offset: 0,
                ttl: 128,
                protocol: IpNextHeaderProtocols::Tcp,
                source: Ipv4Addr::new(192, 168, 1, 10),
                destination: Ipv4Addr::new(93, 184, 216, 34),
                options: vec![],
            }),
            tcp: Some(Tcp {
                source: 50123,
                destination: 443,
                sequence: 0x5e1f_3a07,
                acknowledgement: 0,
                reserved: 0,
                flags: TcpFlags::SYN,
                window: 8192,
                urgent_ptr: 0,
                options: vec![
                    WireOption::Tlv {
                        kind: MSS.0,
                        data: 1460u16.to_be_bytes().to_vec(),
                    },
                    WireOption::Nop,
                    WireOption::Tlv {
                        kind: WSCALE.0,
                        data: vec![8],
                    },
                    WireOption::Nop,
                    WireOption::Nop,
                    WireOption::Tlv {
                        kind: SACK_PERMITTED.0,
                        data: vec![],
                    },
                ],
                payload: vec![],
            }),
        }
    }

    pub fn syn_bytes() -> Vec<u8> {
        syn_packet().serialize().unwrap()
    }

    #[test]
    fn test_serialize_fixes_lengths_and_checksums() {
        let data = syn_bytes();

        assert_eq!(data.len(), 20 + 32);

        let ip = Ipv4Packet::new(&data).unwrap();
        assert_eq!(ip.get_total_length(), 52);
        assert_eq!(ip.get_header_length(), 5);
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));

        let tcp = TcpPacket::new(ip.payload()).unwrap();
        assert_eq!(tcp.get_data_offset(), 8);
        assert_eq!(
            tcp.get_checksum(),
            tcp::ipv4_checksum(&tcp, &ip.get_source(), &ip.get_destination())
        );
        assert_eq!(
            tcp.get_options_raw(),
            &[2, 4, 0x05, 0xb4, 1, 3, 3, 8, 1, 1, 4, 2][..]
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let data = syn_bytes();
        let packet = Packet::parse(&data).unwrap();

        assert_eq!(packet, syn_packet());
        assert_eq!(packet.serialize().unwrap(), data);
        assert!(packet.is_initial_syn());
    }

    #[test]
    fn test_parse_trailing_padding() {
        let mut packet = syn_packet();
        packet.tcp_mut().unwrap().options = vec![
            WireOption::Nop,
            WireOption::End,
            WireOption::Padding(0),
            WireOption::Padding(7),
        ];

        let parsed = Packet::parse(&packet.serialize().unwrap()).unwrap();

        assert_eq!(parsed, packet);
        assert!(parsed
            .signature()
            .unwrap()
            .has_quirk(Quirk::TrailingNonZero));
    }

    #[test]
    fn test_parse_malformed() {
        let data = syn_bytes();

        assert!(Packet::parse(&data[..10]).is_err());

        let mut short = data.clone();
        short.truncate(40);
        assert!(Packet::parse(&short).is_err());

        let mut bad_option = data.clone();
        // MSS option claims 40 bytes
        bad_option[21 + 20] = 40;
        assert!(Packet::parse(&bad_option).is_err());

        let mut v6 = data;
        v6[0] = 0x65;
        assert!(Packet::parse(&v6).is_err());
    }

    #[test]
    fn test_parse_non_tcp() {
        let mut data = syn_bytes();
        data[9] = IpNextHeaderProtocols::Udp.0;

        let packet = Packet::parse(&data).unwrap();

        assert!(packet.ip.is_some());
        assert!(packet.tcp.is_none());
        assert!(!packet.is_initial_syn());
    }

    #[test]
    fn test_initial_syn() {
        let mut packet = syn_packet();

        for &flags in &[
            TcpFlags::SYN | TcpFlags::ACK,
            TcpFlags::SYN | TcpFlags::PSH,
            TcpFlags::SYN | TcpFlags::RST,
            TcpFlags::SYN | TcpFlags::FIN,
            TcpFlags::ACK,
        ] {
            packet.tcp_mut().unwrap().flags = flags;
            assert!(!packet.is_initial_syn(), "flags {:#x}", flags);
        }

        packet.tcp_mut().unwrap().flags = TcpFlags::SYN | TcpFlags::ECE | TcpFlags::CWR;
        assert!(packet.is_initial_syn());
    }

    #[test]
    fn test_serialize_options_too_long() {
        let mut packet = syn_packet();
        packet.tcp_mut().unwrap().options = vec![WireOption::Nop; 41];

        match packet.serialize() {
            Err(Error::Serialization(_)) => {}
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn test_extract() {
        let sig = Signature::extract(&syn_bytes()).unwrap();

        assert_eq!(sig.version, IpVersion::V4);
        assert_eq!(sig.ittl, 128);
        assert_eq!(sig.olen, 0);
        assert_eq!(sig.mss, Some(1460));
        assert_eq!(sig.wsize, WindowSize::Value(8192));
        assert_eq!(sig.wscale, Some(8));
        assert_eq!(
            sig.olayout,
            vec![
                TcpOption::MSS,
                TcpOption::NOP,
                TcpOption::WS,
                TcpOption::NOP,
                TcpOption::NOP,
                TcpOption::SOK
            ]
        );
        assert_eq!(
            sig.quirks.into_iter().collect::<Vec<_>>(),
            vec![Quirk::DF, Quirk::NonZeroID]
        );
        assert_eq!(sig.pclass, PayloadSize::Zero);
    }
}
