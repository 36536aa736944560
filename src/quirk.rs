//! The quirk registry.
//!
//! Every quirk is a bidirectional rule: given whether the active signature
//! carries it, `apply` forces the packet's telltale into that state whatever
//! the packet looked like before. The whole registry runs on every packet in
//! `Quirk::ALL` order, since several rules touch the same fields.

use pnet::packet::{ipv4::Ipv4Flags, tcp::TcpFlags};
use rand::{Rng, RngCore};

use crate::errors::Result;
use crate::packet::{Packet, WireOption};
use crate::tcp::Quirk;

/// Congestion encountered
const IP_TOS_CE: u8 = 0x01;
/// ECN supported
const IP_TOS_ECT: u8 = 0x02;
/// Must be zero
const IP4_MBZ: u8 = 0b0100;

const TCPOPT_TIMESTAMPS: u8 = 8;

impl Quirk {
    pub const ALL: [Quirk; 17] = [
        Quirk::DF,
        Quirk::NonZeroID,
        Quirk::ZeroID,
        Quirk::ECN,
        Quirk::MustBeZero,
        Quirk::FlowID,
        Quirk::SeqNumZero,
        Quirk::AckNumNonZero,
        Quirk::AckNumZero,
        Quirk::NonZeroURG,
        Quirk::URG,
        Quirk::PUSH,
        Quirk::OwnTimestampZero,
        Quirk::PeerTimestampNonZero,
        Quirk::TrailingNonZero,
        Quirk::ExcessiveWindowScaling,
        Quirk::OptBad,
    ];

    /// p0f name of the quirk, as used in `raw_sig`.
    pub fn name(self) -> &'static str {
        use Quirk::*;

        match self {
            DF => "df",
            NonZeroID => "id+",
            ZeroID => "id-",
            ECN => "ecn",
            MustBeZero => "0+",
            FlowID => "flow",
            SeqNumZero => "seq-",
            AckNumNonZero => "ack+",
            AckNumZero => "ack-",
            NonZeroURG => "uptr+",
            URG => "urgf+",
            PUSH => "pushf+",
            OwnTimestampZero => "ts1-",
            PeerTimestampNonZero => "ts2+",
            TrailingNonZero => "opt+",
            ExcessiveWindowScaling => "exws",
            OptBad => "bad",
        }
    }

    pub fn from_name(name: &str) -> Option<Quirk> {
        Quirk::ALL.iter().copied().find(|quirk| quirk.name() == name)
    }

    /// Make the packet show (or hide) this quirk's telltale.
    ///
    /// Fails with `Error::MissingLayer` when the layer the rule works on is absent.
    pub fn apply<R: RngCore>(self, packet: &mut Packet, present: bool, rng: &mut R) -> Result<()> {
        use Quirk::*;

        match self {
            DF => {
                let ip = packet.ipv4_mut()?;

                if present {
                    ip.flags |= Ipv4Flags::DontFragment;
                } else {
                    ip.flags &= !Ipv4Flags::DontFragment;
                }
            }
            NonZeroID => {
                let ip = packet.ipv4_mut()?;

                if present {
                    ip.flags &= !Ipv4Flags::DontFragment;

                    if ip.identification == 0 {
                        ip.identification = rng.gen_range(1..=u16::MAX);
                    }
                }
            }
            ZeroID => {
                let ip = packet.ipv4_mut()?;

                if present {
                    ip.flags &= !Ipv4Flags::DontFragment;
                    ip.identification = 0;
                }
            }
            ECN => {
                let ip = packet.ipv4_mut()?;

                if present {
                    if ip.ecn != IP_TOS_CE && ip.ecn != IP_TOS_ECT {
                        ip.ecn = if rng.gen() { IP_TOS_CE } else { IP_TOS_ECT };
                    }
                } else {
                    ip.ecn &= !(IP_TOS_CE | IP_TOS_ECT);
                }
            }
            MustBeZero => {
                let ip = packet.ipv4_mut()?;

                if present {
                    ip.flags |= IP4_MBZ;
                } else {
                    ip.flags &= !IP4_MBZ;
                }
            }
            // the flow label only exists in IPv6
            FlowID => {}
            SeqNumZero => {
                let tcp = packet.tcp_mut()?;

                if present {
                    tcp.sequence = 0;
                } else if tcp.sequence == 0 {
                    tcp.sequence = rng.gen_range(1..=u32::MAX);
                }
            }
            AckNumNonZero => {
                let tcp = packet.tcp_mut()?;

                if present {
                    tcp.flags &= !TcpFlags::ACK;

                    if tcp.acknowledgement == 0 {
                        tcp.acknowledgement = rng.gen_range(1..=u32::MAX);
                    }
                }
            }
            AckNumZero => {
                let tcp = packet.tcp_mut()?;

                if present {
                    tcp.flags |= TcpFlags::ACK;
                    tcp.acknowledgement = 0;
                }
            }
            NonZeroURG => {
                let tcp = packet.tcp_mut()?;

                if present {
                    if tcp.urgent_ptr == 0 {
                        tcp.urgent_ptr = rng.gen_range(1..=u16::MAX);
                    }

                    tcp.flags &= !TcpFlags::URG;
                }
            }
            URG => {
                let tcp = packet.tcp_mut()?;

                if present {
                    tcp.flags |= TcpFlags::URG;
                } else {
                    tcp.flags &= !TcpFlags::URG;
                }
            }
            PUSH => {
                let tcp = packet.tcp_mut()?;

                if present {
                    tcp.flags |= TcpFlags::PSH;
                } else {
                    tcp.flags &= !TcpFlags::PSH;
                }
            }
            OwnTimestampZero => {
                let tcp = packet.tcp_mut()?;

                if present {
                    if let Some(data) = timestamps(&mut tcp.options) {
                        data[..4].iter_mut().for_each(|b| *b = 0);
                    }
                }
            }
            PeerTimestampNonZero => {
                let tcp = packet.tcp_mut()?;

                if present {
                    if let Some(data) = timestamps(&mut tcp.options) {
                        data[4..8].iter_mut().for_each(|b| *b = 0);
                    }
                }
            }
            // TODO: enforce trailing option bytes, window scale > 14 and
            // malformed options once the option builder can emit them.
            TrailingNonZero | ExcessiveWindowScaling | OptBad => {
                packet.tcp_mut()?;
            }
        }

        Ok(())
    }
}

/// The value bytes of the last well-formed timestamps option.
fn timestamps(options: &mut [WireOption]) -> Option<&mut [u8]> {
    options.iter_mut().rev().find_map(|opt| match opt {
        WireOption::Tlv { kind, data } if *kind == TCPOPT_TIMESTAMPS && data.len() >= 8 => {
            Some(&mut data[..8])
        }
        _ => None,
    })
}
