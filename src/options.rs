//! TCP option layout builder.

use std::collections::HashMap;

use pnet::packet::tcp::TcpOptionNumbers;

use crate::errors::{Error, Result};
use crate::packet::WireOption;
use crate::tcp::{Signature, TcpOption, WindowSize};

pub const DEFAULT_MSS: u16 = 1460;
/// Used for `*` and `mtu*n` windows, the path MTU isn't known here.
pub const DEFAULT_WINDOW: u16 = 65535;
pub const DEFAULT_WSCALE: u8 = 0;

/// Concrete values for the signature's wildcard and symbolic fields.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolved {
    pub mss: u16,
    pub window: u16,
    pub wscale: u8,
}

impl Resolved {
    pub fn new(sig: &Signature) -> Self {
        let mss = sig.mss.unwrap_or(DEFAULT_MSS);
        let window = match sig.wsize {
            WindowSize::Value(n) => n,
            WindowSize::MSS(n) => {
                let window = u32::from(mss) * u32::from(n);

                if window > u32::from(u16::MAX) {
                    u16::MAX
                } else {
                    window as u16
                }
            }
            WindowSize::Mod(n) => n,
            WindowSize::MTU(_) | WindowSize::Any => DEFAULT_WINDOW,
        };

        Resolved {
            mss,
            window,
            wscale: sig.wscale.unwrap_or(DEFAULT_WSCALE),
        }
    }
}

/// Lay out TCP options in the signature's order.
///
/// Options the signature fully determines are generated, SACK and timestamps
/// are carried over from `original` when present, and any other kind must be
/// found in `original`; a repeated kind there resolves to its last occurrence.
pub fn build(
    olayout: &[TcpOption],
    original: &[WireOption],
    resolved: &Resolved,
) -> Result<Vec<WireOption>> {
    let by_kind = original
        .iter()
        .filter_map(|opt| opt.kind().map(|kind| (kind, opt)))
        .collect::<HashMap<_, _>>();
    let carried = |kind: u8| by_kind.get(&kind).map(|&opt| opt.clone());

    olayout
        .iter()
        .map(|&opt| {
            Ok(match opt {
                TcpOption::Padding => WireOption::Padding(0),
                TcpOption::EOL => WireOption::End,
                TcpOption::NOP => WireOption::Nop,
                TcpOption::MSS => WireOption::Tlv {
                    kind: TcpOptionNumbers::MSS.0,
                    data: resolved.mss.to_be_bytes().to_vec(),
                },
                TcpOption::WS => WireOption::Tlv {
                    kind: TcpOptionNumbers::WSCALE.0,
                    data: vec![resolved.wscale],
                },
                TcpOption::SOK => WireOption::Tlv {
                    kind: TcpOptionNumbers::SACK_PERMITTED.0,
                    data: vec![],
                },
                TcpOption::SACK => {
                    carried(TcpOptionNumbers::SACK.0).unwrap_or_else(|| WireOption::Tlv {
                        kind: TcpOptionNumbers::SACK.0,
                        data: vec![],
                    })
                }
                TcpOption::TS => {
                    carried(TcpOptionNumbers::TIMESTAMPS.0).unwrap_or_else(|| WireOption::Tlv {
                        kind: TcpOptionNumbers::TIMESTAMPS.0,
                        data: vec![0; 8],
                    })
                }
                TcpOption::Unknown(kind) => {
                    carried(kind).ok_or(Error::UnsatisfiableOption(opt))?
                }
            })
        })
        .collect()
}
