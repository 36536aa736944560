use std::collections::BTreeSet;

use pnet::packet::tcp::TcpOptionNumbers;

/// An OS fingerprint in p0f `raw_sig` form, the target the rewriter mimics.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub version: IpVersion,
    /// initial TTL used by the OS, with any path distance folded in.
    pub ittl: u8,
    /// length of IPv4 options or IPv6 extension headers.
    pub olen: u8,
    /// maximum segment size, if specified in TCP options.
    pub mss: Option<u16>,
    /// window size.
    pub wsize: WindowSize,
    /// window scaling factor, if specified in TCP options.
    pub wscale: Option<u8>,
    /// layout and ordering of TCP options, if any.
    pub olayout: Vec<TcpOption>,
    /// properties and quirks observed in IP or TCP headers.
    pub quirks: BTreeSet<Quirk>,
    /// payload size classification
    pub pclass: PayloadSize,
}

impl Signature {
    pub fn has_quirk(&self, quirk: Quirk) -> bool {
        self.quirks.contains(&quirk)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
    Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowSize {
    /// mss*n  - a multiple of the MSS
    MSS(u8),
    /// mtu*n  - a multiple of the MTU
    MTU(u8),
    /// %n     - any multiple of n
    Mod(u16),
    Value(u16),
    Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TcpOption {
    /// eol    - explicit end of options
    EOL,
    /// one byte of padding following `eol`, rendered as the `+n` of `eol+n`
    Padding,
    /// nop    - no-op option
    NOP,
    /// mss    - maximum segment size
    MSS,
    /// ws     - window scaling
    WS,
    /// sok    - selective ACK permitted
    SOK,
    /// sack   - selective ACK (should not be seen)
    SACK,
    /// ts     - timestamp
    TS,
    /// ?n     - unknown option ID n
    Unknown(u8),
}

impl TcpOption {
    /// The option kind on the wire; padding has none.
    pub fn kind(self) -> Option<u8> {
        use TcpOption::*;

        Some(match self {
            EOL => TcpOptionNumbers::EOL.0,
            Padding => return None,
            NOP => TcpOptionNumbers::NOP.0,
            MSS => TcpOptionNumbers::MSS.0,
            WS => TcpOptionNumbers::WSCALE.0,
            SOK => TcpOptionNumbers::SACK_PERMITTED.0,
            SACK => TcpOptionNumbers::SACK.0,
            TS => TcpOptionNumbers::TIMESTAMPS.0,
            Unknown(n) => n,
        })
    }

    pub fn from_kind(kind: u8) -> Self {
        use TcpOption::*;

        match kind {
            0 => EOL,
            1 => NOP,
            2 => MSS,
            3 => WS,
            4 => SOK,
            5 => SACK,
            8 => TS,
            n => Unknown(n),
        }
    }
}

/// Declaration order is the registry's application order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quirk {
    /// df     - "don't fragment" set (probably PMTUD); ignored for IPv6
    DF,
    /// id+    - DF set but IPID non-zero; ignored for IPv6
    NonZeroID,
    /// id-    - DF not set but IPID is zero; ignored for IPv6
    ZeroID,
    /// ecn    - explicit congestion notification support
    ECN,
    /// 0+     - "must be zero" field not zero; ignored for IPv6
    MustBeZero,
    /// flow   - non-zero IPv6 flow ID; ignored for IPv4
    FlowID,
    /// seq-   - sequence number is zero
    SeqNumZero,
    /// ack+   - ACK number is non-zero, but ACK flag not set
    AckNumNonZero,
    /// ack-   - ACK number is zero, but ACK flag set
    AckNumZero,
    /// uptr+  - URG pointer is non-zero, but URG flag not set
    NonZeroURG,
    /// urgf+  - URG flag used
    URG,
    /// pushf+ - PUSH flag used
    PUSH,
    /// ts1-   - own timestamp specified as zero
    OwnTimestampZero,
    /// ts2+   - non-zero peer timestamp on initial SYN
    PeerTimestampNonZero,
    /// opt+   - trailing non-zero data in options segment
    TrailingNonZero,
    /// exws   - excessive window scaling factor (> 14)
    ExcessiveWindowScaling,
    /// bad    - malformed TCP options
    OptBad,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadSize {
    Zero,
    NonZero,
    Any,
}
