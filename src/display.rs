use core::fmt;

use crate::mimic::Verdict;
use crate::tcp::{IpVersion, PayloadSize, Quirk, Signature, TcpOption, WindowSize};

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}:", self.version, self.ittl, self.olen)?;

        if let Some(mss) = self.mss {
            write!(f, "{}", mss)?;
        } else {
            f.write_str("*")?;
        }

        write!(f, ":{},", self.wsize)?;

        if let Some(scale) = self.wscale {
            write!(f, "{}", scale)?;
        } else {
            f.write_str("*")?;
        }

        f.write_str(":")?;

        let mut olayout = self.olayout.iter().peekable();
        let mut first = true;

        while let Some(o) = olayout.next() {
            if !first {
                f.write_str(",")?;
            }
            first = false;

            // padding right after `eol` is its `+n`, anywhere else it's a bare `pad`
            if *o == TcpOption::EOL {
                let mut padding = 0;

                while olayout.next_if_eq(&&TcpOption::Padding).is_some() {
                    padding += 1;
                }

                write!(f, "eol+{}", padding)?;
            } else {
                write!(f, "{}", o)?;
            }
        }

        f.write_str(":")?;

        for (i, q) in self.quirks.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }

            write!(f, "{}", q)?;
        }

        write!(f, ":{}", self.pclass)
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use IpVersion::*;

        f.write_str(match self {
            V4 => "4",
            V6 => "6",
            Any => "*",
        })
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use WindowSize::*;

        match self {
            MSS(n) => write!(f, "mss*{}", n),
            MTU(n) => write!(f, "mtu*{}", n),
            Mod(n) => write!(f, "%{}", n),
            Value(n) => write!(f, "{}", n),
            Any => f.write_str("*"),
        }
    }
}

impl fmt::Display for TcpOption {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TcpOption::*;

        match self {
            EOL => f.write_str("eol"),
            Padding => f.write_str("pad"),
            NOP => f.write_str("nop"),
            MSS => f.write_str("mss"),
            WS => f.write_str("ws"),
            SOK => f.write_str("sok"),
            SACK => f.write_str("sack"),
            TS => f.write_str("ts"),
            Unknown(n) => write!(f, "?{}", n),
        }
    }
}

impl fmt::Display for Quirk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for PayloadSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use PayloadSize::*;

        f.write_str(match self {
            Zero => "0",
            NonZero => "+",
            Any => "*",
        })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Accept => f.write_str("accept"),
            Verdict::AcceptModified(data) => write!(f, "accept with {} bytes", data.len()),
        }
    }
}
