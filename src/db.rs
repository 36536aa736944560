use std::collections::BTreeSet;
use std::iter;

use lazy_static::lazy_static;

use crate::tcp::{IpVersion, PayloadSize, Quirk, Signature, TcpOption, WindowSize};

lazy_static! {
    pub static ref BUILTIN: Database = Database::default();
}

/// Canned signatures, addressable by name.
#[derive(Debug)]
pub struct Database {
    pub signatures: Vec<(&'static str, Signature)>,
}

impl Default for Database {
    fn default() -> Self {
        Database {
            signatures: vec![
                ("ios", Signature::ios()),
                ("linux", Signature::linux()),
                ("windows", Signature::windows()),
                ("freebsd", Signature::freebsd()),
                ("nintendo-3ds", Signature::nintendo_3ds()),
            ],
        }
    }
}

impl Database {
    pub fn get(&self, name: &str) -> Option<&Signature> {
        self.signatures
            .iter()
            .find(|(label, _)| *label == name)
            .map(|(_, sig)| sig)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.signatures.iter().map(|(label, _)| *label)
    }
}

fn quirks(quirks: &[Quirk]) -> BTreeSet<Quirk> {
    quirks.iter().copied().collect()
}

fn eol(padding: usize) -> impl Iterator<Item = TcpOption> {
    iter::once(TcpOption::EOL).chain(iter::repeat(TcpOption::Padding).take(padding))
}

impl Signature {
    /// iOS TCP stack, `4:64:0:1460:65535,5:mss,nop,ws,ts,sok,eol+1:df:0`
    pub fn ios() -> Self {
        use TcpOption::*;

        Signature {
            version: IpVersion::V4,
            ittl: 64,
            olen: 0,
            mss: Some(1460),
            wsize: WindowSize::Value(65535),
            wscale: Some(5),
            olayout: vec![MSS, NOP, WS, TS, SOK].into_iter().chain(eol(1)).collect(),
            quirks: quirks(&[Quirk::DF]),
            pclass: PayloadSize::Zero,
        }
    }

    /// Linux 3.11 and newer, `*:64:0:*:mss*20,10:mss,sok,ts,nop,ws:df,id+:0`
    pub fn linux() -> Self {
        use TcpOption::*;

        Signature {
            version: IpVersion::Any,
            ittl: 64,
            olen: 0,
            mss: None,
            wsize: WindowSize::MSS(20),
            wscale: Some(10),
            olayout: vec![MSS, SOK, TS, NOP, WS],
            quirks: quirks(&[Quirk::DF, Quirk::NonZeroID]),
            pclass: PayloadSize::Zero,
        }
    }

    /// Windows 7 or 8, `*:128:0:*:8192,8:mss,nop,ws,nop,nop,sok:df,id+:0`
    pub fn windows() -> Self {
        use TcpOption::*;

        Signature {
            version: IpVersion::Any,
            ittl: 128,
            olen: 0,
            mss: None,
            wsize: WindowSize::Value(8192),
            wscale: Some(8),
            olayout: vec![MSS, NOP, WS, NOP, NOP, SOK],
            quirks: quirks(&[Quirk::DF, Quirk::NonZeroID]),
            pclass: PayloadSize::Zero,
        }
    }

    /// FreeBSD 9.x or newer, `*:64:0:*:65535,6:mss,nop,ws,sok,ts:df,id+:0`
    pub fn freebsd() -> Self {
        use TcpOption::*;

        Signature {
            version: IpVersion::Any,
            ittl: 64,
            olen: 0,
            mss: None,
            wsize: WindowSize::Value(65535),
            wscale: Some(6),
            olayout: vec![MSS, NOP, WS, SOK, TS],
            quirks: quirks(&[Quirk::DF, Quirk::NonZeroID]),
            pclass: PayloadSize::Zero,
        }
    }

    /// Nintendo 3DS, `*:64:0:1360:32768,0:mss,nop,nop,sok:df,id+:0`
    pub fn nintendo_3ds() -> Self {
        use TcpOption::*;

        Signature {
            version: IpVersion::Any,
            ittl: 64,
            olen: 0,
            mss: Some(1360),
            wsize: WindowSize::Value(32768),
            wscale: Some(0),
            olayout: vec![MSS, NOP, NOP, SOK],
            quirks: quirks(&[Quirk::DF, Quirk::NonZeroID]),
            pclass: PayloadSize::Zero,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_database() {
        let _ = pretty_env_logger::try_init();

        assert_eq!(
            BUILTIN.names().collect::<Vec<_>>(),
            vec!["ios", "linux", "windows", "freebsd", "nintendo-3ds"]
        );
        assert_eq!(BUILTIN.get("ios"), Some(&Signature::ios()));
        assert_eq!(BUILTIN.get("beos"), None);
    }

    #[test]
    fn test_ios_layout() {
        let sig = Signature::ios();

        assert_eq!(
            sig.olayout,
            vec![
                TcpOption::MSS,
                TcpOption::NOP,
                TcpOption::WS,
                TcpOption::TS,
                TcpOption::SOK,
                TcpOption::EOL,
                TcpOption::Padding
            ]
        );
        assert!(sig.has_quirk(Quirk::DF));
        assert!(!sig.has_quirk(Quirk::NonZeroID));
    }

    #[cfg(feature = "parse")]
    #[test]
    fn test_builtin_matches_raw_sig() {
        for (name, sig) in &BUILTIN.signatures {
            let raw = sig.to_string();

            assert_eq!(&raw.parse::<Signature>().unwrap(), sig, "{}: {}", name, raw);
        }

        assert_eq!(
            Signature::ios().to_string(),
            "4:64:0:1460:65535,5:mss,nop,ws,ts,sok,eol+1:df:0"
        );
        assert_eq!(
            Signature::linux().to_string(),
            "*:64:0:*:mss*20,10:mss,sok,ts,nop,ws:df,id+:0"
        );
    }
}
