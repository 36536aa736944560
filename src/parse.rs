use std::iter;
use std::str::FromStr;

use nom::types::CompleteStr;
use nom::*;

use crate::errors::Error;
use crate::tcp::{IpVersion, PayloadSize, Quirk, Signature, TcpOption, WindowSize};

/// Parse `raw_sig`, `ver:ittl:olen:mss:wsize,wscale:olayout:quirks:pclass`.
impl FromStr for Signature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s.trim().split(':').collect::<Vec<_>>();

        if fields.len() != 8 {
            return Err(Error::parse("signature", s));
        }

        let (wsize, wscale) = match fields[4].find(',') {
            Some(pos) => (&fields[4][..pos], &fields[4][pos + 1..]),
            None => return Err(Error::parse("wsize,wscale", fields[4])),
        };

        Ok(Signature {
            version: fields[0].parse()?,
            ittl: parse_field("ittl", fields[1], parse_ttl)?,
            olen: parse_field("olen", fields[2], parse_u8)?,
            mss: parse_field("mss", fields[3], parse_mss)?,
            wsize: wsize.parse()?,
            wscale: parse_field("wscale", wscale, parse_wscale)?,
            olayout: parse_list(fields[5], |token| {
                parse_field("olayout", token, parse_tcp_option)
            })?
            .into_iter()
            .flatten()
            .collect(),
            quirks: parse_list(fields[6], |token| token.parse::<Quirk>())?.into_iter().collect(),
            pclass: fields[7].parse()?,
        })
    }
}

impl FromStr for Quirk {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quirk::from_name(s).ok_or_else(|| Error::parse("quirk", s))
    }
}

macro_rules! impl_from_str {
    ($ty:ty, $field:expr, $parse:ident) => {
        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_field($field, s, $parse)
            }
        }
    };
}

impl_from_str!(IpVersion, "ver", parse_ip_version);
impl_from_str!(WindowSize, "wsize", parse_window_size);
impl_from_str!(PayloadSize, "pclass", parse_payload_size);

/// Run `parser` over the whole of `s`, trailing input is an error.
fn parse_field<'a, T, F>(field: &'static str, s: &'a str, parser: F) -> Result<T, Error>
where
    F: Fn(CompleteStr<'a>) -> IResult<CompleteStr<'a>, T>,
{
    match parser(CompleteStr(s)) {
        Ok((remaining, value)) if remaining.is_empty() => Ok(value),
        _ => Err(Error::parse(field, s)),
    }
}

/// Parse a comma separated field, where an empty field is an empty list.
fn parse_list<'a, T, F>(s: &'a str, parse: F) -> Result<Vec<T>, Error>
where
    F: Fn(&'a str) -> Result<T, Error>,
{
    if s.is_empty() {
        Ok(vec![])
    } else {
        s.split(',').map(parse).collect()
    }
}

fn eol_with_padding(padding: u8) -> Vec<TcpOption> {
    iter::once(TcpOption::EOL)
        .chain(iter::repeat(TcpOption::Padding).take(usize::from(padding)))
        .collect()
}

named!(parse_u8<CompleteStr, u8>, map_res!(digit, |s: CompleteStr| s.parse::<u8>()));

named!(parse_u16<CompleteStr, u16>, map_res!(digit, |s: CompleteStr| s.parse::<u16>()));

named!(parse_ip_version<CompleteStr, IpVersion>, alt!(
    tag!("4") => { |_| IpVersion::V4 } |
    tag!("6") => { |_| IpVersion::V6 } |
    tag!("*") => { |_| IpVersion::Any }
));

#[rustfmt::skip]
named!(
    parse_ttl<CompleteStr, u8>,
    alt_complete!(
        terminated!(call!(parse_u8), tag!("-")) |
        terminated!(call!(parse_u8), tag!("+?")) |
        map_opt!(
            separated_pair!(call!(parse_u8), tag!("+"), call!(parse_u8)),
            |(ttl, distance): (u8, u8)| ttl.checked_add(distance)
        ) |
        call!(parse_u8)
    )
);

named!(parse_mss<CompleteStr, Option<u16>>, alt!(
    tag!("*")        => { |_| None } |
    call!(parse_u16) => { |n| Some(n) }
));

named!(parse_wscale<CompleteStr, Option<u8>>, alt!(
    tag!("*")       => { |_| None } |
    call!(parse_u8) => { |n| Some(n) }
));

named!(parse_window_size<CompleteStr, WindowSize>, alt_complete!(
    tag!("*")                                => { |_| WindowSize::Any } |
    preceded!(tag!("mss*"), call!(parse_u8)) => { |n| WindowSize::MSS(n) } |
    preceded!(tag!("mtu*"), call!(parse_u8)) => { |n| WindowSize::MTU(n) } |
    preceded!(tag!("%"), call!(parse_u16))   => { |n| WindowSize::Mod(n) } |
    call!(parse_u16)                         => { |n| WindowSize::Value(n) }
));

named!(parse_tcp_option<CompleteStr, Vec<TcpOption>>, alt_complete!(
    preceded!(tag!("eol+"), call!(parse_u8)) => { |n| eol_with_padding(n) } |
    tag!("eol")     => { |_| vec![TcpOption::EOL] } |
    tag!("pad")     => { |_| vec![TcpOption::Padding] } |
    tag!("nop")     => { |_| vec![TcpOption::NOP] } |
    tag!("mss")     => { |_| vec![TcpOption::MSS] } |
    tag!("ws")      => { |_| vec![TcpOption::WS] } |
    tag!("sok")     => { |_| vec![TcpOption::SOK] } |
    tag!("sack")    => { |_| vec![TcpOption::SACK] } |
    tag!("ts")      => { |_| vec![TcpOption::TS] } |
    preceded!(tag!("?"), call!(parse_u8)) => { |n| vec![TcpOption::Unknown(n)] }
));

named!(parse_payload_size<CompleteStr, PayloadSize>, alt!(
    tag!("0") => { |_| PayloadSize::Zero } |
    tag!("+") => { |_| PayloadSize::NonZero } |
    tag!("*") => { |_| PayloadSize::Any }
));

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use lazy_static::lazy_static;

    use super::*;
    use crate::tcp::{Quirk::*, TcpOption::*};

    fn quirks(quirks: &[Quirk]) -> BTreeSet<Quirk> {
        quirks.iter().copied().collect()
    }

    lazy_static! {
        static ref TCP_SIGNATURES: Vec<(&'static str, Signature)> = vec![
            (
                "*:64:0:*:mss*20,10:mss,sok,ts,nop,ws:df,id+:0",
                Signature {
                    version: IpVersion::Any,
                    ittl: 64,
                    olen: 0,
                    mss: None,
                    wsize: WindowSize::MSS(20),
                    wscale: Some(10),
                    olayout: vec![MSS, SOK, TS, NOP, WS],
                    quirks: quirks(&[DF, NonZeroID]),
                    pclass: PayloadSize::Zero,
                }
            ),
            (
                "*:64:0:*:16384,0:mss::0",
                Signature {
                    version: IpVersion::Any,
                    ittl: 64,
                    olen: 0,
                    mss: None,
                    wsize: WindowSize::Value(16384),
                    wscale: Some(0),
                    olayout: vec![MSS],
                    quirks: quirks(&[]),
                    pclass: PayloadSize::Zero,
                }
            ),
            (
                "4:128:0:1460:mtu*4,0:mss,nop,ws::+",
                Signature {
                    version: IpVersion::V4,
                    ittl: 128,
                    olen: 0,
                    mss: Some(1460),
                    wsize: WindowSize::MTU(4),
                    wscale: Some(0),
                    olayout: vec![MSS, NOP, WS],
                    quirks: quirks(&[]),
                    pclass: PayloadSize::NonZero,
                }
            ),
            (
                "4:64:0:1460:65535,5:mss,nop,ws,ts,sok,eol+1:df:0",
                Signature::ios()
            ),
            (
                "6:64:0:265:%8192,*:mss,sok,ts,?30,eol+2:ack+,uptr+,ts2+,bad:*",
                Signature {
                    version: IpVersion::V6,
                    ittl: 64,
                    olen: 0,
                    mss: Some(265),
                    wsize: WindowSize::Mod(8192),
                    wscale: None,
                    olayout: vec![MSS, SOK, TS, Unknown(30), EOL, Padding, Padding],
                    quirks: quirks(&[AckNumNonZero, NonZeroURG, PeerTimestampNonZero, OptBad]),
                    pclass: PayloadSize::Any,
                }
            )
        ];
        static ref TTLS: Vec<(&'static str, u8)> = vec![
            ("64", 64),
            ("54+10", 64),
            ("64-", 64),
            ("54+?", 54),
        ];
    }

    #[test]
    fn test_tcp_signature() {
        for (s, sig) in TCP_SIGNATURES.iter() {
            assert_eq!(&s.parse::<Signature>().unwrap(), sig);
            assert_eq!(&sig.to_string(), s);
        }
    }

    #[test]
    fn test_ttl() {
        for (s, ttl) in TTLS.iter() {
            assert_eq!(parse_field("ittl", s, parse_ttl).unwrap(), *ttl, "{}", s);
        }

        assert!(parse_field("ittl", "250+10", parse_ttl).is_err());
        assert!(parse_field("ittl", "256", parse_ttl).is_err());
    }

    #[test]
    fn test_stray_padding() {
        let sig = Signature {
            olayout: vec![NOP, Padding, MSS, EOL, Padding, Padding],
            ..Signature::ios()
        };
        let raw = sig.to_string();

        assert_eq!(raw, "4:64:0:1460:65535,5:nop,pad,mss,eol+2:df:0");
        assert_eq!(raw.parse::<Signature>().unwrap(), sig);

        let sig = "4:64:0:1460:65535,5:mss,eol,pad,pad:df:0"
            .parse::<Signature>()
            .unwrap();

        assert_eq!(sig.olayout, vec![MSS, EOL, Padding, Padding]);
        assert_eq!(sig.to_string(), "4:64:0:1460:65535,5:mss,eol+2:df:0");
    }

    #[test]
    fn test_quirk_order_is_canonical() {
        let sig = "4:64:0:*:*,*:mss:pushf+,df,ecn:0".parse::<Signature>().unwrap();

        assert_eq!(sig.to_string(), "4:64:0:*:*,*:mss:df,ecn,pushf+:0");
    }

    #[test]
    fn test_parse_errors() {
        let cases = vec![
            ("4:64:0:1460:65535,5:mss:df", "signature"),
            ("x:64:0:1460:65535,5:mss:df:0", "ver"),
            ("4:abc:0:1460:65535,5:mss:df:0", "ittl"),
            ("4:64:1000:1460:65535,5:mss:df:0", "olen"),
            ("4:64:0:-1:65535,5:mss:df:0", "mss"),
            ("4:64:0:1460:65535:mss:df:0", "wsize,wscale"),
            ("4:64:0:1460:mss*x,5:mss:df:0", "wsize"),
            ("4:64:0:1460:65535,w:mss:df:0", "wscale"),
            ("4:64:0:1460:65535,5:mss,foo:df:0", "olayout"),
            ("4:64:0:1460:65535,5:mss,eol+x:df:0", "olayout"),
            ("4:64:0:1460:65535,5:mss:df,evil:0", "quirk"),
            ("4:64:0:1460:65535,5:mss:df:1", "pclass"),
        ];

        for (s, expected) in cases {
            match s.parse::<Signature>() {
                Err(Error::Parse { field, .. }) => assert_eq!(field, expected, "{}", s),
                res => panic!("unexpected result for {}: {:?}", s, res),
            }
        }
    }

    #[test]
    fn test_round_trip_rewrites_alike() {
        use std::sync::Arc;

        use crate::mimic::{Entropy, Mimic};
        use crate::packet::tests::syn_bytes;

        let raw = "4:64+0:0:1460:mss*4,5:mss,nop,ws,ts,sok,eol+1:df:0";
        let parsed = raw.parse::<Signature>().unwrap();
        let reparsed = parsed.to_string().parse::<Signature>().unwrap();

        assert_eq!(parsed, reparsed);

        let rewrite = |sig: Signature| {
            Mimic::with_entropy(Arc::new(sig), Entropy::seed_from_u64(1)).process(&syn_bytes())
        };

        assert_eq!(rewrite(parsed), rewrite(reparsed));
    }
}
