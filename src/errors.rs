use core::fmt;

use failure::Fail;

use crate::tcp::TcpOption;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Fail)]
pub enum Error {
    /// malformed signature string or unknown token.
    #[fail(display = "invalid {} `{}`", field, value)]
    Parse { field: &'static str, value: String },

    /// a quirk or classification step needed a layer the packet doesn't have.
    #[fail(display = "no {} layer in packet", _0)]
    MissingLayer(Layer),

    /// raw bytes could not be decoded into layers.
    #[fail(display = "malformed packet: {}", _0)]
    Malformed(&'static str),

    /// lengths or checksums could not be fixed up.
    #[fail(display = "fail to serialize packet: {}", _0)]
    Serialization(String),

    /// the option layout demands a kind the source packet doesn't carry.
    #[fail(display = "no `{}` option in packet to satisfy layout", _0)]
    UnsatisfiableOption(TcpOption),
}

impl Error {
    pub fn parse<S: AsRef<str>>(field: &'static str, value: S) -> Self {
        Error::Parse {
            field,
            value: value.as_ref().to_owned(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layer {
    Ipv4,
    Tcp,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Layer::Ipv4 => "IPv4",
            Layer::Tcp => "TCP",
        })
    }
}
