//! The rewrite pipeline.
//!
//! Every intercepted packet gets exactly one verdict. Only a pure initial SYN
//! is rewritten; anything else, and any SYN the pipeline fails to rewrite, is
//! accepted untouched.

use std::sync::Arc;

use rand::{
    rngs::{SmallRng, StdRng},
    CryptoRng, Rng, RngCore, SeedableRng,
};

use crate::config::Config;
use crate::errors::{Error, Layer, Result};
use crate::options::{self, Resolved};
use crate::packet::Packet;
use crate::tcp::{PayloadSize, Quirk, Signature};

/// Largest payload synthesized for a `+` payload class.
const MAX_SYNTHETIC_PAYLOAD: usize = 9;

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// let the original packet through.
    Accept,
    /// let the packet through, replaced with these bytes.
    AcceptModified(Vec<u8>),
}

/// Randomness used while rewriting.
///
/// `fast` fills header fields, `secure` fills synthesized payload, which must
/// not become a fingerprint of its own.
#[derive(Clone, Debug)]
pub struct Entropy<R = SmallRng, C = StdRng> {
    pub fast: R,
    pub secure: C,
}

impl Entropy {
    pub fn from_entropy() -> Self {
        Entropy {
            fast: SmallRng::from_entropy(),
            secure: StdRng::from_entropy(),
        }
    }

    pub fn seed_from_u64(seed: u64) -> Self {
        Entropy {
            fast: SmallRng::seed_from_u64(seed),
            secure: StdRng::seed_from_u64(seed),
        }
    }
}

/// Rewrites initial SYNs to look like they come from the signature's OS.
///
/// A `Mimic` owns its randomness; concurrent workers each get their own and
/// share the signature.
#[derive(Debug)]
pub struct Mimic<R = SmallRng, C = StdRng> {
    signature: Arc<Signature>,
    entropy: Entropy<R, C>,
}

impl Mimic {
    pub fn new(config: &Config) -> Self {
        Mimic::with_entropy(config.signature.clone(), Entropy::from_entropy())
    }
}

impl<R: RngCore, C: RngCore + CryptoRng> Mimic<R, C> {
    pub fn with_entropy(signature: Arc<Signature>, entropy: Entropy<R, C>) -> Self {
        Mimic { signature, entropy }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Decide the verdict for one intercepted packet.
    pub fn process(&mut self, data: &[u8]) -> Verdict {
        let mut packet = match Packet::parse(data) {
            Ok(packet) => packet,
            Err(err) => {
                debug!("pass through undecodable packet, {}", err);

                return Verdict::Accept;
            }
        };

        if !packet.is_initial_syn() {
            trace!("pass through non-SYN packet");

            return Verdict::Accept;
        }

        match self.rewrite(&mut packet) {
            Ok(data) => {
                debug!("rewrite SYN to {} bytes", data.len());

                Verdict::AcceptModified(data)
            }
            Err(err) => {
                warn!("fail to rewrite SYN, pass through unmodified: {}", err);

                Verdict::Accept
            }
        }
    }

    /// Rewrite a decoded SYN in place and encode the result.
    ///
    /// On error the packet may be half rewritten and must be discarded.
    pub fn rewrite(&mut self, packet: &mut Packet) -> Result<Vec<u8>> {
        let sig = &*self.signature;

        {
            let ip = packet.ipv4_mut()?;

            if ip.ttl != sig.ittl {
                trace!("change TTL from {} to {}", ip.ttl, sig.ittl);

                ip.ttl = sig.ittl;
            }

            if ip.options.len() != usize::from(sig.olen) {
                warn!(
                    "IP options length mismatch, expect {}, got {}: {:?}",
                    sig.olen,
                    ip.options.len(),
                    ip.options
                );

                if sig.olen == 0 {
                    trace!("strip {} bytes of IP options", ip.options.len());

                    ip.options.clear();
                }
            }
        }

        let resolved = Resolved::new(sig);

        {
            let tcp = packet.tcp_mut()?;

            tcp.window = resolved.window;
            tcp.options = options::build(&sig.olayout, &tcp.options, &resolved)?;
        }

        for &quirk in Quirk::ALL.iter() {
            quirk.apply(packet, sig.has_quirk(quirk), &mut self.entropy.fast)?;
        }

        let tcp = packet.tcp.as_mut().ok_or(Error::MissingLayer(Layer::Tcp))?;

        match sig.pclass {
            PayloadSize::Any => {}
            PayloadSize::Zero => tcp.payload.clear(),
            PayloadSize::NonZero if tcp.payload.is_empty() => {
                let secure = &mut self.entropy.secure;
                let mut payload = vec![0; secure.gen_range(1..=MAX_SYNTHETIC_PAYLOAD)];

                secure.fill_bytes(&mut payload);
                tcp.payload = payload;
            }
            PayloadSize::NonZero => {}
        }

        packet.serialize()
    }
}
