//! The contract with the kernel packet queue.
//!
//! Binding to netfilter lives outside this crate; whatever implements
//! `PacketQueue` hands packets in and takes exactly one verdict back per
//! packet.

use std::sync::atomic::{AtomicBool, Ordering};

use failure::Error;
use rand::{CryptoRng, RngCore};

use crate::mimic::{Mimic, Verdict};

pub trait PacketQueue {
    /// Next packet and its queue id, `None` once the queue is closed.
    fn recv(&mut self) -> Option<(u32, Vec<u8>)>;

    fn verdict(&mut self, id: u32, verdict: Verdict) -> Result<(), Error>;
}

/// Process packets until the queue closes or `stop` is raised.
///
/// Returns the number of packets handled.
pub fn run<Q, R, C>(queue: &mut Q, mimic: &mut Mimic<R, C>, stop: &AtomicBool) -> Result<usize, Error>
where
    Q: PacketQueue,
    R: RngCore,
    C: RngCore + CryptoRng,
{
    info!("start processing packets as `{}`", mimic.signature());

    let mut handled = 0;

    while !stop.load(Ordering::Relaxed) {
        let (id, data) = match queue.recv() {
            Some(packet) => packet,
            None => break,
        };

        let verdict = mimic.process(&data);

        trace!("packet #{}: {}", id, verdict);

        queue.verdict(id, verdict)?;
        handled += 1;
    }

    info!("stop processing packets after {} packets", handled);

    Ok(handled)
}
