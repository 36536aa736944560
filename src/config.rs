use std::sync::Arc;

use crate::tcp::Signature;

/// Settings chosen once at process start.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// the OS fingerprint every rewritten SYN should match.
    pub signature: Arc<Signature>,
}

impl Default for Config {
    fn default() -> Self {
        Config::new(Signature::ios())
    }
}

impl Config {
    pub fn new(signature: Signature) -> Self {
        Config {
            signature: Arc::new(signature),
        }
    }

    /// Select the target by built-in name, or parse it as a `raw_sig`.
    ///
    /// A malformed signature is fatal, there is nothing to fall back to.
    #[cfg(feature = "parse")]
    pub fn from_fingerprint(fingerprint: &str) -> crate::errors::Result<Self> {
        let signature = match crate::db::BUILTIN.get(fingerprint.trim()) {
            Some(sig) => sig.clone(),
            None => fingerprint.parse()?,
        };

        info!("mimic `{}`", signature);

        Ok(Config::new(signature))
    }
}
