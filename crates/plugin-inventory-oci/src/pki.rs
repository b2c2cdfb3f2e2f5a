use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use k256::ecdsa::{signature::Verifier, Signature, VerifyingKey};

use plugin_inventory_types::{Error, Result};

/// Verifies inventory image signatures against a configured verifying key.
///
/// Adapted from the registry's own upload-signature verifier: the same
/// ECDSA-over-`k256` scheme and hex-encoded DER signature format, applied
/// here to a pulled inventory image's manifest bytes instead of an
/// uploaded plugin binary.
#[derive(Clone)]
pub struct SignatureVerifier {
    verifying_key: VerifyingKey,
    /// Image URIs that suppress verification failures, e.g. for offline
    /// mirrors or test fixtures (`PLUGIN_INVENTORY_SIGNATURE_SKIP` env var).
    skip_list: HashSet<String>,
}

impl SignatureVerifier {
    pub fn new<P: AsRef<Path>>(public_key_file: P, skip_list: HashSet<String>) -> Result<Self> {
        let verifying_key_pem = fs::read_to_string(public_key_file)?;
        let verifying_key = VerifyingKey::from_str(&verifying_key_pem)
            .map_err(|e| Error::Parse(format!("invalid verifying key: {e}")))?;
        Ok(Self {
            verifying_key,
            skip_list,
        })
    }

    /// Verifies `bytes` against `signature` (hex-encoded DER), if one was
    /// published. `signature` is `None` when the registry has no signature
    /// for this image at all, which is treated as a verification failure —
    /// verification is always attempted, never skipped for lack of a
    /// signature. If `image_uri` is in the skip list, a verification
    /// failure of either kind is swallowed and treated as success — used
    /// in testing and for offline mirrors.
    pub fn verify(&self, image_uri: &str, bytes: &[u8], signature: Option<&str>) -> Result<()> {
        let result = match signature {
            Some(signature) => self.verify_strict(bytes, signature),
            None => Err(Error::SignatureVerificationFailed(
                image_uri.to_string(),
                "registry published no signature for this image".to_string(),
            )),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if self.skip_list.contains(image_uri) => {
                log::warn!(
                    "signature verification failed for `{image_uri}` but it is on the skip list: {err}"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn verify_strict(&self, bytes: &[u8], signature: &str) -> Result<()> {
        let hex = decode_hex(signature)?;
        let signature = Signature::from_der(&hex[..])
            .map_err(|e| Error::SignatureVerificationFailed(String::new(), e.to_string()))?;
        self.verifying_key
            .verify(bytes, &signature)
            .map_err(|e| Error::SignatureVerificationFailed(String::new(), e.to_string()))
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .ok_or_else(|| Error::Parse("odd-length hex signature".into()))
                .and_then(|chunk| {
                    u8::from_str_radix(chunk, 16)
                        .map_err(|e| Error::Parse(format!("invalid hex signature: {e}")))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_hex_rejects_odd_length() {
        assert!(decode_hex("abc").is_err());
    }

    #[test]
    fn decode_hex_accepts_even_length() {
        assert_eq!(decode_hex("0a0b").unwrap(), vec![0x0a, 0x0b]);
    }
}
