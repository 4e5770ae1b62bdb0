use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// A captured page held as bytes, base64, or both.
///
/// Whichever representation is missing is derived on first use and kept, so
/// callers never have to reconcile the two themselves.
#[derive(Debug, Clone)]
pub(crate) struct ImageRef {
    inner: Arc<ImageRefInner>,
}

#[derive(Debug)]
struct ImageRefInner {
    bytes: OnceLock<Vec<u8>>,
    base64: OnceLock<String>,
}

impl ImageRef {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        let inner = ImageRefInner { bytes: OnceLock::new(), base64: OnceLock::new() };
        let _ = inner.bytes.set(bytes);
        Self { inner: Arc::new(inner) }
    }

    /// Accepts plain base64 or a `data:<mime>;base64,` URL.
    pub(crate) fn from_base64(encoded: &str) -> Self {
        let payload = match encoded.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => encoded,
        };
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

        let inner = ImageRefInner { bytes: OnceLock::new(), base64: OnceLock::new() };
        let _ = inner.base64.set(cleaned);
        Self { inner: Arc::new(inner) }
    }

    pub(crate) fn to_bytes(&self) -> Result<&[u8]> {
        if let Some(bytes) = self.inner.bytes.get() {
            return Ok(bytes.as_slice());
        }

        let encoded = self.inner.base64.get().map(String::as_str).unwrap_or_default();
        let decoded = STANDARD.decode(encoded).context("Image payload is not valid base64")?;
        Ok(self.inner.bytes.get_or_init(|| decoded).as_slice())
    }

    pub(crate) fn to_base64(&self) -> &str {
        self.inner.base64.get_or_init(|| {
            self.inner.bytes.get().map(|bytes| STANDARD.encode(bytes)).unwrap_or_default()
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self.inner.bytes.get() {
            Some(bytes) => bytes.is_empty(),
            None => self.inner.base64.get().map(String::is_empty).unwrap_or(true),
        }
    }

    pub(crate) fn sha256_hex(&self) -> Result<String> {
        Ok(hex::encode(Sha256::digest(self.to_bytes()?)))
    }

    pub(crate) fn byte_len(&self) -> Result<usize> {
        Ok(self.to_bytes()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::ImageRef;

    #[test]
    fn bytes_and_base64_convert_both_ways() {
        let from_bytes = ImageRef::from_bytes(b"page".to_vec());
        assert_eq!(from_bytes.to_base64(), "cGFnZQ==");

        let from_base64 = ImageRef::from_base64("cGFnZQ==");
        assert_eq!(from_base64.to_bytes().expect("decode"), b"page");
        assert_eq!(from_base64.to_base64(), "cGFnZQ==");
    }

    #[test]
    fn data_url_prefix_and_whitespace_are_stripped() {
        let image = ImageRef::from_base64("data:image/jpeg;base64,cGFn\nZQ==");
        assert_eq!(image.to_bytes().expect("decode"), b"page");
        assert_eq!(image.to_base64(), "cGFnZQ==");
    }

    #[test]
    fn invalid_base64_fails_to_decode() {
        let image = ImageRef::from_base64("***");
        assert!(image.to_bytes().is_err());
        assert!(!image.is_empty());
    }

    #[test]
    fn fingerprint_is_sha256_of_bytes() {
        let image = ImageRef::from_bytes(b"abc".to_vec());
        assert_eq!(
            image.sha256_hex().expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_payloads_are_detected() {
        assert!(ImageRef::from_bytes(Vec::new()).is_empty());
        assert!(ImageRef::from_base64("").is_empty());
    }
}
