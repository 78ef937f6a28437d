//! NFC reader collaborator
//!
//! The transceiver is an exclusive resource. A [`TagSession`] owns it for
//! exactly one read attempt and ends the session when dropped, on every exit
//! path.

use async_trait::async_trait;

use crate::error::NfcError;

/// Platform NFC transceiver
#[async_trait]
pub trait TagReader: Send + Sync {
    /// Acquire exclusive access to the transceiver.
    async fn begin_session(&self) -> Result<(), NfcError>;

    /// Wait for one tag and return its record payload.
    async fn read_tag(&self) -> Result<Vec<u8>, NfcError>;

    /// Release the transceiver. Must be safe to call after a failed read.
    fn end_session(&self);
}

/// Scoped reader session
pub struct TagSession<'a> {
    reader: &'a dyn TagReader,
}

impl<'a> TagSession<'a> {
    /// Begin a session. Nothing is held if this fails.
    pub async fn begin(reader: &'a dyn TagReader) -> Result<TagSession<'a>, NfcError> {
        reader.begin_session().await?;
        tracing::debug!("NFC session started");
        Ok(Self { reader })
    }

    pub async fn read(&self) -> Result<Vec<u8>, NfcError> {
        self.reader.read_tag().await
    }
}

impl Drop for TagSession<'_> {
    fn drop(&mut self) {
        self.reader.end_session();
        tracing::debug!("NFC session ended");
    }
}
