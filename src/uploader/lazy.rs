use super::Uploader;
use std::sync::{Arc, OnceLock};

/// One-shot bindable forward reference to an uploader.
///
/// The uploader logs through the batcher and the batcher uploads through the
/// uploader; this breaks the cycle by letting the batcher hold a reference
/// that is bound exactly once, after both objects exist. Until then `get`
/// returns `None` and the batcher simply keeps persisting its buffer.
#[derive(Default)]
pub struct LazyUploader {
    slot: OnceLock<Arc<dyn Uploader>>,
}

impl LazyUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics on a second call: double-binding is a startup wiring bug, not
    /// a runtime condition.
    pub fn bind(&self, uploader: Arc<dyn Uploader>) {
        if self.slot.set(uploader).is_err() {
            panic!("LazyUploader: uploader already bound");
        }
    }

    pub fn get(&self) -> Option<Arc<dyn Uploader>> {
        self.slot.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentContents, DocumentType, Priority};

    struct NullUploader;

    impl Uploader for NullUploader {
        fn save(
            &self,
            _local_uid: &str,
            _contents: DocumentContents,
            _document_type: DocumentType,
            _priority: Priority,
        ) {
        }
    }

    #[test]
    fn get_returns_none_until_bound() {
        let lazy = LazyUploader::new();
        assert!(lazy.get().is_none());
        lazy.bind(Arc::new(NullUploader));
        assert!(lazy.get().is_some());
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn double_bind_panics() {
        let lazy = LazyUploader::new();
        lazy.bind(Arc::new(NullUploader));
        lazy.bind(Arc::new(NullUploader));
    }
}
