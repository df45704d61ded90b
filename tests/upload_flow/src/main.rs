fn main() {
    println!("Run `cargo test -p upload-flow` to execute end-to-end upload tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use uplift_protocol::{PutExtra, SourceFile, UploadCredential, UploadStatus, UploaderConfig};
    use uplift_transfer::{Chunk, ChunkSink, TransferError};
    use uplift_uploader::{
        CredentialError, ProgressCallback, TokenProvider, UploadService, UploadTask,
    };

    /// Credential authority double: echoes the requested key and records
    /// every call.
    #[derive(Default)]
    struct EchoBroker {
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl EchoBroker {
        fn calls(&self) -> Vec<(String, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TokenProvider for EchoBroker {
        fn request_credential(
            &self,
            file_key: &str,
            keep_scope: bool,
        ) -> Pin<Box<dyn Future<Output = Result<UploadCredential, CredentialError>> + Send + '_>>
        {
            self.calls
                .lock()
                .unwrap()
                .push((file_key.to_string(), keep_scope));
            let credential = UploadCredential {
                token: format!("token-for-{file_key}"),
                key: file_key.to_string(),
                fname: "echo.bin".into(),
            };
            Box::pin(async move { Ok(credential) })
        }
    }

    /// Object-store double: keeps chunks per key and reports the contiguous
    /// committed prefix as the resume offset, the way a part-tracking
    /// backend does.
    #[derive(Default)]
    struct InMemoryStore {
        objects: Mutex<HashMap<String, BTreeMap<u64, Vec<u8>>>>,
        put_delay: Option<Duration>,
        fail_all: bool,
    }

    impl InMemoryStore {
        fn contiguous_prefix(chunks: &BTreeMap<u64, Vec<u8>>) -> u64 {
            let mut end = 0u64;
            for (offset, data) in chunks {
                if *offset > end {
                    break;
                }
                end = end.max(offset + data.len() as u64);
            }
            end
        }

        fn committed(&self, key: &str) -> u64 {
            let objects = self.objects.lock().unwrap();
            objects
                .get(key)
                .map(Self::contiguous_prefix)
                .unwrap_or(0)
        }

        fn assembled(&self, key: &str, size: usize) -> Vec<u8> {
            let objects = self.objects.lock().unwrap();
            let mut buffer = vec![0u8; size];
            if let Some(chunks) = objects.get(key) {
                for (offset, data) in chunks {
                    let start = *offset as usize;
                    buffer[start..start + data.len()].copy_from_slice(data);
                }
            }
            buffer
        }
    }

    impl ChunkSink for InMemoryStore {
        async fn committed_offset(&self, key: &str, _token: &str) -> Result<u64, TransferError> {
            Ok(self.committed(key))
        }

        async fn put_chunk(
            &self,
            key: &str,
            _token: &str,
            chunk: &Chunk,
            _extra: &PutExtra,
        ) -> Result<(), TransferError> {
            if let Some(delay) = self.put_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_all {
                return Err(TransferError::Sink("storage node unavailable".into()));
            }
            self.objects
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_default()
                .insert(chunk.offset, chunk.data.clone());
            Ok(())
        }

        async fn finalize(
            &self,
            key: &str,
            _token: &str,
            _extra: &PutExtra,
        ) -> Result<String, TransferError> {
            Ok(key.to_string())
        }
    }

    fn test_file(len: usize) -> SourceFile {
        let data: Vec<u8> = (0..len).map(|i| (i % 239) as u8).collect();
        SourceFile::new("payload.bin", "application/octet-stream", data)
    }

    fn config(chunk_kb: u32, limit: usize) -> UploaderConfig {
        UploaderConfig {
            cdn_domain: "https://cdn.example.com".into(),
            chunk_size: chunk_kb,
            concurrent_request_limit: limit,
            retry_count: 1,
            ..Default::default()
        }
    }

    async fn wait_for(task: &Arc<UploadTask>, status: UploadStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while task.status() != status {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "timed out waiting for {status}, task stuck in {}",
                task.status()
            )
        });
    }

    async fn wait_for_bytes(task: &Arc<UploadTask>, at_least: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while task.progress().loaded < at_least {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("timed out waiting for progress");
    }

    #[tokio::test]
    async fn end_to_end_upload_succeeds() {
        let broker = Arc::new(EchoBroker::default());
        let store = Arc::new(InMemoryStore::default());
        let service = UploadService::with_sink(
            Arc::clone(&broker) as Arc<dyn TokenProvider>,
            ArcStore(Arc::clone(&store)),
            config(16, 3),
        );

        let file = test_file(256 * 1024);
        let expected = file.data().to_vec();
        let task = service.upload(file, None, None, None).await;

        wait_for(&task, UploadStatus::Success).await;

        let key = task.key();
        assert_eq!(task.url(), Some(format!("https://cdn.example.com/{key}")));
        let progress = task.progress();
        assert_eq!(progress.loaded, 256 * 1024);
        assert_eq!(progress.percent, 100);
        assert_eq!(broker.calls(), vec![(key.clone(), false)]);
        assert_eq!(store.assembled(&key, expected.len()), expected);
    }

    #[tokio::test]
    async fn pause_then_resume_continues_from_committed_offset() {
        let broker = Arc::new(EchoBroker::default());
        let store = Arc::new(InMemoryStore {
            put_delay: Some(Duration::from_millis(10)),
            ..Default::default()
        });
        let service = UploadService::with_sink(
            Arc::clone(&broker) as Arc<dyn TokenProvider>,
            ArcStore(Arc::clone(&store)),
            config(8, 1),
        );

        let file = test_file(128 * 1024);
        let expected = file.data().to_vec();
        let task = service.upload(file, None, None, None).await;
        let original_key = task.original_key().to_string();

        // Let a few chunks land, then pause.
        wait_for_bytes(&task, 16 * 1024).await;
        assert!(service.pause(task.id()));
        assert_eq!(task.status(), UploadStatus::Paused);
        let paused_at = task.progress().loaded;
        assert!(paused_at >= 16 * 1024);

        // Resume; every accepted snapshot stays at or above the pause mark.
        let snapshots: Arc<Mutex<Vec<u64>>> = Arc::default();
        let sink_snapshots = Arc::clone(&snapshots);
        let on_progress: ProgressCallback = Arc::new(move |p| {
            sink_snapshots.lock().unwrap().push(p.loaded);
        });
        assert!(service.resume(task.id(), Some(on_progress), None).await);

        wait_for(&task, UploadStatus::Success).await;

        let calls = broker.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], (original_key.clone(), true));

        let recorded = snapshots.lock().unwrap().clone();
        assert!(!recorded.is_empty());
        assert!(recorded.iter().all(|&loaded| loaded >= paused_at));
        assert!(recorded.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(task.progress().loaded, 128 * 1024);
        assert_eq!(
            store.assembled(&original_key, expected.len()),
            expected
        );
        assert_eq!(
            task.url(),
            Some(format!("https://cdn.example.com/{original_key}"))
        );
    }

    #[tokio::test]
    async fn storage_failure_marks_task_error() {
        let broker = Arc::new(EchoBroker::default());
        let store = Arc::new(InMemoryStore {
            fail_all: true,
            ..Default::default()
        });
        let service = UploadService::with_sink(
            Arc::clone(&broker) as Arc<dyn TokenProvider>,
            ArcStore(store),
            config(8, 2),
        );

        let task = service.upload(test_file(16 * 1024), None, None, None).await;
        wait_for(&task, UploadStatus::Error).await;

        let message = task.error().expect("error message");
        assert!(message.contains("attempts"), "unexpected error: {message}");
        assert_eq!(task.url(), None);
    }

    #[tokio::test]
    async fn cancel_mid_transfer_freezes_the_task() {
        let broker = Arc::new(EchoBroker::default());
        let store = Arc::new(InMemoryStore {
            put_delay: Some(Duration::from_millis(10)),
            ..Default::default()
        });
        let service = UploadService::with_sink(
            Arc::clone(&broker) as Arc<dyn TokenProvider>,
            ArcStore(store),
            config(8, 2),
        );

        let task = service.upload(test_file(128 * 1024), None, None, None).await;
        assert!(service.cancel(task.id()));
        assert_eq!(task.status(), UploadStatus::Cancelled);
        let frozen = task.progress();

        // Nothing from the revoked transfer lands afterwards.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(task.status(), UploadStatus::Cancelled);
        assert_eq!(task.progress(), frozen);
    }

    /// Newtype so a shared store can be handed to `with_sink`, which takes
    /// the sink by value.
    struct ArcStore(Arc<InMemoryStore>);

    impl ChunkSink for ArcStore {
        async fn committed_offset(&self, key: &str, token: &str) -> Result<u64, TransferError> {
            self.0.committed_offset(key, token).await
        }

        async fn put_chunk(
            &self,
            key: &str,
            token: &str,
            chunk: &Chunk,
            extra: &PutExtra,
        ) -> Result<(), TransferError> {
            self.0.put_chunk(key, token, chunk, extra).await
        }

        async fn finalize(
            &self,
            key: &str,
            token: &str,
            extra: &PutExtra,
        ) -> Result<String, TransferError> {
            self.0.finalize(key, token, extra).await
        }
    }
}
