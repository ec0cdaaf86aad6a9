//! Shared fixtures for dispatcher tests: a recording mock transport, a
//! scriptable media inspector, and a dispatcher wired to both.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::media::{MediaCapabilities, MediaInspector, MediaProbe};
use crate::transport::{ProgressFn, Transport, UploadMetadata};
use crate::types::{ContentCategory, MessageRef, OwnerId, SourceRef, UploadHandle};

use super::Dispatcher;

/// One recorded `upload_single` call
#[derive(Clone, Debug)]
pub(crate) struct UploadRecord {
    pub(crate) handle: UploadHandle,
    pub(crate) display_name: String,
    pub(crate) category: ContentCategory,
}

/// Transport double: serves a fixture archive to every download, records
/// uploads and messages, and exposes failure/gating switches
pub(crate) struct MockTransport {
    /// Bytes written to the destination path by `download`
    pub(crate) archive_bytes: Mutex<Vec<u8>>,
    /// When set, `download` returns a transport error
    pub(crate) fail_downloads: AtomicBool,
    /// Display names whose `upload_single` fails
    pub(crate) fail_single_for: Mutex<HashSet<String>>,
    /// When set, grouped sends with more than one handle fail (exercises the
    /// per-item fallback)
    pub(crate) fail_multi_groups: AtomicBool,
    /// When set, `download` blocks until a permit is released on `gate`
    pub(crate) gated_downloads: AtomicBool,
    /// When set, `upload_single` blocks until a permit is released on `gate`
    pub(crate) gated_uploads: AtomicBool,
    /// Permit source for the gates above (starts empty)
    pub(crate) gate: tokio::sync::Semaphore,

    pub(crate) uploads: Mutex<Vec<UploadRecord>>,
    pub(crate) groups: Mutex<Vec<Vec<UploadHandle>>>,
    pub(crate) notifications: Mutex<Vec<(OwnerId, String)>>,
    pub(crate) edits: Mutex<Vec<(MessageRef, String)>>,

    next_handle: AtomicU64,
    next_message: AtomicI64,
}

impl MockTransport {
    pub(crate) fn new(archive_bytes: Vec<u8>) -> Self {
        Self {
            archive_bytes: Mutex::new(archive_bytes),
            fail_downloads: AtomicBool::new(false),
            fail_single_for: Mutex::new(HashSet::new()),
            fail_multi_groups: AtomicBool::new(false),
            gated_downloads: AtomicBool::new(false),
            gated_uploads: AtomicBool::new(false),
            gate: tokio::sync::Semaphore::new(0),
            uploads: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            next_message: AtomicI64::new(1),
        }
    }

    /// Names of all files staged so far, in call order
    pub(crate) fn uploaded_names(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.display_name.clone())
            .collect()
    }

    /// Sizes of delivered groups, in delivery order
    pub(crate) fn group_sizes(&self) -> Vec<usize> {
        self.groups.lock().unwrap().iter().map(Vec::len).collect()
    }

    /// All message texts the owner saw (notifications and edits)
    pub(crate) fn all_texts(&self) -> Vec<String> {
        let mut texts: Vec<String> = self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect();
        texts.extend(self.edits.lock().unwrap().iter().map(|(_, t)| t.clone()));
        texts
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn download(
        &self,
        _source: &SourceRef,
        dest: &Path,
        progress: ProgressFn<'_>,
    ) -> crate::Result<()> {
        if self.gated_downloads.load(Ordering::SeqCst) {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| crate::Error::Transport("gate closed".to_string()))?;
            permit.forget();
        }

        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(crate::Error::Transport("simulated download failure".to_string()));
        }

        let bytes = self.archive_bytes.lock().unwrap().clone();
        let total = bytes.len() as u64;
        progress(total / 2, total);
        tokio::fs::write(dest, bytes).await?;
        progress(total, total);
        Ok(())
    }

    async fn upload_single(
        &self,
        _path: &Path,
        metadata: &UploadMetadata,
    ) -> crate::Result<UploadHandle> {
        if self.gated_uploads.load(Ordering::SeqCst) {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| crate::Error::Transport("gate closed".to_string()))?;
            permit.forget();
        }

        if self
            .fail_single_for
            .lock()
            .unwrap()
            .contains(&metadata.display_name)
        {
            return Err(crate::Error::Transport(format!(
                "simulated upload failure for {}",
                metadata.display_name
            )));
        }

        let handle = UploadHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.uploads.lock().unwrap().push(UploadRecord {
            handle,
            display_name: metadata.display_name.clone(),
            category: metadata.category,
        });
        Ok(handle)
    }

    async fn upload_group(
        &self,
        _owner: OwnerId,
        handles: Vec<UploadHandle>,
    ) -> crate::Result<()> {
        if handles.len() > 1 && self.fail_multi_groups.load(Ordering::SeqCst) {
            return Err(crate::Error::Transport("simulated group failure".to_string()));
        }
        self.groups.lock().unwrap().push(handles);
        Ok(())
    }

    async fn notify(&self, owner: OwnerId, text: &str) -> crate::Result<MessageRef> {
        let message = MessageRef(self.next_message.fetch_add(1, Ordering::SeqCst));
        self.notifications
            .lock()
            .unwrap()
            .push((owner, text.to_string()));
        Ok(message)
    }

    async fn edit_status(&self, message: MessageRef, text: &str) -> crate::Result<()> {
        self.edits.lock().unwrap().push((message, text.to_string()));
        Ok(())
    }
}

/// Media inspector double: files whose name contains "muted" probe as
/// audio-less; mux calls are recorded
pub(crate) struct MockMediaInspector {
    pub(crate) muxed: Mutex<Vec<String>>,
}

impl MockMediaInspector {
    pub(crate) fn new() -> Self {
        Self {
            muxed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaInspector for MockMediaInspector {
    async fn probe(&self, path: &Path) -> crate::Result<MediaProbe> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(MediaProbe {
            width: 640,
            height: 480,
            duration_seconds: 12.0,
            has_audio_stream: !name.contains("muted"),
        })
    }

    async fn mux_silent_audio(&self, path: &Path) -> crate::Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.muxed.lock().unwrap().push(name);
        Ok(())
    }

    fn capabilities(&self) -> MediaCapabilities {
        MediaCapabilities {
            can_probe: true,
            can_mux: true,
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Build an in-memory ZIP fixture from (entry name, content) pairs
pub(crate) fn zip_fixture(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Build an encrypted (ZipCrypto) ZIP fixture with a single entry
pub(crate) fn encrypted_zip_fixture(name: &str, content: &[u8], password: &[u8]) -> Vec<u8> {
    use zip::unstable::write::FileOptionsExt;
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .with_deprecated_encryption(password);
        writer.start_file(name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// A small default fixture: two images, one video, one document
pub(crate) fn default_fixture() -> Vec<u8> {
    zip_fixture(&[
        ("a.jpg", b"aaaa" as &[u8]),
        ("b.jpg", b"bbbb"),
        ("clip.mp4", b"vvvv"),
        ("notes.pdf", b"dddd"),
    ])
}

pub(crate) struct TestHarness {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) transport: Arc<MockTransport>,
    pub(crate) media: Arc<MockMediaInspector>,
    pub(crate) work_dir: PathBuf,
    // Held for its Drop; the temp dir outlives the harness
    _temp_dir: tempfile::TempDir,
}

/// Create a dispatcher over mock collaborators, working in a temp dir
pub(crate) async fn create_test_dispatcher(archive_bytes: Vec<u8>) -> TestHarness {
    create_test_dispatcher_with(archive_bytes, |_| {}).await
}

/// Like [`create_test_dispatcher`] but lets the test adjust the config
pub(crate) async fn create_test_dispatcher_with(
    archive_bytes: Vec<u8>,
    configure: impl FnOnce(&mut Config),
) -> TestHarness {
    let temp_dir = tempfile::tempdir().unwrap();
    let work_dir = temp_dir.path().join("work");

    let mut config = Config::default();
    config.storage.work_dir = work_dir.clone();
    // Keep progress edits fast so tests observe them without long sleeps
    config.progress.min_edit_interval = Duration::from_millis(5);
    configure(&mut config);

    let transport = Arc::new(MockTransport::new(archive_bytes));
    let media = Arc::new(MockMediaInspector::new());

    let dispatcher = Dispatcher::new(config, transport.clone(), media.clone())
        .await
        .unwrap();

    TestHarness {
        dispatcher,
        transport,
        media,
        work_dir,
        _temp_dir: temp_dir,
    }
}

/// Poll until the owner is idle (terminal states reached, queue drained)
pub(crate) async fn wait_for_idle(dispatcher: &Dispatcher, owner: OwnerId) {
    let deadline = Duration::from_secs(5);
    let result = tokio::time::timeout(deadline, async {
        loop {
            if matches!(
                dispatcher.status_of(owner).await,
                crate::types::OwnerStatus::Idle
            ) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "owner {owner} did not become idle in time");
}

/// Poll until the owner's status satisfies a predicate
pub(crate) async fn wait_for_status<F>(dispatcher: &Dispatcher, owner: OwnerId, predicate: F)
where
    F: Fn(&crate::types::OwnerStatus) -> bool,
{
    let deadline = Duration::from_secs(5);
    let result = tokio::time::timeout(deadline, async {
        loop {
            let status = dispatcher.status_of(owner).await;
            if predicate(&status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        result.is_ok(),
        "owner {owner} never reached the expected status"
    );
}
