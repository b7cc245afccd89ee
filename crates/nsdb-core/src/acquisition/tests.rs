//! Acquisition tests with in-process fakes for the network and 7z.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const INDEX: &str = r#"<a href="/enwiki/20200401/enwiki-20200401-pages-meta-history1.xml-p1p10.7z">1</a>
<a href="/enwiki/20200401/enwiki-20200401-pages-meta-history1.xml-p11p20.7z">2</a>
<a href="/enwiki/20200401/enwiki-20200401-pages-meta-history1.xml-p21p30.7z">3</a>"#;

#[derive(Default)]
struct FakeTransport {
    index: String,
    text_calls: AtomicUsize,
    downloads: Mutex<Vec<String>>,
    fail_downloads: bool,
}

impl Transport for FakeTransport {
    fn get_text(&self, _url: &str) -> Result<String> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.index.clone())
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        if self.fail_downloads {
            anyhow::bail!("connection reset");
        }
        self.downloads.lock().unwrap().push(url.to_string());
        std::fs::create_dir_all(dest.parent().unwrap())?;
        std::fs::write(dest, b"7z-bytes")?;
        Ok(())
    }
}

/// "Extracts" by writing the archive name minus `.7z` into the output dir.
#[derive(Default)]
struct FakeExtractor {
    calls: AtomicUsize,
    produce: bool,
}

impl Extractor for FakeExtractor {
    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.produce {
            let name = archive.file_name().unwrap().to_string_lossy();
            std::fs::create_dir_all(out_dir)?;
            std::fs::write(
                out_dir.join(name.trim_end_matches(".7z")),
                "<mediawiki>\n</mediawiki>\n",
            )?;
        }
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    cfg: NsdbConfig,
    transport: Arc<FakeTransport>,
    extractor: Arc<FakeExtractor>,
    ctl: AcquisitionController,
}

fn fixture(transport: FakeTransport, extractor: FakeExtractor) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = NsdbConfig::default();
    cfg.data_dir = dir.path().join("data");
    cfg.manifest_path = Some(dir.path().join("dumps.txt"));
    cfg.mirror_url = "https://mirror.example.org/".to_string();
    let transport = Arc::new(transport);
    let extractor = Arc::new(extractor);
    let ctl = AcquisitionController::new(
        &cfg,
        Arc::new(FixedMirror::new(cfg.mirror_url.clone())),
        transport.clone(),
        extractor.clone(),
    );
    Fixture {
        _dir: dir,
        cfg,
        transport,
        extractor,
        ctl,
    }
}

fn default_fixture() -> Fixture {
    fixture(
        FakeTransport {
            index: INDEX.to_string(),
            ..FakeTransport::default()
        },
        FakeExtractor {
            produce: true,
            ..FakeExtractor::default()
        },
    )
}

#[tokio::test]
async fn ensure_manifest_fetches_once() {
    let fx = default_fixture();
    fx.ctl.ensure_manifest().await.unwrap();
    assert_eq!(fx.ctl.manifest().len().unwrap(), 3);
    fx.ctl.ensure_manifest().await.unwrap();
    assert_eq!(fx.transport.text_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_index_fails_loudly() {
    let fx = fixture(FakeTransport::default(), FakeExtractor::default());
    let err = fx.ctl.ensure_manifest().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AcquireError>(),
        Some(AcquireError::EmptyIndex { .. })
    ));
    assert!(!fx.ctl.manifest().exists());
}

#[tokio::test]
async fn download_then_extract_consumes_head() {
    let fx = default_fixture();
    fx.ctl.ensure_manifest().await.unwrap();

    let archive = fx.ctl.download_next().await.unwrap().unwrap();
    assert_eq!(archive, "enwiki-20200401-pages-meta-history1.xml-p1p10.7z");
    assert_eq!(fx.ctl.manifest().len().unwrap(), 2);
    assert_eq!(
        fx.transport.downloads.lock().unwrap().as_slice(),
        ["https://mirror.example.org/enwiki/20200401/enwiki-20200401-pages-meta-history1.xml-p1p10.7z"]
    );
    assert!(fx.cfg.archives_dir().join(&archive).exists());

    let dump = fx.ctl.extract(&archive).await.unwrap();
    assert_eq!(dump, "enwiki-20200401-pages-meta-history1.xml-p1p10");
    assert!(fx.cfg.dumps_dir().join(&dump).exists());
    assert!(!fx.cfg.archives_dir().join(&archive).exists());
    assert_eq!(fx.ctl.local_dumps(), 1);
}

#[tokio::test]
async fn repeated_acquisition_of_same_head_transfers_nothing() {
    let fx = default_fixture();
    fx.ctl.ensure_manifest().await.unwrap();
    let entries = fx.ctl.manifest().entries().unwrap();

    let archive = fx.ctl.download_next().await.unwrap().unwrap();
    fx.ctl.extract(&archive).await.unwrap();

    // Put the same head back and acquire it again.
    fx.ctl.manifest().write_all(&entries).unwrap();
    let again = fx.ctl.download_next().await.unwrap().unwrap();
    assert_eq!(again, archive);
    fx.ctl.extract(&again).await.unwrap();

    assert_eq!(fx.transport.downloads.lock().unwrap().len(), 1);
    assert_eq!(fx.extractor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_manifest_yields_none() {
    let fx = default_fixture();
    fx.ctl.manifest().write_all(&[]).unwrap();
    assert!(fx.ctl.download_next().await.unwrap().is_none());
}

#[tokio::test]
async fn download_failure_propagates_after_pop() {
    let fx = fixture(
        FakeTransport {
            index: INDEX.to_string(),
            fail_downloads: true,
            ..FakeTransport::default()
        },
        FakeExtractor::default(),
    );
    fx.ctl.ensure_manifest().await.unwrap();
    let err = fx.ctl.download_next().await.unwrap_err();
    assert!(format!("{:#}", err).contains("connection reset"));
    assert_eq!(fx.ctl.manifest().len().unwrap(), 2);
}

#[tokio::test]
async fn extractor_without_output_is_an_error() {
    let fx = fixture(
        FakeTransport {
            index: INDEX.to_string(),
            ..FakeTransport::default()
        },
        FakeExtractor::default(),
    );
    fx.ctl.ensure_manifest().await.unwrap();
    let archive = fx.ctl.download_next().await.unwrap().unwrap();
    let err = fx.ctl.extract(&archive).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AcquireError>(),
        Some(AcquireError::MissingOutput(_))
    ));
}

#[test]
fn decompressed_name_strips_suffix_only() {
    let fx = default_fixture();
    assert_eq!(fx.ctl.decompressed_name("a.xml-p1p2.7z"), "a.xml-p1p2");
    assert_eq!(fx.ctl.decompressed_name("a.xml.bz2"), "a.xml.bz2");
}
