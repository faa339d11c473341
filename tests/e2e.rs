//! End-to-end integration tests for receiptflow.
//!
//! These drive the full capture workflow — image selection, the
//! four-stage pipeline, review edits, commit — against scripted gateways
//! and the in-memory stores. No network, no credentials: the gateways
//! return exactly the kind of text a real OCR/structuring call produces,
//! including the malformed variants, and the assertions pin down the
//! state-machine and repair behaviour the rest of the application relies
//! on.

use receiptflow::{
    CaptureError, CaptureProgress, CaptureSession, CaptureState, CaptureStep, Category, DataStore,
    DateRange, ImageSource, LineItem, MemoryBlobStore, MemoryDataStore, NewReceipt, OcrGateway,
    ReceiptPatch, StructuringGateway,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A tiny but valid PNG header; enough for the input-validation sniff.
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

fn png() -> ImageSource {
    ImageSource::new(PNG_MAGIC.to_vec(), "receipt.png", "image/png")
}

/// Scripted OCR gateway: returns a fixed text, counts invocations.
struct ScriptedOcr {
    text: String,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OcrGateway for ScriptedOcr {
    async fn extract_text(&self, image: &ImageSource) -> Result<String, CaptureError> {
        if image.bytes.is_empty() {
            return Err(CaptureError::MissingImage);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Scripted structuring gateway with the production input guard: empty OCR
/// text is rejected before any "call" happens.
struct ScriptedStructurer {
    response: String,
    calls: AtomicUsize,
}

impl ScriptedStructurer {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl StructuringGateway for ScriptedStructurer {
    async fn extract(&self, ocr_text: &str) -> Result<String, CaptureError> {
        if ocr_text.trim().is_empty() {
            return Err(CaptureError::MissingOcrText);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Progress recorder: the ordered event log of one capture run.
#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    fn log(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl CaptureProgress for RecordingProgress {
    fn on_capture_start(&self, total_steps: usize) {
        self.events.lock().unwrap().push(format!("start({total_steps})"));
    }
    fn on_step_start(&self, step: CaptureStep) {
        self.events.lock().unwrap().push(format!("begin:{step}"));
    }
    fn on_step_complete(&self, step: CaptureStep) {
        self.events.lock().unwrap().push(format!("done:{step}"));
    }
    fn on_step_error(&self, step: CaptureStep, _error: &str) {
        self.events.lock().unwrap().push(format!("fail:{step}"));
    }
    fn on_capture_complete(&self, success: bool) {
        self.events.lock().unwrap().push(format!("complete({success})"));
    }
}

struct Harness {
    session: CaptureSession,
    data: Arc<MemoryDataStore>,
    blob: Arc<MemoryBlobStore>,
    structurer: Arc<ScriptedStructurer>,
    progress: Arc<RecordingProgress>,
}

fn harness(ocr_text: &str, structured: &str) -> Harness {
    let data = Arc::new(MemoryDataStore::new());
    let blob = Arc::new(MemoryBlobStore::new());
    let structurer = ScriptedStructurer::new(structured);
    let progress = Arc::new(RecordingProgress::default());

    let session = CaptureSession::new(
        "u1",
        ScriptedOcr::new(ocr_text),
        structurer.clone(),
        data.clone(),
        blob.clone(),
    )
    .with_progress(progress.clone());

    Harness {
        session,
        data,
        blob,
        structurer,
        progress,
    }
}

// ── Scan path ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fenced_extraction_prefills_review() {
    let mut h = harness(
        "CAFE X\nTOTAL 42.000",
        "```json\n{\"merchant_name\":\"Cafe X\",\"total_amount\":42000}\n```",
    );

    h.session.select_image(png()).unwrap();
    h.session.process().await.unwrap();

    assert_eq!(h.session.state(), CaptureState::Review);
    let draft = h.session.draft();
    assert_eq!(draft.merchant_name, "Cafe X");
    assert_eq!(draft.total_amount, Some(42000.0));
    assert_eq!(draft.date, "");
    assert_eq!(draft.category, Category::Others);
    assert!(draft.line_items.is_empty());

    // the raw response is retained verbatim for the audit view
    assert!(draft.raw_extraction.starts_with("```json"));

    // image went to the blob store under a millis_filename object name
    let names = h.blob.object_names();
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with("_receipt.png"), "got: {}", names[0]);
    assert_eq!(
        draft.image_url.as_deref(),
        Some(format!("memory://receipts/{}", names[0]).as_str())
    );
}

#[tokio::test]
async fn full_scan_commits_edited_row() {
    let mut h = harness(
        "KOPI KENANGAN\n2x KOPI SUSU 15.000\nTOTAL 30.000",
        r#"{"merchant_name":"Kopi Kenangan","date":"2024/01/05","total_amount":30000,
            "line_items":[{"name":"Kopi Susu","price":15000,"quantity":2}],"category":"Food"}"#,
    );

    h.session.select_image(png()).unwrap();
    h.session.process().await.unwrap();

    // date got renormalised during parsing
    assert_eq!(h.session.draft().date, "2024-01-05");

    // the user tweaks the total in review
    h.session.draft_mut().unwrap().total_amount = Some(31000.0);
    let saved = h.session.save().await.unwrap();

    assert_eq!(h.session.state(), CaptureState::Success);
    assert_eq!(saved.merchant_name, "Kopi Kenangan");
    assert_eq!(saved.total_amount, Some(31000.0));
    assert_eq!(saved.category, Category::Food);
    assert_eq!(saved.line_items, vec![LineItem::new("Kopi Susu", 15000.0, 2.0)]);
    assert_eq!(saved.content, "KOPI KENANGAN\n2x KOPI SUSU 15.000\nTOTAL 30.000");

    // exactly one row landed in the store
    let rows = h.data.list_receipts("u1", None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, saved.id);
}

#[tokio::test]
async fn empty_ocr_rejects_before_structuring_and_returns_to_upload() {
    let mut h = harness("", "{\"merchant_name\":\"never\"}");

    h.session.select_image(png()).unwrap();
    let err = h.session.process().await.unwrap_err();

    assert!(matches!(err, CaptureError::MissingOcrText));
    assert_eq!(h.session.state(), CaptureState::Upload);
    // the structuring gateway was never actually invoked
    assert_eq!(h.structurer.calls.load(Ordering::SeqCst), 0);
    // nothing persisted
    assert!(h.data.list_receipts("u1", None).await.unwrap().is_empty());

    // the progress log shows the structuring step failing, then the run ending
    let log = h.progress.log();
    assert!(log.contains(&"fail:Extracting Data".to_string()), "log: {log:?}");
    assert_eq!(log.last().unwrap(), "complete(false)");
}

#[tokio::test]
async fn unusable_extraction_still_reaches_review_with_defaults() {
    let mut h = harness("SOME TEXT", "I'm sorry, I can't read this receipt.");

    h.session.select_image(png()).unwrap();
    h.session.process().await.unwrap();

    assert_eq!(h.session.state(), CaptureState::Review);
    let draft = h.session.draft();
    assert_eq!(draft.merchant_name, "");
    assert_eq!(draft.total_amount, None);
    assert_eq!(draft.category, Category::Others);
    assert!(draft.line_items.is_empty());

    // progress reports a fully successful run — repair is not a failure
    let log = h.progress.log();
    assert_eq!(log.last().unwrap(), "complete(true)");
    assert!(log.contains(&"done:Categorizing".to_string()));
}

#[tokio::test]
async fn upload_failure_aborts_with_nothing_persisted() {
    let h = harness("TEXT", "{}");
    h.blob.fail_with("bucket quota exceeded");
    let mut session = h.session;

    session.select_image(png()).unwrap();
    let err = session.process().await.unwrap_err();

    assert!(matches!(err, CaptureError::UploadFailed { .. }));
    assert!(err.to_string().contains("bucket quota exceeded"));
    assert_eq!(session.state(), CaptureState::Upload);
    assert!(session.draft().image_url.is_none());
    assert!(h.data.list_receipts("u1", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn store_failure_on_save_is_retryable() {
    let mut h = harness("TEXT", "{\"merchant_name\":\"Cafe X\",\"total_amount\":1000}");

    h.session.select_image(png()).unwrap();
    h.session.process().await.unwrap();

    h.data.fail_with("row level security violation");
    let err = h.session.save().await.unwrap_err();
    assert!(err.to_string().contains("row level security violation"));
    // still in Review: the same save can simply be retried
    assert_eq!(h.session.state(), CaptureState::Review);

    h.data.heal();
    let saved = h.session.save().await.unwrap();
    assert_eq!(saved.merchant_name, "Cafe X");
    assert_eq!(h.session.state(), CaptureState::Success);
}

#[tokio::test]
async fn scan_another_resets_for_a_fresh_capture() {
    let mut h = harness("TEXT", "{\"merchant_name\":\"Cafe X\"}");

    h.session.select_image(png()).unwrap();
    h.session.process().await.unwrap();
    h.session.save().await.unwrap();
    h.session.reset().unwrap();

    assert_eq!(h.session.state(), CaptureState::Upload);
    assert!(h.session.draft().image.is_none());

    // the session is immediately usable for a second capture
    h.session.select_image(png()).unwrap();
    h.session.process().await.unwrap();
    h.session.save().await.unwrap();
    assert_eq!(h.data.list_receipts("u1", None).await.unwrap().len(), 2);
}

// ── Manual path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn manual_entry_computes_total_from_line_items() {
    let mut h = harness("unused", "unused");

    h.session.begin_manual().unwrap();
    {
        let draft = h.session.draft_mut().unwrap();
        draft.merchant_name = "Corner Deli".into();
        draft.date = "2024-01-05".into();
        draft.category = Category::Food;
        // a stale total on the draft must be ignored
        draft.total_amount = Some(99999.0);
        draft.line_items = vec![
            LineItem::new("Coffee", 15000.0, 2.0),
            LineItem::new("Bagel", 20000.0, 1.0),
        ];
    }

    let saved = h.session.save().await.unwrap();
    assert_eq!(saved.total_amount, Some(50000.0));
    assert_eq!(saved.image_url, None);
    assert_eq!(saved.content, "");
    // no gateway was ever touched
    assert_eq!(h.structurer.calls.load(Ordering::SeqCst), 0);
    assert!(h.blob.object_names().is_empty());
}

#[tokio::test]
async fn manual_entry_with_partial_items_treats_missing_as_zero() {
    let mut h = harness("unused", "unused");

    h.session.begin_manual().unwrap();
    h.session.draft_mut().unwrap().line_items = vec![
        LineItem::new("Sticker", 5000.0, 0.0), // qty 0 contributes nothing
        LineItem::new("Pen", 3000.0, 2.0),
    ];

    let saved = h.session.save().await.unwrap();
    assert_eq!(saved.total_amount, Some(6000.0));
}

// ── Listing, editing, budgets ────────────────────────────────────────────────

fn row(user: &str, merchant: &str, total: f64, category: Category) -> NewReceipt {
    NewReceipt {
        user_id: user.into(),
        image_url: None,
        content: String::new(),
        merchant_name: merchant.into(),
        date: String::new(),
        total_amount: Some(total),
        line_items: Vec::new(),
        category,
        notes: String::new(),
    }
}

#[tokio::test]
async fn listing_filters_by_range_and_orders_newest_first() {
    let store = MemoryDataStore::new();
    store.insert_receipt(&row("u1", "First", 1.0, Category::Food)).await.unwrap();
    store.insert_receipt(&row("u1", "Second", 2.0, Category::Food)).await.unwrap();

    let rows = store.list_receipts("u1", None).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].created_at >= rows[1].created_at);

    // a range ending yesterday excludes rows created now
    let yesterday = (chrono::Utc::now() - chrono::Duration::days(1)).date_naive();
    let range = DateRange::new(None, Some(yesterday));
    assert!(store.list_receipts("u1", Some(&range)).await.unwrap().is_empty());

    // a range ending today includes them (end bound is end-of-day inclusive)
    let today = chrono::Utc::now().date_naive();
    let range = DateRange::new(None, Some(today));
    assert_eq!(store.list_receipts("u1", Some(&range)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn each_field_is_independently_editable() {
    let store = MemoryDataStore::new();
    let saved = store.insert_receipt(&row("u1", "Cafe", 1000.0, Category::Food)).await.unwrap();

    let patched = store
        .update_receipt(
            &saved.id,
            "u1",
            &ReceiptPatch {
                notes: Some("team lunch".into()),
                ..ReceiptPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.notes, "team lunch");
    assert_eq!(patched.merchant_name, "Cafe");
    assert_eq!(patched.total_amount, Some(1000.0));

    let patched = store
        .update_receipt(
            &saved.id,
            "u1",
            &ReceiptPatch {
                category: Some(Category::Entertainment),
                ..ReceiptPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.category, Category::Entertainment);
    assert_eq!(patched.notes, "team lunch");
}

#[tokio::test]
async fn budget_upsert_holds_one_row_with_latest_amount() {
    let store = MemoryDataStore::new();

    store.upsert_budget("u1", Category::Food, 400000.0).await.unwrap();
    store.upsert_budget("u1", Category::Food, 550000.0).await.unwrap();

    let budgets = store.list_budgets("u1").await.unwrap();
    assert_eq!(budgets.len(), 1);
    assert_eq!(budgets[0].budget_amount, 550000.0);

    // another user's budget for the same category is a separate key
    store.upsert_budget("u2", Category::Food, 100.0).await.unwrap();
    assert_eq!(store.list_budgets("u1").await.unwrap().len(), 1);
    assert_eq!(store.list_budgets("u2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn budget_report_compares_spending_to_budgets() {
    let store = MemoryDataStore::new();
    store.insert_receipt(&row("u1", "Cafe", 60000.0, Category::Food)).await.unwrap();
    store.insert_receipt(&row("u1", "Warung", 20000.0, Category::Food)).await.unwrap();
    store.upsert_budget("u1", Category::Food, 50000.0).await.unwrap();

    let receipts = store.list_receipts("u1", None).await.unwrap();
    let budgets = store.list_budgets("u1").await.unwrap();
    let report = receiptflow::budget_report(&receipts, &budgets);

    let food = report.iter().find(|l| l.category == Category::Food).unwrap();
    assert_eq!(food.spent, 80000.0);
    assert_eq!(food.budget, 50000.0);
    assert!(food.is_over());
}

// ── Pure repair properties, end to end ───────────────────────────────────────

#[test]
fn normalizer_is_total_and_idempotent() {
    assert_eq!(receiptflow::clean_json(None), "{}");
    let once = receiptflow::clean_json(Some("```json\n{\"a\":1}\n```"));
    let twice = receiptflow::clean_json(Some(&once));
    assert_eq!(once, twice);
}

#[test]
fn date_repair_properties() {
    assert_eq!(receiptflow::normalize_date("2024/01/05"), "2024-01-05");
    assert_eq!(receiptflow::normalize_date("not a date"), "not a date");
}

#[test]
fn list_filter_honours_explicit_bounds() {
    let range = DateRange::new(
        Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
        Some(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
    );
    use chrono::TimeZone;
    let inside = chrono::Utc.with_ymd_and_hms(2024, 1, 31, 20, 0, 0).unwrap();
    let outside = chrono::Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    assert!(range.contains(inside));
    assert!(!range.contains(outside));
}
