//! Load tests: many concurrent requests against one request service.
//!
//! Fast tests run with:  cargo test --test load_test
//! All tests (incl slow): cargo test --test load_test -- --include-ignored

use perch::interface::{
    InputField, InputInterface, InputKind, OutputField, OutputInterface, OutputKind, RequestForm,
};
use perch::jobs::JobStore;
use perch::pipeline::{AdmissionGate, FieldValue, Passthrough, Pipeline, Sample, StageError};
use perch::server::RequestService;
use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Tracks how many calls into one stage overlap.
#[derive(Default)]
struct Occupancy {
    active: AtomicUsize,
    max: AtomicUsize,
    calls: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Hold the stage open until `peers` calls are inside it at once, or
    /// until `limit` passes.
    fn wait_for_peers(&self, peers: usize, limit: Duration) {
        let deadline = Instant::now() + limit;
        while self.active.load(Ordering::SeqCst) < peers && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

fn tracked_service(occupancy: Arc<Occupancy>, slots: usize) -> Arc<RequestService> {
    let inference = move |sample: Sample| -> Result<Sample, StageError> {
        occupancy.enter();
        std::thread::sleep(Duration::from_millis(5));
        occupancy.leave();

        let id = sample.get("id").map(|v| v.to_string()).unwrap_or_default();
        Ok(Sample::new().with("out", FieldValue::Text(id)))
    };
    Arc::new(
        RequestService::new(
            Pipeline::new(Passthrough, inference, Passthrough),
            InputInterface(vec![InputField::new(InputKind::Radiobutton, "id")]),
            OutputInterface(vec![OutputField::new(OutputKind::PlainText, "out")]),
        )
        .with_inference_gate(AdmissionGate::new(slots)),
    )
}

fn form(id: usize) -> RequestForm {
    RequestForm::from([("id".to_string(), id.to_string().into_bytes())])
}

async fn run_concurrently(service: &Arc<RequestService>, requests: usize) -> Vec<String> {
    let mut handles = Vec::with_capacity(requests);
    for i in 0..requests {
        let service = Arc::clone(service);
        handles.push(tokio::spawn(async move { service.predict(form(i)).await }));
    }
    let mut outputs = Vec::with_capacity(requests);
    for handle in handles {
        let items = handle.await.unwrap();
        outputs.push(items[0].content().unwrap_or_default().to_string());
    }
    outputs
}

// ---------------------------------------------------------------------------
// Admission control under load
// ---------------------------------------------------------------------------

/// 64 simultaneous requests: inference never overlaps on a single slot.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_single_slot_never_overlaps() {
    let occupancy = Arc::new(Occupancy::default());
    let service = tracked_service(Arc::clone(&occupancy), 1);

    let outputs = run_concurrently(&service, 64).await;

    assert_eq!(occupancy.max.load(Ordering::SeqCst), 1);
    assert_eq!(occupancy.calls.load(Ordering::SeqCst), 64);
    let unique: HashSet<_> = outputs.into_iter().collect();
    assert_eq!(unique.len(), 64, "every request gets its own answer");
}

/// With three slots, overlap is bounded by three.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_counting_gate_bounds_overlap() {
    let occupancy = Arc::new(Occupancy::default());
    let service = tracked_service(Arc::clone(&occupancy), 3);

    run_concurrently(&service, 48).await;

    let max = occupancy.max.load(Ordering::SeqCst);
    assert!((1..=3).contains(&max), "max overlap was {max}");
    assert_eq!(service.inference_gate().available(), 3);
}

/// Preprocess and postprocess run side by side while inference stays
/// serialized.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_only_inference_is_serialized() {
    let pre = Arc::new(Occupancy::default());
    let inf = Arc::new(Occupancy::default());
    let post = Arc::new(Occupancy::default());

    let preprocess = {
        let pre = Arc::clone(&pre);
        move |sample: Sample| -> Result<Sample, StageError> {
            pre.enter();
            pre.wait_for_peers(2, Duration::from_secs(2));
            pre.leave();
            Ok(sample)
        }
    };
    let inference = {
        let inf = Arc::clone(&inf);
        move |sample: Sample| -> Result<Sample, StageError> {
            inf.enter();
            std::thread::sleep(Duration::from_millis(2));
            inf.leave();
            Ok(sample.with("out", FieldValue::Text("done".into())))
        }
    };
    let postprocess = {
        let post = Arc::clone(&post);
        move |sample: Sample| -> Result<Sample, StageError> {
            post.enter();
            std::thread::sleep(Duration::from_millis(20));
            post.leave();
            Ok(sample)
        }
    };

    let service = Arc::new(RequestService::new(
        Pipeline::new(preprocess, inference, postprocess),
        InputInterface(vec![InputField::new(InputKind::Radiobutton, "id")]),
        OutputInterface(vec![OutputField::new(OutputKind::PlainText, "out")]),
    ));

    let outputs = run_concurrently(&service, 16).await;

    assert!(outputs.iter().all(|o| o == "done"));
    assert_eq!(inf.max.load(Ordering::SeqCst), 1);
    assert_eq!(inf.calls.load(Ordering::SeqCst), 16);
    assert!(
        pre.max.load(Ordering::SeqCst) > 1,
        "preprocess calls must not wait for the inference slot"
    );
    assert!(
        post.max.load(Ordering::SeqCst) > 1,
        "postprocess calls must not hold the inference slot"
    );
}

// ---------------------------------------------------------------------------
// Job store under load
// ---------------------------------------------------------------------------

/// 1000 tasks mint tokens concurrently: no duplicates.
#[tokio::test]
async fn test_concurrent_minting_no_duplicates() {
    const TASKS: usize = 1000;
    let store = JobStore::new();

    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.mint() }));
    }

    let mut tokens = HashSet::with_capacity(TASKS);
    for handle in handles {
        assert!(tokens.insert(handle.await.unwrap().to_string()));
    }
    assert_eq!(store.pending_count(), TASKS);
}

/// 10K sequential requests leave no state behind in immediate mode.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // slow: 10K pipeline runs
async fn test_memory_stability_10k_requests() {
    let occupancy = Arc::new(Occupancy::default());
    let service = tracked_service(Arc::clone(&occupancy), 1);
    for i in 0..10_000 {
        let items = service.predict(form(i)).await;
        assert_eq!(items.len(), 1);
    }
    assert!(service.jobs().is_empty());
    assert_eq!(service.inference_gate().available(), 1);
}
