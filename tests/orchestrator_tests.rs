//! End-to-end orchestrator behaviour against the file-backed stores.

use async_trait::async_trait;
use seoflow::orchestrator::{
    FileStore, FinalResults, ManagerCache, Orchestrator, StateStore, WorkflowStatus,
};
use seoflow::profile::FileProfileSource;
use seoflow::registry::PhaseRegistry;
use seoflow::registry::fallback::degraded_output;
use seoflow::{PhaseHandler, PhaseId, PhaseInput, PhaseOutput, Profile};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const SUBJECT: &str = "acme";

/// Fails its phase with a fixed message.
struct Failing {
    phase: PhaseId,
    message: &'static str,
}

#[async_trait]
impl PhaseHandler for Failing {
    fn phase(&self) -> PhaseId {
        self.phase
    }

    async fn execute(&self, _input: PhaseInput) -> PhaseOutput {
        PhaseOutput::failure(self.phase, self.message)
    }
}

/// Records every input it sees, then answers like the degraded phase.
struct Recording {
    phase: PhaseId,
    seen: Mutex<Vec<PhaseInput>>,
}

impl Recording {
    fn new(phase: PhaseId) -> Arc<Self> {
        Arc::new(Self {
            phase,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn inputs(&self) -> Vec<PhaseInput> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhaseHandler for Recording {
    fn phase(&self) -> PhaseId {
        self.phase
    }

    async fn execute(&self, input: PhaseInput) -> PhaseOutput {
        self.seen.lock().unwrap().push(input.clone());
        degraded_output(self.phase, &input)
    }
}

struct Harness {
    dir: TempDir,
    store: Arc<FileStore>,
    profiles: Arc<FileProfileSource>,
}

impl Harness {
    async fn onboarded() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::under(dir.path()));
        let profiles = Arc::new(FileProfileSource::new(dir.path().join("profiles")));

        let mut profile = Profile::new();
        profile.insert("business_name".into(), json!("Acme Plumbing"));
        profile.insert("website_url".into(), json!("https://acme.example"));
        profiles.save_profile(SUBJECT, &profile).await.unwrap();
        profiles
            .save_selected_keywords(
                SUBJECT,
                &["emergency plumber".into(), "drain cleaning".into(), "boiler repair".into()],
            )
            .await
            .unwrap();

        Self {
            dir,
            store,
            profiles,
        }
    }

    /// A fresh orchestrator with its own manager cache, as a new process would have.
    fn orchestrator(&self, registry: PhaseRegistry) -> Orchestrator {
        let managers = Arc::new(ManagerCache::new(
            self.store.clone(),
            4,
            Duration::from_secs(60),
        ));
        Orchestrator::new(
            SUBJECT,
            Arc::new(registry),
            self.profiles.clone(),
            self.store.clone(),
            managers,
        )
    }

    fn failing_at(&self, phase: PhaseId, message: &'static str) -> Orchestrator {
        self.orchestrator(
            PhaseRegistry::with_builtin().with_handler(Arc::new(Failing { phase, message })),
        )
    }

    fn healthy(&self) -> Orchestrator {
        self.orchestrator(PhaseRegistry::with_builtin())
    }
}

#[tokio::test]
async fn test_failed_phase_halts_run_and_writes_report() {
    let h = Harness::onboarded().await;
    let results = h
        .failing_at(PhaseId::Competitors, "quota exceeded")
        .run_complete_workflow()
        .await;

    assert_eq!(results.status(), WorkflowStatus::Failed);
    assert_eq!(
        results.error.as_deref(),
        Some("quota exceeded at phase5_competitors")
    );
    assert_eq!(results.failed_phase(), Some(PhaseId::Competitors));
    assert_eq!(
        results.workflow_summary.completed_phases,
        PhaseId::ALL[..4].to_vec()
    );
    assert!(!results.phase_outputs.contains_key(&PhaseId::Competitors));

    let reports = h.store.list_reports(SUBJECT).unwrap();
    assert_eq!(reports.len(), 1);
    let report = h.store.load_report(&reports[0]).unwrap();
    assert_eq!(
        report.error.as_deref(),
        Some("quota exceeded at phase5_competitors")
    );
}

#[tokio::test]
async fn test_failure_stops_later_phases_from_running() {
    let h = Harness::onboarded().await;
    let competitors = Recording::new(PhaseId::Competitors);
    let registry = PhaseRegistry::with_builtin()
        .with_handler(Arc::new(Failing {
            phase: PhaseId::Market,
            message: "api down",
        }))
        .with_handler(competitors.clone());

    let results = h.orchestrator(registry).run_complete_workflow().await;
    assert_eq!(results.error.as_deref(), Some("api down at phase2_market"));
    assert_eq!(results.workflow_summary.completed_phases, vec![PhaseId::Tuning]);
    assert!(competitors.inputs().is_empty());
}

#[tokio::test]
async fn test_resume_after_failure_keeps_completed_outputs() {
    let h = Harness::onboarded().await;
    let failed = h
        .failing_at(PhaseId::Competitors, "quota exceeded")
        .run_complete_workflow()
        .await;
    assert_eq!(failed.status(), WorkflowStatus::Failed);

    let resumed = h.healthy().resume_workflow().await;
    assert!(resumed.is_success(), "{:?}", resumed.error_message());
    assert_eq!(resumed.phase_outputs.len(), PhaseId::COUNT);
    assert!(resumed.error.is_none());
    assert!(resumed.failed_output.is_none());
    assert_eq!(
        resumed.workflow_summary.run_id,
        failed.workflow_summary.run_id
    );
    for phase in &PhaseId::ALL[..4] {
        assert_eq!(resumed.phase_outputs[phase], failed.phase_outputs[phase]);
    }
    assert_eq!(h.store.list_reports(SUBJECT).unwrap().len(), 2);
}

#[tokio::test]
async fn test_resume_runs_only_the_remaining_phases() {
    let h = Harness::onboarded().await;
    h.failing_at(PhaseId::GapClassification, "classifier offline")
        .run_complete_workflow()
        .await;

    let recorders: Vec<Arc<Recording>> =
        PhaseId::ALL.iter().map(|&p| Recording::new(p)).collect();
    let registry = recorders
        .iter()
        .fold(PhaseRegistry::new(), |r, rec| r.with_handler(rec.clone()));

    let resumed = h.orchestrator(registry).resume_workflow().await;
    assert!(resumed.is_success(), "{:?}", resumed.error_message());

    let invoked: Vec<PhaseId> = recorders
        .iter()
        .flat_map(|rec| rec.inputs().into_iter().map(move |_| rec.phase))
        .collect();
    assert_eq!(invoked, vec![PhaseId::GapClassification, PhaseId::Competitors]);
}

#[tokio::test]
async fn test_progress_never_decreases_across_requests() {
    let h = Harness::onboarded().await;
    let mut progress = Vec::new();

    let r = h
        .failing_at(PhaseId::RealityCheck, "gsc unavailable")
        .run_complete_workflow()
        .await;
    progress.push(r.workflow_summary.progress_percentage);

    let r = h.healthy().run_single_phase(PhaseId::RealityCheck).await;
    assert_eq!(r.status(), WorkflowStatus::Running);
    progress.push(r.workflow_summary.progress_percentage);

    let r = h.healthy().run_single_phase(PhaseId::GapClassification).await;
    progress.push(r.workflow_summary.progress_percentage);

    let r = h.healthy().resume_workflow().await;
    progress.push(r.workflow_summary.progress_percentage);

    assert_eq!(progress, vec![40.0, 60.0, 80.0, 100.0]);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_persisted_state_round_trips_to_same_results() {
    let h = Harness::onboarded().await;
    let results = h.healthy().run_complete_workflow().await;
    assert!(results.is_success());

    let loaded = h.store.load_state(SUBJECT).unwrap();
    assert_eq!(FinalResults::of(&loaded), results);
    assert!(h.store.state_path(SUBJECT).starts_with(h.dir.path()));
}

#[tokio::test]
async fn test_phases_see_only_predecessor_outputs() {
    let h = Harness::onboarded().await;
    let market = Recording::new(PhaseId::Market);
    let competitors = Recording::new(PhaseId::Competitors);
    let registry = PhaseRegistry::with_builtin()
        .with_handler(market.clone())
        .with_handler(competitors.clone());

    let results = h.orchestrator(registry).run_complete_workflow().await;
    assert!(results.is_success(), "{:?}", results.error_message());

    let market_inputs = market.inputs();
    assert_eq!(market_inputs.len(), 1);
    let seen: Vec<PhaseId> = market_inputs[0].previous_outputs().keys().copied().collect();
    assert_eq!(seen, vec![PhaseId::Tuning]);

    let competitor_inputs = competitors.inputs();
    let seen: Vec<PhaseId> = competitor_inputs[0]
        .previous_outputs()
        .keys()
        .copied()
        .collect();
    assert_eq!(seen, PhaseId::ALL[..4].to_vec());
    assert_eq!(competitor_inputs[0].subject_id(), SUBJECT);
    assert_eq!(
        competitor_inputs[0].profile_str("website_url"),
        Some("https://acme.example")
    );
}

#[tokio::test]
async fn test_run_from_requires_completed_predecessors() {
    let h = Harness::onboarded().await;
    h.failing_at(PhaseId::RealityCheck, "gsc unavailable")
        .run_complete_workflow()
        .await;

    let results = h
        .healthy()
        .run_phases_from(PhaseId::GapClassification)
        .await;
    let message = results.error_message().unwrap();
    assert!(message.contains("predecessor phase3_gsc"), "{}", message);
    assert!(!results.phase_outputs.contains_key(&PhaseId::GapClassification));

    let results = h.healthy().run_phases_from(PhaseId::RealityCheck).await;
    assert!(results.is_success(), "{:?}", results.error_message());
}

#[tokio::test]
async fn test_unknown_start_phase_is_recorded_as_error() {
    let h = Harness::onboarded().await;
    let results = h.healthy().run_named_phases_from("phase9_launch").await;

    assert_eq!(results.status(), WorkflowStatus::Failed);
    assert!(
        results
            .error
            .as_deref()
            .unwrap()
            .contains("Unknown phase 'phase9_launch'")
    );
    assert!(results.phase_outputs.is_empty());
}

#[tokio::test]
async fn test_single_phase_runs_exactly_one_phase() {
    let h = Harness::onboarded().await;
    let competitors = Recording::new(PhaseId::Competitors);
    h.failing_at(PhaseId::GapClassification, "classifier offline")
        .run_complete_workflow()
        .await;

    let registry = PhaseRegistry::with_builtin().with_handler(competitors.clone());
    let results = h
        .orchestrator(registry)
        .run_single_phase(PhaseId::GapClassification)
        .await;

    assert_eq!(results.status(), WorkflowStatus::Running);
    assert_eq!(
        results.workflow_summary.completed_phases,
        PhaseId::ALL[..4].to_vec()
    );
    assert!(competitors.inputs().is_empty());
    assert!(results.error.is_none());
}

#[tokio::test]
async fn test_single_phase_before_any_run_is_refused() {
    let h = Harness::onboarded().await;
    let results = h.healthy().run_single_phase(PhaseId::Tuning).await;
    assert!(
        results
            .error_message()
            .unwrap()
            .contains("No workflow has been started")
    );
}
