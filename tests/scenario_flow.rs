//! Scenario orchestration tests
//!
//! These drive whole scenarios against the in-memory fakes and check the
//! verdict, the failure diagnostics, and that every resource is torn down
//! exactly once and in order.

mod support;

use smokepack::fakes::{FakeBuilder, FakeCheck, FakeRuntime, RuntimeCall};
use smokepack::naming::cache_volume_names;
use smokepack::{
    Architecture, CleanupStep, FailureKind, Scenario, ScenarioSpec, Suite, Verdict,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use support::{procfile_fixtures, test_config, toolchain, PROCFILE_BUILD_LOGS};

fn procfile_scenario(
    fixtures: &Path,
    builder: &Arc<FakeBuilder>,
    runtime: &Arc<FakeRuntime>,
    check: &Arc<FakeCheck>,
) -> Scenario {
    let config = test_config(fixtures);
    let spec = ScenarioSpec::procfile(&config);
    Scenario::new(spec, config, toolchain(builder, runtime, check))
        .with_architecture(Architecture::Amd64)
}

fn assert_source_removed(builder: &FakeBuilder) {
    let requests = builder.requests();
    assert_eq!(requests.len(), 1);
    assert!(
        !requests[0].source.exists(),
        "source copy {} was left behind",
        requests[0].source.display()
    );
}

fn expected_removals(name: &str, container: Option<&str>, image: bool) -> Vec<RuntimeCall> {
    let mut calls = Vec::new();
    if let Some(id) = container {
        calls.push(RuntimeCall::RemoveContainer(id.to_string()));
    }
    calls.push(RuntimeCall::RemoveVolumes(cache_volume_names(name)));
    if image {
        calls.push(RuntimeCall::RemoveImage(format!("sha256:{}", name)));
    }
    calls
}

#[tokio::test]
async fn test_procfile_scenario_passes() {
    let fixtures = procfile_fixtures();
    let runtime = Arc::new(FakeRuntime::new());
    let check = Arc::new(FakeCheck::ready_after(3));
    let builder = Arc::new(FakeBuilder::succeeding(PROCFILE_BUILD_LOGS));

    let report = procfile_scenario(fixtures.path(), &builder, &runtime, &check)
        .run()
        .await;

    assert_eq!(report.verdict, Verdict::Pass, "{:?}", report.failure);
    assert!(report.cleanup_errors.is_empty());
    assert_eq!(check.polls(), 3, "polling stops at the first positive answer");

    let calls = runtime.calls();
    assert_eq!(
        calls[0],
        RuntimeCall::Run {
            image: format!("sha256:{}", report.resource_name),
            env: [("PORT".to_string(), "8080".to_string())].into_iter().collect(),
            publish: vec![8080],
        }
    );
    assert_eq!(
        runtime.removals(),
        expected_removals(&report.resource_name, Some("fake-container-0"), true)
    );
}

#[tokio::test]
async fn test_build_failure_surfaces_logs_and_cleans_up() {
    let fixtures = procfile_fixtures();
    let runtime = Arc::new(FakeRuntime::new());
    let check = Arc::new(FakeCheck::ready());
    let builder = Arc::new(FakeBuilder::failing(
        "ERROR: No buildpack groups passed detection.",
    ));

    let report = procfile_scenario(fixtures.path(), &builder, &runtime, &check)
        .run()
        .await;

    assert_eq!(report.verdict, Verdict::Fail);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Build);
    assert!(failure
        .logs
        .as_deref()
        .unwrap()
        .contains("No buildpack groups passed detection"));

    // no image or container exists, but pack may have created cache volumes
    assert_eq!(
        runtime.removals(),
        expected_removals(&report.resource_name, None, false)
    );
    assert_eq!(check.polls(), 0);
    assert_source_removed(&builder);
}

#[tokio::test]
async fn test_run_failure_is_fatal_and_cleans_up() {
    let fixtures = procfile_fixtures();
    let runtime = Arc::new(FakeRuntime::new().fail_create());
    let check = Arc::new(FakeCheck::ready());
    let builder = Arc::new(FakeBuilder::succeeding(PROCFILE_BUILD_LOGS));

    let report = procfile_scenario(fixtures.path(), &builder, &runtime, &check)
        .run()
        .await;

    assert_eq!(report.failure.as_ref().unwrap().kind, FailureKind::Run);
    assert_eq!(
        runtime.removals(),
        expected_removals(&report.resource_name, None, true)
    );
    assert_eq!(check.polls(), 0);
    assert_source_removed(&builder);
}

#[tokio::test]
async fn test_never_ready_times_out_and_cleans_up() {
    let fixtures = procfile_fixtures();
    let runtime = Arc::new(FakeRuntime::new());
    let check = Arc::new(FakeCheck::never());
    let builder = Arc::new(FakeBuilder::succeeding(PROCFILE_BUILD_LOGS));

    let report = procfile_scenario(fixtures.path(), &builder, &runtime, &check)
        .run()
        .await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::NotReady);
    assert!(failure.logs.is_none());
    assert!(check.polls() > 1);
    assert_eq!(
        runtime.removals(),
        expected_removals(&report.resource_name, Some("fake-container-0"), true)
    );
    assert_source_removed(&builder);
}

#[tokio::test]
async fn test_missing_marker_fails_assertion_with_logs() {
    let fixtures = procfile_fixtures();
    let runtime = Arc::new(FakeRuntime::new());
    let check = Arc::new(FakeCheck::ready());
    let logs = "===> BUILDING\nPaketo Buildpack for Go 1.0.0\n===> EXPORTING";
    let builder = Arc::new(FakeBuilder::succeeding(logs));

    let report = procfile_scenario(fixtures.path(), &builder, &runtime, &check)
        .run()
        .await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Assertion);
    assert!(failure.message.contains("Paketo Buildpack for Procfile"));
    assert_eq!(failure.logs.as_deref(), Some(logs));
    assert_eq!(runtime.removals().len(), 3);
    assert_source_removed(&builder);
}

#[tokio::test]
async fn test_cleanup_errors_do_not_mask_failure() {
    let fixtures = procfile_fixtures();
    let runtime = Arc::new(
        FakeRuntime::new()
            .fail_remove_container()
            .fail_remove_image(),
    );
    let check = Arc::new(FakeCheck::never());
    let builder = Arc::new(FakeBuilder::succeeding(PROCFILE_BUILD_LOGS));

    let report = procfile_scenario(fixtures.path(), &builder, &runtime, &check)
        .run()
        .await;

    assert_eq!(report.failure.as_ref().unwrap().kind, FailureKind::NotReady);
    let steps: Vec<CleanupStep> = report.cleanup_errors.iter().map(|e| e.step).collect();
    assert_eq!(steps, vec![CleanupStep::Container, CleanupStep::Image]);

    // every step still ran
    assert_eq!(runtime.removals().len(), 3);
    assert_source_removed(&builder);
}

#[tokio::test]
async fn test_cleanup_failure_alone_fails_scenario() {
    let fixtures = procfile_fixtures();
    let runtime = Arc::new(FakeRuntime::new().fail_remove_volumes());
    let check = Arc::new(FakeCheck::ready());
    let builder = Arc::new(FakeBuilder::succeeding(PROCFILE_BUILD_LOGS));

    let report = procfile_scenario(fixtures.path(), &builder, &runtime, &check)
        .run()
        .await;

    assert!(report.failure.is_none());
    assert_eq!(report.cleanup_errors.len(), 1);
    assert_eq!(report.cleanup_errors[0].step, CleanupStep::Volumes);
    assert_eq!(report.verdict, Verdict::Fail);
}

#[tokio::test]
async fn test_panicking_check_still_cleans_up() {
    let fixtures = procfile_fixtures();
    let runtime = Arc::new(FakeRuntime::new());
    let check = Arc::new(FakeCheck::panicking());
    let builder = Arc::new(FakeBuilder::succeeding(PROCFILE_BUILD_LOGS));

    let report = procfile_scenario(fixtures.path(), &builder, &runtime, &check)
        .run()
        .await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Panic);
    assert!(failure.message.contains("fake check exploded"));
    assert_eq!(
        runtime.removals(),
        expected_removals(&report.resource_name, Some("fake-container-0"), true)
    );
    assert_source_removed(&builder);
}

#[tokio::test]
async fn test_panicking_builder_still_cleans_up() {
    let fixtures = procfile_fixtures();
    let runtime = Arc::new(FakeRuntime::new());
    let check = Arc::new(FakeCheck::ready());
    let builder = Arc::new(FakeBuilder::panicking());

    let report = procfile_scenario(fixtures.path(), &builder, &runtime, &check)
        .run()
        .await;

    assert_eq!(report.failure.as_ref().unwrap().kind, FailureKind::Panic);
    assert_eq!(
        runtime.removals(),
        expected_removals(&report.resource_name, None, false)
    );
    assert_source_removed(&builder);
}

#[tokio::test]
async fn test_source_copy_is_removed() {
    let fixtures = procfile_fixtures();
    let runtime = Arc::new(FakeRuntime::new());
    let check = Arc::new(FakeCheck::ready());
    let builder = Arc::new(FakeBuilder::succeeding(PROCFILE_BUILD_LOGS));

    let config = test_config(fixtures.path());
    let toolchain = smokepack::Toolchain::new(builder.clone(), runtime.clone(), check.clone());
    Scenario::new(ScenarioSpec::procfile(&config), config, toolchain)
        .with_architecture(Architecture::Amd64)
        .run()
        .await;

    let request = &builder.requests()[0];
    assert_ne!(request.source, fixtures.path().join("procfile"));
    assert!(!request.source.exists());
    assert!(fixtures.path().join("procfile/Procfile").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scenarios_use_unique_names() {
    let fixtures = procfile_fixtures();
    let config = test_config(fixtures.path());
    let runtime = Arc::new(FakeRuntime::new());
    let check = Arc::new(FakeCheck::ready());
    let builder = Arc::new(
        FakeBuilder::succeeding(PROCFILE_BUILD_LOGS).with_delay(Duration::from_millis(20)),
    );

    let mut suite = Suite::new(
        "concurrency",
        config.clone(),
        smokepack::Toolchain::new(builder.clone(), runtime.clone(), check.clone()),
    )
    .with_architecture(Architecture::Amd64);
    for i in 0..8 {
        let mut spec = ScenarioSpec::procfile(&config);
        spec.name = format!("copy {}", i);
        suite = suite.add(spec);
    }

    let report = suite.run().await;

    assert_eq!(report.reports.len(), 8);
    assert!(report.passed(), "{:#?}", report.reports);

    let names: HashSet<&str> = report
        .reports
        .iter()
        .map(|r| r.resource_name.as_str())
        .collect();
    assert_eq!(names.len(), 8);

    let sources: HashSet<_> = builder.requests().into_iter().map(|r| r.source).collect();
    assert_eq!(sources.len(), 8);
}
